use scraper::Html;

use crate::markup::collapse_whitespace;
use crate::models::LoginHistory;

pub const ENDPOINT: &str = "/vtop/show/login/history";

/// The history view is free-form; keep its visible text one line per entry.
pub fn parse(html: &str) -> LoginHistory {
    let doc = Html::parse_fragment(html);
    let text: String = doc.root_element().text().collect::<Vec<_>>().join("\n");
    let entries = text
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect();

    LoginHistory { entries }
}
