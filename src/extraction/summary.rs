use once_cell::sync::Lazy;
use regex::Regex;

use super::ExtractionError;
use crate::models::SummaryScore;

pub const ENDPOINT: &str = "/vtop/get/dashboard/current/cgpa/credits";

/// Position of the CGPA among the fragment's numeric spans. The dashboard
/// fragment renders credit totals first; this index has held on every
/// fixture seen so far but is not guaranteed by the portal.
pub const CGPA_FIGURE_INDEX: usize = 2;

static NUMERIC_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<span[^>]*>\s*([0-9.]+)\s*</span>").expect("invalid numeric span regex"));

pub fn parse(html: &str) -> Result<SummaryScore, ExtractionError> {
    let figures: Vec<String> = NUMERIC_SPAN
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect();

    if figures.is_empty() {
        return Err(ExtractionError::MarkupShapeChanged {
            endpoint: ENDPOINT,
            expected: "numeric span",
        });
    }

    let cgpa = figures.get(CGPA_FIGURE_INDEX).cloned();
    if cgpa.is_none() {
        log::warn!(
            "summary fragment has {} figure(s); no CGPA at position {}",
            figures.len(),
            CGPA_FIGURE_INDEX
        );
    }

    Ok(SummaryScore { cgpa, figures })
}
