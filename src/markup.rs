//! Small helpers shared by everything that reads portal markup.

use scraper::{ElementRef, Html, Selector};

use crate::context::PageError;

/// Compile a selector supplied at runtime (configuration, call sites).
pub(crate) fn parse_selector(css: &str) -> Result<Selector, PageError> {
    Selector::parse(css).map_err(|_| PageError::InvalidSelector(css.to_string()))
}

/// Whether `css` matches anything in `html`.
pub(crate) fn contains(html: &str, css: &str) -> Result<bool, PageError> {
    let selector = parse_selector(css)?;
    let doc = Html::parse_document(html);
    let found = doc.select(&selector).next().is_some();
    Ok(found)
}

/// Rendered text of an element with runs of whitespace collapsed.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

pub(crate) fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first `inner` match inside `element`, falling back to the
/// element's own text when there is no such descendant.
pub(crate) fn nested_text_or_own(element: ElementRef<'_>, inner: &Selector) -> String {
    element
        .select(inner)
        .next()
        .map(text_of)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| text_of(element))
}

/// Whole-document text content, preferring `<body>`. Text nodes are
/// concatenated as rendered, so inline markup does not split words.
pub(crate) fn document_text(doc: &Html) -> String {
    static BODY: once_cell::sync::Lazy<Selector> =
        once_cell::sync::Lazy::new(|| Selector::parse("body").expect("invalid body selector"));

    match doc.select(&BODY).next() {
        Some(body) => body.text().collect(),
        None => doc.root_element().text().collect(),
    }
}
