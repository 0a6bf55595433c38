//! Derives the values every authenticated request must carry.
//!
//! The portal rotates its anti-forgery token on each render, so nothing here
//! is cached: callers derive a fresh signature from the current document
//! immediately before each request.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::context::PageContext;
use crate::markup::document_text;

static TOKEN_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="_csrf"]"#).expect("invalid csrf meta selector"));
static TOKEN_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[name="_csrf"]"#).expect("invalid csrf input selector"));
static SUBJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2}[A-Z]{3}\d{4}\b").expect("invalid subject id regex"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("anti-forgery token not present in current page")]
    AuthTokenMissing,
}

/// Per-request credentials scraped from the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub anti_forgery_token: String,
    /// `None` when no identifier appears in the rendered text, which
    /// usually means the context is not authenticated.
    pub subject_id: Option<String>,
}

impl RequestSignature {
    pub fn derive(context: &dyn PageContext) -> Result<Self, SignerError> {
        Self::from_markup(context.content())
    }

    pub fn from_markup(html: &str) -> Result<Self, SignerError> {
        let doc = Html::parse_document(html);

        let token = doc
            .select(&TOKEN_META)
            .find_map(|meta| meta.value().attr("content"))
            .or_else(|| {
                doc.select(&TOKEN_INPUT)
                    .find_map(|input| input.value().attr("value"))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(SignerError::AuthTokenMissing)?;

        let text = document_text(&doc);
        let subject_id = SUBJECT_ID.find(&text).map(|m| m.as_str().to_string());
        if subject_id.is_none() {
            log::warn!("no subject id found in current page; requests will likely be refused");
        }

        Ok(Self {
            anti_forgery_token: token.to_string(),
            subject_id,
        })
    }

    /// Subject id as sent on the wire (empty when unknown).
    pub fn authorized_id(&self) -> &str {
        self.subject_id.as_deref().unwrap_or_default()
    }
}
