//! Live connection to the portal.
//!
//! [`PageContext`] abstracts a stateful page (cookie jar + current document)
//! so the login state machine and the extraction parsers never depend on a
//! concrete transport. [`ReqwestPageContext`] is the HTTP-backed
//! implementation; tests substitute scripted fakes.

pub mod reqwest_context;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub use reqwest_context::{ReqwestContextFactory, ReqwestPageContext};

/// Failures raised by a page context.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("unexpected http status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no element matches '{0}'")]
    ElementNotFound(String),
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
    #[error("no page has been loaded")]
    NoPage,
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("page context has been closed")]
    Closed,
}

/// Contract for the single shared page the session drives.
///
/// Every method that touches the network is bounded: navigation by the
/// context's page timeout, submissions by the supplied timeout. Callers hold
/// the context exclusively (`&mut self`) so navigations never interleave.
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Navigate to `url`, replacing the current document.
    async fn goto(&mut self, url: &Url) -> Result<(), PageError>;

    /// Reload the current document.
    async fn reload(&mut self) -> Result<(), PageError>;

    /// Markup of the current document (empty before the first navigation).
    fn content(&self) -> &str;

    /// Wait up to `timeout` for `selector` to match; `Ok(false)` when it never does.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, PageError>;

    /// Set the value of the form control matched by `selector`.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), PageError>;

    /// Submit the form enclosing the element matched by `selector` and wait
    /// (up to `timeout`) for the resulting document.
    async fn submit_form(&mut self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    /// Issue a form-encoded POST against a portal path within the current
    /// session and return the response markup. Does not navigate.
    async fn post_form(
        &mut self,
        path: &str,
        fields: &[(String, String)],
    ) -> Result<String, PageError>;

    /// Release the context. Idempotent.
    async fn close(&mut self) -> Result<(), PageError>;
}

/// Produces fresh page contexts for each login attempt.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn PageContext>, PageError>;
}
