//! Captcha solver integrations.
//!
//! The login flow treats the classifier as an opaque function from image
//! bytes to text. Implementations wrap whatever service performs the
//! recognition; the session never inspects how the answer was produced.

mod http_solver;

pub use http_solver::HttpCaptchaSolver;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Shared interface implemented by captcha solvers.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read the text shown in `image`.
    async fn solve(&self, image: &Bytes) -> Result<String, CaptchaError>;
}

/// Errors surfaced by captcha solvers.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha solver misconfigured: {0}")]
    Configuration(String),
    #[error("captcha solver request failed: {0}")]
    Provider(String),
    #[error("captcha solving timed out after {0:?}")]
    Timeout(Duration),
    #[error("captcha solver returned no answer")]
    EmptyAnswer,
}
