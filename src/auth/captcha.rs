//! Image challenge embedded in the login form.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use scraper::Html;
use thiserror::Error;

use crate::context::{PageContext, PageError};
use crate::external_deps::captcha::{CaptchaError, CaptchaSolver};
use crate::markup::parse_selector;

pub const DEFAULT_IMAGE_SELECTOR: &str = "img.form-control.img-fluid.bg-light.border-0";
pub const DEFAULT_ANSWER_SELECTOR: &str = "#captchaStr";

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("challenge image unavailable: {0}")]
    ImageUnavailable(String),
    #[error("captcha solver failed: {0}")]
    Solver(#[from] CaptchaError),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Detects, reads and answers the login challenge.
#[derive(Clone)]
pub struct CaptchaChallenge {
    image_selector: String,
    answer_selector: String,
    wait: Duration,
    solver: Arc<dyn CaptchaSolver>,
}

impl std::fmt::Debug for CaptchaChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaChallenge")
            .field("image_selector", &self.image_selector)
            .field("answer_selector", &self.answer_selector)
            .field("wait", &self.wait)
            .field("solver", &self.solver.name())
            .finish()
    }
}

impl CaptchaChallenge {
    pub fn new(solver: Arc<dyn CaptchaSolver>) -> Self {
        Self {
            image_selector: DEFAULT_IMAGE_SELECTOR.to_string(),
            answer_selector: DEFAULT_ANSWER_SELECTOR.to_string(),
            wait: Duration::from_secs(10),
            solver,
        }
    }

    pub fn with_selectors(
        mut self,
        image_selector: impl Into<String>,
        answer_selector: impl Into<String>,
    ) -> Self {
        self.image_selector = image_selector.into();
        self.answer_selector = answer_selector.into();
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Whether a challenge image is on the page. Never fails: a page error
    /// is logged and reported as "absent".
    pub async fn detect(&self, page: &mut dyn PageContext) -> bool {
        match page.wait_for_selector(&self.image_selector, self.wait).await {
            Ok(found) => found,
            Err(err) => {
                log::debug!("challenge detection failed: {err}");
                false
            }
        }
    }

    /// Solve the challenge and write the answer into the form. Returns the
    /// answer text.
    pub async fn solve(&self, page: &mut dyn PageContext) -> Result<String, ChallengeError> {
        let image = image_payload(page.content(), &self.image_selector)?;
        let answer = self.solver.solve(&image).await?;
        log::debug!(
            "{} solver answered ({} chars)",
            self.solver.name(),
            answer.chars().count()
        );
        page.fill(&self.answer_selector, &answer).await?;
        Ok(answer)
    }
}

fn image_payload(html: &str, selector: &str) -> Result<Bytes, ChallengeError> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    let src = doc
        .select(&sel)
        .next()
        .ok_or_else(|| ChallengeError::ImageUnavailable(format!("no element matches {selector}")))?
        .value()
        .attr("src")
        .ok_or_else(|| ChallengeError::ImageUnavailable("image has no src".into()))?;

    decode_data_url(src)
}

fn decode_data_url(src: &str) -> Result<Bytes, ChallengeError> {
    let rest = src
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ChallengeError::ImageUnavailable("src is not a data url".into()))?;
    let (_, encoded) = rest
        .split_once(";base64,")
        .ok_or_else(|| ChallengeError::ImageUnavailable("data url is not base64".into()))?;

    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = STANDARD
        .decode(cleaned)
        .map_err(|err| ChallengeError::ImageUnavailable(err.to_string()))?;
    if raw.is_empty() {
        return Err(ChallengeError::ImageUnavailable("empty image payload".into()));
    }
    Ok(Bytes::from(raw))
}
