use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use url::Url;

use super::{CaptchaError, CaptchaSolver};

/// Solver that posts the raw challenge image to an HTTP classifier.
///
/// The endpoint may answer with the text itself or with a JSON object
/// carrying it under `text`, `result` or `captcha`.
#[derive(Debug, Clone)]
pub struct HttpCaptchaSolver {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpCaptchaSolver {
    pub fn new(endpoint: &str) -> Result<Self, CaptchaError> {
        Self::with_timeout(endpoint, Duration::from_secs(30))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, CaptchaError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| CaptchaError::Configuration(format!("{endpoint}: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CaptchaError::Configuration(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }
}

#[async_trait]
impl CaptchaSolver for HttpCaptchaSolver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn solve(&self, image: &Bytes) -> Result<String, CaptchaError> {
        log::debug!("posting {} byte challenge to {}", image.len(), self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.clone())
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CaptchaError::Timeout(self.timeout)
                } else {
                    CaptchaError::Provider(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::Provider(format!(
                "{} answered with status {}",
                self.endpoint, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        parse_answer(&body)
    }
}

fn parse_answer(body: &str) -> Result<String, CaptchaError> {
    let trimmed = body.trim();

    let answer = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => ["text", "result", "captcha"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                CaptchaError::Provider("response object carries no answer field".into())
            })?,
        Ok(serde_json::Value::String(s)) => s.trim().to_string(),
        _ => trimmed.to_string(),
    };

    if answer.is_empty() {
        Err(CaptchaError::EmptyAnswer)
    } else {
        Ok(answer)
    }
}
