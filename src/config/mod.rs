//! Portal and session configuration.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional `.env` file and `VTOP_*` environment variables.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Errors raised while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error("invalid portal url '{0}': {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("captcha solver unavailable: {0}")]
    Solver(String),
}

/// Username/password pair used for the single portal session.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Flat configuration record as read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub solver_endpoint: Option<String>,

    #[serde(default = "default_semester_id")]
    pub semester_id: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_element_timeout_secs")]
    pub element_timeout_secs: u64,

    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,

    #[serde(default = "default_challenge_search_budget")]
    pub challenge_search_budget: u32,

    #[serde(default = "default_submit_budget")]
    pub submit_budget: u32,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

/// Semester requested when the caller does not name one.
pub const DEFAULT_SEMESTER_ID: &str = "VL20252601";

fn default_base_url() -> String {
    "https://vtop.vit.ac.in".to_string()
}
fn default_login_path() -> String {
    "/vtop/login".to_string()
}
fn default_semester_id() -> String {
    DEFAULT_SEMESTER_ID.to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36".to_string()
}
fn default_page_timeout_secs() -> u64 {
    240
}
fn default_element_timeout_secs() -> u64 {
    10
}
fn default_submit_timeout_secs() -> u64 {
    30
}
fn default_challenge_search_budget() -> u32 {
    10
}
fn default_submit_budget() -> u32 {
    3
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            username: String::new(),
            password: String::new(),
            solver_endpoint: None,
            semester_id: default_semester_id(),
            user_agent: default_user_agent(),
            page_timeout_secs: default_page_timeout_secs(),
            element_timeout_secs: default_element_timeout_secs(),
            submit_timeout_secs: default_submit_timeout_secs(),
            challenge_search_budget: default_challenge_search_budget(),
            submit_budget: default_submit_budget(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl PortalConfig {
    /// Load configuration from `.env` + `VTOP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("VTOP"))
            .build()?;

        let portal: PortalConfig = cfg.try_deserialize()?;
        log::debug!(
            "portal config loaded (base_url={}, semester={}, solver={})",
            portal.base_url,
            portal.semester_id,
            portal.solver_endpoint.as_deref().unwrap_or("<unset>")
        );
        Ok(portal)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|err| ConfigError::InvalidUrl(self.base_url.clone(), err))
    }

    pub fn login_url(&self) -> Result<Url, ConfigError> {
        self.base_url()?
            .join(&self.login_path)
            .map_err(|err| ConfigError::InvalidUrl(self.login_path.clone(), err))
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}
