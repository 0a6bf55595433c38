//! Login state machine.
//!
//! Drives one login attempt through
//! `Idle -> CredentialsFilled -> ChallengeSearch -> ChallengeSolved -> Submitted`
//! and on to `Authenticated`, `ChallengeRejected` or `Failed`. Two budgets
//! bound the work: challenge searches that find no image (each followed by a
//! reload) and form submissions. Exhausting either is terminal.

use std::time::{Duration, Instant};

use chrono::Utc;
use scraper::Html;
use thiserror::Error;
use url::Url;

use super::captcha::{CaptchaChallenge, ChallengeError};
use crate::config::{ConfigError, Credentials, PortalConfig};
use crate::context::{PageContext, PageError};
use crate::markup::{parse_selector, text_of};
use crate::modules::events::{
    EventDispatcher, LoginFinishedEvent, LoginStartedEvent, RetryEvent, SessionEvent,
    TransitionEvent,
};

/// Text that only the authenticated landing view renders.
pub const SUCCESS_MARKER: &str = "CGPA and CREDIT Status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    Idle,
    CredentialsFilled,
    ChallengeSearch,
    ChallengeSolved,
    Submitted,
    Authenticated,
    ChallengeRejected,
    Failed,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoginState::Authenticated | LoginState::Failed)
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("no challenge image found after {attempts} search(es)")]
    ChallengeNotFound { attempts: u32 },
    #[error("login rejected after {attempts} submission(s)")]
    LoginFailed { attempts: u32 },
    #[error("portal answered the login with an unrecognised page")]
    UnrecognisedResponse,
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Selectors locating the login form controls and the landing marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSelectors {
    /// Role chooser shown before the credential form.
    pub role_form: String,
    pub username: String,
    pub password: String,
    /// Element whose enclosing form carries the credentials.
    pub submit: String,
    /// Elements whose text is scanned for [`SUCCESS_MARKER`].
    pub landing_marker: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            role_form: "#stdForm".to_string(),
            username: "#username".to_string(),
            password: "#password".to_string(),
            submit: "#captchaStr".to_string(),
            landing_marker: ".card-header.primaryBorderTop span".to_string(),
        }
    }
}

/// Everything one login run needs besides the page and the challenge.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub login_url: Url,
    pub credentials: Credentials,
    pub selectors: LoginSelectors,
    pub success_marker: String,
    pub challenge_search_budget: u32,
    pub submit_budget: u32,
    pub element_timeout: Duration,
    pub submit_timeout: Duration,
}

impl LoginConfig {
    pub fn new(login_url: Url, credentials: Credentials) -> Self {
        Self {
            login_url,
            credentials,
            selectors: LoginSelectors::default(),
            success_marker: SUCCESS_MARKER.to_string(),
            challenge_search_budget: 10,
            submit_budget: 3,
            element_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_portal(portal: &PortalConfig) -> Result<Self, ConfigError> {
        let credentials = portal.credentials();
        if credentials.username.is_empty() {
            return Err(ConfigError::Missing("username"));
        }
        if credentials.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }

        Ok(Self {
            challenge_search_budget: portal.challenge_search_budget.max(1),
            submit_budget: portal.submit_budget.max(1),
            element_timeout: portal.element_timeout(),
            submit_timeout: portal.submit_timeout(),
            ..Self::new(portal.login_url()?, credentials)
        })
    }
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated,
    Failed(LoginError),
}

/// Record of one `login()` call.
#[derive(Debug)]
pub struct LoginAttempt {
    pub challenge_attempts_used: u32,
    pub submit_attempts_used: u32,
    pub outcome: LoginOutcome,
}

impl LoginAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, LoginOutcome::Authenticated)
    }

    pub fn error(&self) -> Option<&LoginError> {
        match &self.outcome {
            LoginOutcome::Failed(err) => Some(err),
            LoginOutcome::Authenticated => None,
        }
    }

    pub fn into_error(self) -> Option<LoginError> {
        match self.outcome {
            LoginOutcome::Failed(err) => Some(err),
            LoginOutcome::Authenticated => None,
        }
    }

    pub(crate) fn failed(err: LoginError) -> Self {
        Self {
            challenge_attempts_used: 0,
            submit_attempts_used: 0,
            outcome: LoginOutcome::Failed(err),
        }
    }
}

/// What the page shows after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitResult {
    Landing,
    LoginForm,
    Unknown,
}

/// One login run over a borrowed page.
pub struct LoginStateMachine<'a> {
    config: &'a LoginConfig,
    challenge: &'a CaptchaChallenge,
    events: &'a EventDispatcher,
    state: LoginState,
    challenge_attempts: u32,
    challenge_misses: u32,
    submit_attempts: u32,
}

impl<'a> LoginStateMachine<'a> {
    pub fn new(
        config: &'a LoginConfig,
        challenge: &'a CaptchaChallenge,
        events: &'a EventDispatcher,
    ) -> Self {
        Self {
            config,
            challenge,
            events,
            state: LoginState::Idle,
            challenge_attempts: 0,
            challenge_misses: 0,
            submit_attempts: 0,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Run to a terminal state. Never panics on portal behaviour; every
    /// failure ends up in the returned attempt's outcome.
    pub async fn run(mut self, page: &mut dyn PageContext) -> LoginAttempt {
        let started = Instant::now();
        self.events.dispatch(SessionEvent::LoginStarted(LoginStartedEvent {
            portal: self.config.login_url.to_string(),
            timestamp: Utc::now(),
        }));

        let outcome = match self.drive(page).await {
            Ok(()) => LoginOutcome::Authenticated,
            Err(err) => {
                self.transition(LoginState::Failed);
                LoginOutcome::Failed(err)
            }
        };

        let reason = match &outcome {
            LoginOutcome::Failed(err) => Some(err.to_string()),
            LoginOutcome::Authenticated => None,
        };
        self.events.dispatch(SessionEvent::LoginFinished(LoginFinishedEvent {
            success: reason.is_none(),
            challenge_attempts: self.challenge_attempts,
            submit_attempts: self.submit_attempts,
            reason,
            latency: started.elapsed(),
            timestamp: Utc::now(),
        }));

        LoginAttempt {
            challenge_attempts_used: self.challenge_attempts,
            submit_attempts_used: self.submit_attempts,
            outcome,
        }
    }

    async fn drive(&mut self, page: &mut dyn PageContext) -> Result<(), LoginError> {
        let config = self.config;
        let selectors = &config.selectors;

        page.goto(&config.login_url).await?;
        if !page
            .wait_for_selector(&selectors.role_form, config.element_timeout)
            .await?
        {
            return Err(PageError::ElementNotFound(selectors.role_form.clone()).into());
        }
        page.submit_form(&selectors.role_form, config.submit_timeout).await?;
        self.fill_credentials(page).await?;

        loop {
            self.transition(LoginState::ChallengeSearch);
            self.challenge_attempts += 1;

            let solved = if self.challenge.detect(page).await {
                match self.challenge.solve(page).await {
                    Ok(_) => Ok(()),
                    Err(ChallengeError::ImageUnavailable(reason)) => Err(reason),
                    Err(err) => return Err(err.into()),
                }
            } else {
                Err("challenge image not rendered".to_string())
            };

            if let Err(reason) = solved {
                self.challenge_misses += 1;
                if self.challenge_misses >= config.challenge_search_budget {
                    return Err(LoginError::ChallengeNotFound {
                        attempts: self.challenge_attempts,
                    });
                }
                self.retry(
                    "challenge search",
                    self.challenge_misses,
                    config.challenge_search_budget,
                    reason,
                );
                page.reload().await?;
                self.fill_credentials(page).await?;
                continue;
            }

            self.transition(LoginState::ChallengeSolved);
            self.submit_attempts += 1;
            page.submit_form(&selectors.submit, config.submit_timeout).await?;
            self.transition(LoginState::Submitted);

            match classify(page.content(), selectors, &config.success_marker)? {
                SubmitResult::Landing => {
                    self.transition(LoginState::Authenticated);
                    return Ok(());
                }
                SubmitResult::LoginForm => {
                    self.transition(LoginState::ChallengeRejected);
                    if self.submit_attempts >= config.submit_budget {
                        return Err(LoginError::LoginFailed {
                            attempts: self.submit_attempts,
                        });
                    }
                    self.retry(
                        "submit",
                        self.submit_attempts,
                        config.submit_budget,
                        "challenge answer rejected".to_string(),
                    );
                    self.fill_credentials(page).await?;
                }
                SubmitResult::Unknown => return Err(LoginError::UnrecognisedResponse),
            }
        }
    }

    async fn fill_credentials(&mut self, page: &mut dyn PageContext) -> Result<(), LoginError> {
        let config = self.config;
        let selectors = &config.selectors;
        if !page
            .wait_for_selector(&selectors.username, config.element_timeout)
            .await?
        {
            return Err(PageError::ElementNotFound(selectors.username.clone()).into());
        }
        page.fill(&selectors.username, &config.credentials.username).await?;
        page.fill(&selectors.password, &config.credentials.password).await?;
        self.transition(LoginState::CredentialsFilled);
        Ok(())
    }

    fn transition(&mut self, to: LoginState) {
        let from = self.state;
        self.state = to;
        self.events.dispatch(SessionEvent::Transition(TransitionEvent {
            from,
            to,
            timestamp: Utc::now(),
        }));
    }

    fn retry(&self, stage: &'static str, attempt: u32, budget: u32, reason: String) {
        self.events.dispatch(SessionEvent::Retry(RetryEvent {
            stage,
            attempt,
            budget,
            reason,
            timestamp: Utc::now(),
        }));
    }
}

fn classify(
    html: &str,
    selectors: &LoginSelectors,
    marker: &str,
) -> Result<SubmitResult, PageError> {
    let landing = parse_selector(&selectors.landing_marker)?;
    let username = parse_selector(&selectors.username)?;
    let doc = Html::parse_document(html);

    if doc.select(&landing).any(|el| text_of(el).contains(marker)) {
        Ok(SubmitResult::Landing)
    } else if doc.select(&username).next().is_some() {
        Ok(SubmitResult::LoginForm)
    } else {
        Ok(SubmitResult::Unknown)
    }
}
