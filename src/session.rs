//! Session orchestration.
//!
//! Owns the single live page context, runs the login state machine against
//! it and routes record requests through the extraction pipeline. Login
//! and extraction are serialised on one lock, so at most one of them touches
//! the portal at any time.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::{
	CaptchaChallenge, ChallengeError, LoginAttempt, LoginConfig, LoginError, LoginSelectors,
	LoginStateMachine,
};
use crate::config::{ConfigError, Credentials, PortalConfig};
use crate::context::{ContextFactory, PageContext, PageError, ReqwestContextFactory};
use crate::external_deps::captcha::{CaptchaSolver, HttpCaptchaSolver};
use crate::extraction::{ExtractionError, ExtractionPipeline, FetchParams, Record, RecordType};
use crate::modules::events::{
	ErrorEvent, EventDispatcher, EventHandler, ExtractionEvent, SessionEvent,
};

/// Errors surfaced by [`SessionManager`].
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("no authenticated session")]
	NotAuthenticated,
	#[error("login failed: {0}")]
	Login(#[from] LoginError),
	#[error("extraction failed: {0}")]
	Extraction(#[from] ExtractionError),
	#[error("page context error: {0}")]
	Context(#[from] PageError),
	#[error("configuration error: {0}")]
	Configuration(#[from] ConfigError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Coarse failure classification reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
	AuthTokenMissing,
	ChallengeImageUnavailable,
	ChallengeNotFound,
	LoginFailed,
	NotAuthenticated,
	EndpointUnreachable,
	MarkupShapeChanged,
	/// Anything that aborted a transition without a more specific class.
	Failed,
}

impl LoginError {
	pub fn kind(&self) -> FailureKind {
		match self {
			LoginError::ChallengeNotFound { .. } => FailureKind::ChallengeNotFound,
			LoginError::LoginFailed { .. } => FailureKind::LoginFailed,
			LoginError::Challenge(ChallengeError::ImageUnavailable(_)) => {
				FailureKind::ChallengeImageUnavailable
			}
			LoginError::UnrecognisedResponse
			| LoginError::Challenge(_)
			| LoginError::Page(_) => FailureKind::Failed,
		}
	}
}

impl ExtractionError {
	pub fn kind(&self) -> FailureKind {
		match self {
			ExtractionError::AuthTokenMissing => FailureKind::AuthTokenMissing,
			ExtractionError::EndpointUnreachable { .. } => FailureKind::EndpointUnreachable,
			ExtractionError::MarkupShapeChanged { .. } => FailureKind::MarkupShapeChanged,
		}
	}
}

impl SessionError {
	pub fn kind(&self) -> FailureKind {
		match self {
			SessionError::NotAuthenticated => FailureKind::NotAuthenticated,
			SessionError::Login(err) => err.kind(),
			SessionError::Extraction(err) => err.kind(),
			SessionError::Context(_) | SessionError::Configuration(_) => FailureKind::Failed,
		}
	}
}

/// Fluent builder for [`SessionManager`].
pub struct SessionManagerBuilder {
	portal: PortalConfig,
	solver: Option<Arc<dyn CaptchaSolver>>,
	factory: Option<Arc<dyn ContextFactory>>,
	handlers: Vec<Arc<dyn EventHandler>>,
	selectors: Option<LoginSelectors>,
}

impl SessionManagerBuilder {
	pub fn new() -> Self {
		Self {
			portal: PortalConfig::default(),
			solver: None,
			factory: None,
			handlers: Vec::new(),
			selectors: None,
		}
	}

	pub fn with_config(mut self, portal: PortalConfig) -> Self {
		self.portal = portal;
		self
	}

	pub fn with_credentials(mut self, credentials: Credentials) -> Self {
		self.portal.username = credentials.username;
		self.portal.password = credentials.password;
		self
	}

	pub fn with_semester(mut self, semester_id: impl Into<String>) -> Self {
		self.portal.semester_id = semester_id.into();
		self
	}

	pub fn with_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
		self.solver = Some(solver);
		self
	}

	pub fn with_context_factory(mut self, factory: Arc<dyn ContextFactory>) -> Self {
		self.factory = Some(factory);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn with_login_selectors(mut self, selectors: LoginSelectors) -> Self {
		self.selectors = Some(selectors);
		self
	}

	pub fn build(self) -> SessionResult<SessionManager> {
		let mut login = LoginConfig::from_portal(&self.portal)?;
		if let Some(selectors) = self.selectors {
			login.selectors = selectors;
		}

		let solver: Arc<dyn CaptchaSolver> = match self.solver {
			Some(solver) => solver,
			None => {
				let endpoint = self
					.portal
					.solver_endpoint
					.as_deref()
					.ok_or(ConfigError::Missing("solver_endpoint"))?;
				let solver = HttpCaptchaSolver::new(endpoint)
					.map_err(|err| ConfigError::Solver(err.to_string()))?;
				Arc::new(solver)
			}
		};

		let factory: Arc<dyn ContextFactory> = match self.factory {
			Some(factory) => factory,
			None => Arc::new(ReqwestContextFactory::new(
				self.portal.base_url()?,
				self.portal.user_agent.clone(),
				self.portal.page_timeout(),
			)),
		};

		let mut events = EventDispatcher::with_logging();
		for handler in self.handlers {
			events.register_handler(handler);
		}

		Ok(SessionManager {
			challenge: CaptchaChallenge::new(solver).with_wait(self.portal.element_timeout()),
			pipeline: ExtractionPipeline::new(self.portal.semester_id.clone()),
			login,
			factory,
			events: Arc::new(events),
			session: Mutex::new(None),
		})
	}
}

impl Default for SessionManagerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// The live portal session. Only a successful login stores one, so holding
/// a `Session` means being authenticated.
struct Session {
	context: Box<dyn PageContext>,
}

/// Process-wide entry point for logging in and fetching records.
pub struct SessionManager {
	login: LoginConfig,
	challenge: CaptchaChallenge,
	pipeline: ExtractionPipeline,
	factory: Arc<dyn ContextFactory>,
	events: Arc<EventDispatcher>,
	session: Mutex<Option<Session>>,
}

impl SessionManager {
	pub fn builder() -> SessionManagerBuilder {
		SessionManagerBuilder::new()
	}

	/// Build a manager from `.env` / `VTOP_*` settings with the HTTP context
	/// and solver.
	pub fn from_env() -> SessionResult<Self> {
		SessionManagerBuilder::new()
			.with_config(PortalConfig::load()?)
			.build()
	}

	/// Tear down any existing session, then run one full login against a
	/// fresh context. Concurrent callers queue behind each other.
	pub async fn login(&self) -> LoginAttempt {
		let mut guard = self.session.lock().await;
		if let Some(previous) = guard.take() {
			log::debug!("discarding previous session before login");
			close_context(previous.context).await;
		}

		let mut context = match self.factory.create().await {
			Ok(context) => context,
			Err(err) => {
				self.report_error("login", &err);
				return LoginAttempt::failed(err.into());
			}
		};

		let attempt = LoginStateMachine::new(&self.login, &self.challenge, &self.events)
			.run(context.as_mut())
			.await;

		if attempt.succeeded() {
			*guard = Some(Session { context });
		} else {
			close_context(context).await;
		}
		attempt
	}

	/// Log in unless a session is already authenticated.
	pub async fn ensure_authenticated(&self) -> SessionResult<()> {
		if self.is_authenticated().await {
			return Ok(());
		}
		match self.login().await.into_error() {
			None => Ok(()),
			Some(err) => Err(SessionError::Login(err)),
		}
	}

	/// Fetch one record type over the authenticated session.
	pub async fn fetch(&self, record_type: RecordType, params: &FetchParams) -> SessionResult<Record> {
		let mut guard = self.session.lock().await;
		let session = guard.as_mut().ok_or(SessionError::NotAuthenticated)?;

		let started = Instant::now();
		let result = self
			.pipeline
			.fetch(session.context.as_mut(), record_type, params)
			.await;

		self.events.dispatch(SessionEvent::Extraction(ExtractionEvent {
			record_type: record_type.to_string(),
			success: result.is_ok(),
			latency: started.elapsed(),
			timestamp: Utc::now(),
		}));
		if let Err(err) = &result {
			self.report_error(record_type.as_str(), err);
		}

		Ok(result?)
	}

	/// Release the context and drop authentication. Safe to call repeatedly.
	pub async fn teardown(&self) {
		let mut guard = self.session.lock().await;
		if let Some(session) = guard.take() {
			close_context(session.context).await;
			log::info!("session torn down");
		}
	}

	pub async fn is_authenticated(&self) -> bool {
		self.session.lock().await.is_some()
	}

	pub fn default_semester(&self) -> &str {
		self.pipeline.default_semester()
	}

	fn report_error(&self, stage: &str, err: &dyn std::fmt::Display) {
		self.events.dispatch(SessionEvent::Error(ErrorEvent {
			stage: stage.to_string(),
			error: err.to_string(),
			timestamp: Utc::now(),
		}));
	}
}

async fn close_context(mut context: Box<dyn PageContext>) {
	if let Err(err) = context.close().await {
		log::warn!("failed to close page context: {err}");
	}
}
