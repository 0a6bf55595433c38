//! # vtop-scraper-rs
//!
//! Session client for a CAPTCHA-gated student portal that only exposes its
//! data as server-rendered HTML fragments.
//!
//! The crate logs in through a bounded retry state machine (image challenge
//! search, answer submission, outcome classification) and then turns the
//! portal's table markup into typed records.
//!
//! ## Features
//!
//! - Login state machine with independent challenge-search and submit budgets
//! - Pluggable CAPTCHA solver (`CaptchaSolver`) with an HTTP adapter
//! - Per-request anti-forgery signing
//! - Typed attendance, marks, assignments, timetable, exam schedule, summary
//!   and login history records
//! - Partial-failure isolation for per-subject assignment fetches
//! - Event hooks with a `log`-backed default handler
//!
//! ## Example
//!
//! ```no_run
//! use vtop_scraper_rs::{FetchParams, RecordType, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionManager::from_env()?;
//!     session.ensure_authenticated().await?;
//!     let attendance = session
//!         .fetch(RecordType::Attendance, &FetchParams::default())
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&attendance)?);
//!     session.teardown().await;
//!     Ok(())
//! }
//! ```

mod markup;
mod session;

pub mod auth;
pub mod config;
pub mod context;
pub mod external_deps;
pub mod extraction;
pub mod models;
pub mod modules;

#[cfg(test)]
mod test_support;

pub use crate::session::{
    FailureKind,
    SessionError,
    SessionManager,
    SessionManagerBuilder,
    SessionResult,
};

pub use crate::auth::{
    CaptchaChallenge,
    ChallengeError,
    LoginAttempt,
    LoginConfig,
    LoginError,
    LoginOutcome,
    LoginSelectors,
    LoginState,
    LoginStateMachine,
    RequestSignature,
    SignerError,
};

pub use crate::config::{ConfigError, Credentials, PortalConfig, DEFAULT_SEMESTER_ID};

pub use crate::context::{
    ContextFactory,
    PageContext,
    PageError,
    ReqwestContextFactory,
    ReqwestPageContext,
};

pub use crate::external_deps::captcha::{CaptchaError, CaptchaSolver, HttpCaptchaSolver};

pub use crate::extraction::{
    ExtractionError,
    ExtractionPipeline,
    FetchParams,
    Record,
    RecordType,
    UnknownRecordType,
};

pub use crate::models::{
    AssignmentEntry,
    AssignmentFetch,
    AssignmentSubject,
    AttendanceRecord,
    DaySchedule,
    ExamRecord,
    ExamSchedule,
    ExamType,
    LoginHistory,
    MarkEntry,
    MarksRecord,
    SlotEntry,
    SummaryScore,
    Timetable,
    Weekday,
};

pub use crate::modules::{
    ErrorEvent,
    EventDispatcher,
    EventHandler,
    ExtractionEvent,
    LoggingHandler,
    LoginFinishedEvent,
    LoginStartedEvent,
    RetryEvent,
    SessionEvent,
    TransitionEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
