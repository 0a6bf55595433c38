//! Event system for session activity.
//!
//! Provides hooks for logging and custom reactions around login and
//! extraction.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::LoginState;

#[derive(Debug, Clone)]
pub struct LoginStartedEvent {
    pub portal: String,
    pub timestamp: DateTime<Utc>,
}

/// A state machine edge taken during login.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub from: LoginState,
    pub to: LoginState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub stage: &'static str,
    pub attempt: u32,
    pub budget: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginFinishedEvent {
    pub success: bool,
    pub challenge_attempts: u32,
    pub submit_attempts: u32,
    pub reason: Option<String>,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExtractionEvent {
    pub record_type: String,
    pub success: bool,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub stage: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoginStarted(LoginStartedEvent),
    Transition(TransitionEvent),
    Retry(RetryEvent),
    LoginFinished(LoginFinishedEvent),
    Extraction(ExtractionEvent),
    Error(ErrorEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &SessionEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Dispatcher with the [`LoggingHandler`] already registered.
    pub fn with_logging() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: SessionEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::LoginStarted(started) => {
                log::info!("login started against {}", started.portal);
            }
            SessionEvent::Transition(step) => {
                log::debug!("login {:?} -> {:?}", step.from, step.to);
            }
            SessionEvent::Retry(retry) => {
                log::warn!(
                    "{} retry {}/{}: {}",
                    retry.stage,
                    retry.attempt,
                    retry.budget,
                    retry.reason
                );
            }
            SessionEvent::LoginFinished(done) if done.success => {
                log::info!(
                    "login succeeded after {} challenge search(es), {} submit(s) ({:.2}s)",
                    done.challenge_attempts,
                    done.submit_attempts,
                    done.latency.as_secs_f64()
                );
            }
            SessionEvent::LoginFinished(done) => {
                log::warn!(
                    "login failed after {} challenge search(es), {} submit(s): {}",
                    done.challenge_attempts,
                    done.submit_attempts,
                    done.reason.as_deref().unwrap_or("unknown")
                );
            }
            SessionEvent::Extraction(extraction) => {
                log::info!(
                    "fetched {} success={} ({:.2}s)",
                    extraction.record_type,
                    extraction.success,
                    extraction.latency.as_secs_f64()
                );
            }
            SessionEvent::Error(error) => {
                log::warn!("{} -> {}", error.stage, error.error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &SessionEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::with_logging();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        assert_eq!(dispatcher.len(), 2);

        dispatcher.dispatch(SessionEvent::Error(ErrorEvent {
            stage: "attendance".into(),
            error: "timeout".into(),
            timestamp: Utc::now(),
        }));
        dispatcher.dispatch(SessionEvent::Transition(TransitionEvent {
            from: LoginState::Idle,
            to: LoginState::CredentialsFilled,
            timestamp: Utc::now(),
        }));
        assert_eq!(*counter.0.lock().unwrap(), 2);
    }
}
