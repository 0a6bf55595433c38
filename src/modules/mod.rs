//! Cross-cutting services module.

pub mod events;

pub use events::{
    ErrorEvent, EventDispatcher, EventHandler, ExtractionEvent, LoggingHandler,
    LoginFinishedEvent, LoginStartedEvent, RetryEvent, SessionEvent, TransitionEvent,
};
