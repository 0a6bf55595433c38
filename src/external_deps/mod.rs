//! Integrations that rely on third-party services.
//!
//! The portal's image challenge is read by an external classifier; this
//! module holds the adapter boundary for it.

pub mod captcha;

pub use captcha::{CaptchaError, CaptchaSolver, HttpCaptchaSolver};
