//! Authentication: request signing, the image challenge and the login flow.

pub mod captcha;
pub mod login;
pub mod signer;

pub use captcha::{CaptchaChallenge, ChallengeError};
pub use login::{
    LoginAttempt, LoginConfig, LoginError, LoginOutcome, LoginSelectors, LoginState,
    LoginStateMachine,
};
pub use signer::{RequestSignature, SignerError};
