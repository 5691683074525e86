//! # e-konsulat API client
//!
//! Typed HTTP surface for the Polish consular booking API (e-konsulat),
//! consumed by the polling-and-booking engine:
//!
//! - [`client::EkonsulatClient`]: stateless, thread-safe wrappers over the
//!   five upstream endpoints, with per-request deadlines and cooperative
//!   cancellation.
//! - [`captcha::CaptchaPipeline`]: fetch, solve, verify; produces fresh
//!   short-lived search tokens through an external [`captcha::CaptchaSolver`].
//! - [`cancel::CancelToken`]: the root cancellation handle shared by the
//!   engine loops and every HTTP call.
//! - [`types`]: wire records (Polish field names) and the domain value
//!   records the engine stores in its state.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cancel;
pub mod captcha;
pub mod client;
pub mod error;
pub mod types;

pub use cancel::CancelToken;
pub use captcha::{CaptchaPipeline, CaptchaSolver, VerifiedCaptcha};
pub use client::EkonsulatClient;
pub use error::{ClientError, Endpoint, Result};
pub use types::{
    CaptchaChallenge, CheckSlotsResult, Consulate, Country, ReservationResult, ReservationTicket,
    Slot, VerifyOutcome,
};
