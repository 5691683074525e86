//! # e-konsulat polling-and-booking engine
//!
//! A dual-loop engine that hunts for appointment slots on the e-konsulat
//! booking API and races to reserve the first one observed:
//!
//! - the **search loop** (internal) acquires CAPTCHA-verified tokens and
//!   publishes fresh `(slots, token)` pairs;
//! - the **booking loop** (internal) consumes them and races reservations in
//!   slot order;
//! - a single serialized [`store::EngineStore`] owns all mutable state: the
//!   loops describe what happened as [`actions::EngineAction`] values and a
//!   pure [`reducer::EngineReducer`] applies them, so observers always see
//!   consistent snapshots;
//! - [`classifier::classify`] maps every failure into a closed taxonomy and
//!   [`backoff::BackoffPolicy`] turns class + history into the next delay;
//! - the [`coordinator::Engine`] starts and stops the loops, guarantees at
//!   most one winner, and exposes snapshots to UI collaborators.
//!
//! ## Architecture
//!
//! ```text
//! Search loop ──UpdateSearch──▶ EngineStore ◀──ReservationSuccess── Booking loop
//!      ▲                            │ snapshots                         ▲
//!      └────── CancelToken ─────────┴──────── CancelToken ──────────────┘
//! ```
//!
//! The first successful reservation fires cancellation into any in-flight
//! HTTP call *before* the success action is published, then latches the
//! terminal `Success` phase; both loops observe it within one iteration.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod actions;
pub mod backoff;
mod booking;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod mocks;
pub mod providers;
pub mod reducer;
mod search;
pub mod state;
pub mod store;

pub use actions::EngineAction;
pub use backoff::{Backoff, BackoffPolicy};
pub use classifier::{classify, Classification, ErrorClass};
pub use config::{EngineConfig, SearchParams};
pub use coordinator::{Engine, EngineOutcome};
pub use environment::EngineEnvironment;
pub use error::{EngineError, Result};
pub use providers::{BookingApi, CaptchaProvider, Clock, SystemClock};
pub use state::{EngineState, ErrorEntry, Phase};
pub use store::EngineStore;
