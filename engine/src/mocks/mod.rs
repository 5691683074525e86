//! Scripted test doubles for the provider traits.
//!
//! The doubles run the real loops at memory speed: responses are queued per
//! endpoint, every call is recorded with its arguments, and optional latency
//! honours cancellation so timeout/cancel paths are exercisable.

mod booking_api;
mod captcha;
mod clock;

pub use booking_api::{CheckSlotsCall, MockBookingApi, ReservationCall};
pub use captcha::MockCaptchaProvider;
pub use clock::FixedClock;

use ekonsulat_client::{CheckSlotsResult, ReservationResult, ReservationTicket, Slot};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mock's interior state, recovering from poisoning: a panicking test
/// must not cascade into every test sharing the double.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a [`CheckSlotsResult`] for scripting.
#[must_use]
pub fn slots_result(dates: &[&str], token: Option<&str>, location_id: &str) -> CheckSlotsResult {
    CheckSlotsResult {
        slots: dates.iter().copied().map(Slot::new).collect(),
        token: token.map(str::to_string),
        consulate_id: Some("24".to_string()),
        service_type: Some("wiza-krajowa".to_string()),
        location_id: location_id.to_string(),
    }
}

/// Build a single-ticket [`ReservationResult`] for scripting.
#[must_use]
pub fn ticket_result(ticket_id: &str, date: &str) -> ReservationResult {
    let ticket = ReservationTicket {
        ticket_id: ticket_id.to_string(),
        date: date.to_string(),
        time: None,
        is_child_application: false,
    };
    ReservationResult {
        primary_ticket: ticket.clone(),
        tickets: vec![ticket],
        is_child_application: false,
    }
}
