//! Engine actions.
//!
//! Actions are the only way to mutate [`EngineState`](crate::state::EngineState):
//! both loops and the coordinator describe what happened, and the serialized
//! reducer applies it. Commands the loops issue and events they report share
//! one closed enum.

use crate::config::SearchParams;
use crate::state::{ConsulateDetails, ErrorEntry};
use ekonsulat_client::{CheckSlotsResult, ReservationResult, Slot};

/// A serialized mutation of the engine state.
#[derive(Debug, Clone)]
pub enum EngineAction {
    /// Store session parameters. Only valid before the first search.
    SetParams {
        /// The `(location, party size)` tuple plus display names.
        params: SearchParams,
    },

    /// Enter the `Searching` phase: clear previous search results and stamp
    /// the run's start time.
    StartSearch,

    /// A search iteration is starting.
    IncrementSearchAttempt,

    /// Publish a fresh `(slots, token)` pair from a successful poll.
    ///
    /// If the token changed, or the list shrank past the slot the booking
    /// loop was targeting, the slot index resets to zero; otherwise it is
    /// clamped into the new list.
    UpdateSearch {
        /// Slots from the poll, upstream order.
        slots: Vec<Slot>,
        /// The token the booking loop must use with these slots.
        token: String,
        /// The full poll record, carried for downstream consumers.
        result: CheckSlotsResult,
    },

    /// Record a classified search-loop failure.
    LogSearchError {
        /// The log entry.
        entry: ErrorEntry,
    },

    /// A CAPTCHA round trip succeeded.
    RecordCaptchaSolved {
        /// Fetch-solve-verify duration in milliseconds.
        duration_ms: u64,
    },

    /// Consulate display details were resolved.
    ConsulateDetailsLoaded {
        /// The resolved details.
        details: ConsulateDetails,
    },

    /// Slots exist: enter the `Booking` phase and reset reservation
    /// progress.
    StartReservation,

    /// A reservation attempt is starting.
    IncrementReservationAttempt,

    /// The targeted slot is gone; advance to the next one (wrapping).
    TryNextSlot,

    /// Record a classified booking-loop failure.
    LogReservationError {
        /// The log entry.
        entry: ErrorEntry,
    },

    /// Latch the winning reservation. The only transition into `Success`;
    /// idempotent; later attempts are ignored.
    ReservationSuccess {
        /// The winning result.
        result: ReservationResult,
    },

    /// Tell both loops to stop. Does not change the phase.
    StopAll,
}

impl EngineAction {
    /// Stable name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetParams { .. } => "set_params",
            Self::StartSearch => "start_search",
            Self::IncrementSearchAttempt => "increment_search_attempt",
            Self::UpdateSearch { .. } => "update_search",
            Self::LogSearchError { .. } => "log_search_error",
            Self::RecordCaptchaSolved { .. } => "record_captcha_solved",
            Self::ConsulateDetailsLoaded { .. } => "consulate_details_loaded",
            Self::StartReservation => "start_reservation",
            Self::IncrementReservationAttempt => "increment_reservation_attempt",
            Self::TryNextSlot => "try_next_slot",
            Self::LogReservationError { .. } => "log_reservation_error",
            Self::ReservationSuccess { .. } => "reservation_success",
            Self::StopAll => "stop_all",
        }
    }
}
