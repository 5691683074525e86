//! Engine state: the single source of truth for phase, search progress,
//! candidate slots, reservation progress, stats, and error logs.
//!
//! All mutation goes through the serialized dispatch path in
//! [`store`](crate::store); everything here is plain data plus invariant
//! helpers. Observers only ever see cloned snapshots.

use crate::classifier::{Classification, ErrorClass};
use crate::config::SearchParams;
use chrono::{DateTime, Utc};
use ekonsulat_client::{CheckSlotsResult, ClientError, ReservationResult, Slot};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Error-log entries kept per loop; older entries are dropped first.
pub(crate) const MAX_ERROR_LOG: usize = 256;

/// Coarse lifecycle of the engine.
///
/// The phase only ever advances: `Params → Searching → Booking → Success`.
/// `Success` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for search parameters.
    Params,
    /// Polling for slots.
    Searching,
    /// Slots seen; racing reservations (search keeps polling).
    Booking,
    /// A reservation ticket is held. Terminal.
    Success,
}

impl Phase {
    /// Whether this phase is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Params => "params",
            Self::Searching => "searching",
            Self::Booking => "booking",
            Self::Success => "success",
        };
        f.write_str(name)
    }
}

/// One classified failure, as recorded in a loop's error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
    /// Classifier output.
    pub class: ErrorClass,
    /// Human-readable message from the underlying error.
    pub message: String,
    /// Upstream reason code, when present.
    pub upstream_reason: Option<String>,
    /// Which operation failed (`"solve_verified"`, `"check_slots"`, …).
    pub context: String,
}

impl ErrorEntry {
    /// Build an entry from a classified client error.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        classification: &Classification,
        error: &ClientError,
        context: &str,
    ) -> Self {
        Self {
            timestamp,
            class: classification.class,
            message: error.to_string(),
            upstream_reason: classification.upstream_reason.clone(),
            context: context.to_string(),
        }
    }
}

/// Search-loop progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    /// Whether the search loop should keep running.
    pub is_running: bool,
    /// Total poll attempts.
    pub attempts: u64,
    /// Timestamp of the last attempt.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Current candidate slots, in upstream order. Slot lists are short (a
    /// handful of dates) and live inline.
    pub slots: SmallVec<[Slot; 8]>,
    /// Most recently published search token.
    pub token: Option<String>,
    /// The full record of the last successful poll.
    pub last_result: Option<CheckSlotsResult>,
    /// Classified failures, oldest first.
    pub errors: Vec<ErrorEntry>,
}

/// Booking-loop progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationState {
    /// Whether the booking loop is actively racing reservations.
    pub is_running: bool,
    /// Total reservation attempts.
    pub attempts: u64,
    /// Index into `search.slots` of the slot being attempted.
    pub current_slot_index: usize,
    /// The winning result, once there is one.
    pub result: Option<ReservationResult>,
    /// Classified failures, oldest first.
    pub errors: Vec<ErrorEntry>,
}

/// Aggregate run statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// When the first search started.
    pub start_time: Option<DateTime<Utc>>,
    /// CAPTCHA round trips attempted (successes + failures).
    pub captcha_attempts: u64,
    /// Accepted CAPTCHA solutions.
    pub captcha_successes: u64,
    /// Rejected solutions and solver failures.
    pub captcha_failures: u64,
    /// Total solve duration across successes, for the average.
    pub total_solve_ms: u64,
    /// Failures per class, both loops combined.
    pub error_counts: HashMap<ErrorClass, u64>,
}

impl EngineStats {
    /// Mean CAPTCHA solve duration in milliseconds, if any solve succeeded.
    #[must_use]
    pub fn avg_solve_ms(&self) -> Option<u64> {
        (self.captcha_successes > 0).then(|| self.total_solve_ms / self.captcha_successes)
    }

    /// Total running time as of `now`, once the first search has started.
    #[must_use]
    pub fn running_time(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.start_time.map(|start| now - start)
    }
}

/// Consulate display details resolved once from the configuration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsulateDetails {
    /// Upstream consulate id.
    pub consulate_id: String,
    /// Country display name.
    pub country_name: String,
    /// Consulate display name.
    pub consulate_name: String,
}

/// The engine aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Lifecycle phase.
    pub phase: Phase,
    /// Session parameters, set once before the first search.
    pub params: Option<SearchParams>,
    /// Search-loop substate.
    pub search: SearchState,
    /// Booking-loop substate.
    pub reservation: ReservationState,
    /// Run statistics.
    pub stats: EngineStats,
    /// Consulate details for downstream rendering, once resolved.
    pub consulate_details: Option<ConsulateDetails>,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Params
    }
}

impl EngineState {
    /// Fresh state awaiting parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot currently targeted by the booking loop, if the index is
    /// within the published list.
    #[must_use]
    pub fn current_slot(&self) -> Option<&Slot> {
        self.search.slots.get(self.reservation.current_slot_index)
    }

    /// Both loops have been told to stop (or never started).
    #[must_use]
    pub fn all_stopped(&self) -> bool {
        !self.search.is_running && !self.reservation.is_running
    }

    /// Panic-free structural invariant check, used by tests after every
    /// action.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let slot_index_ok = if self.search.slots.is_empty() {
            self.reservation.current_slot_index == 0
        } else {
            self.reservation.current_slot_index < self.search.slots.len()
        };

        let search_flag_ok =
            !self.search.is_running || matches!(self.phase, Phase::Searching | Phase::Booking);

        let reservation_flag_ok = !self.reservation.is_running
            || (self.phase == Phase::Booking && !self.search.slots.is_empty());

        let success_ok = self.phase != Phase::Success
            || (self.reservation.result.is_some() && self.all_stopped());

        slot_index_ok && search_flag_ok && reservation_flag_ok && success_ok
    }

    pub(crate) fn record_error(&mut self, entry: &ErrorEntry) {
        *self.stats.error_counts.entry(entry.class).or_insert(0) += 1;
        if entry.class == ErrorClass::Captcha {
            self.stats.captcha_attempts += 1;
            self.stats.captcha_failures += 1;
        }
    }
}

pub(crate) fn push_capped(log: &mut Vec<ErrorEntry>, entry: ErrorEntry) {
    if log.len() == MAX_ERROR_LOG {
        log.remove(0);
    }
    log.push(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering_matches_lifecycle() {
        assert!(Phase::Params < Phase::Searching);
        assert!(Phase::Searching < Phase::Booking);
        assert!(Phase::Booking < Phase::Success);
        assert!(Phase::Success.is_terminal());
        assert!(!Phase::Booking.is_terminal());
    }

    #[test]
    fn test_avg_solve_duration() {
        let mut stats = EngineStats::default();
        assert_eq!(stats.avg_solve_ms(), None);

        stats.captcha_successes = 4;
        stats.total_solve_ms = 6_000;
        assert_eq!(stats.avg_solve_ms(), Some(1_500));
    }

    #[test]
    fn test_running_time() {
        let mut stats = EngineStats::default();
        let now = Utc::now();
        assert_eq!(stats.running_time(now), None);

        stats.start_time = Some(now - chrono::Duration::seconds(42));
        assert_eq!(stats.running_time(now), Some(chrono::Duration::seconds(42)));
    }

    #[test]
    fn test_fresh_state_invariants() {
        let state = EngineState::new();
        assert_eq!(state.phase, Phase::Params);
        assert!(state.invariants_hold());
        assert!(state.all_stopped());
        assert!(state.current_slot().is_none());
    }

    #[test]
    fn test_invariants_catch_bad_slot_index() {
        let mut state = EngineState::new();
        state.reservation.current_slot_index = 2;
        assert!(!state.invariants_hold());

        state.search.slots.push(Slot::new("2026-01-12"));
        state.reservation.current_slot_index = 0;
        assert!(state.invariants_hold());
    }

    #[test]
    fn test_error_log_is_capped() {
        let entry = ErrorEntry {
            timestamp: Utc::now(),
            class: ErrorClass::Network,
            message: "refused".to_string(),
            upstream_reason: None,
            context: "check_slots".to_string(),
        };
        let mut log = Vec::new();
        for _ in 0..(MAX_ERROR_LOG + 10) {
            push_capped(&mut log, entry.clone());
        }
        assert_eq!(log.len(), MAX_ERROR_LOG);
    }
}
