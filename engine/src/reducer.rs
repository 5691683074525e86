//! The engine reducer: a pure function applying one action to the state.
//!
//! Every precondition from the action table lives here. Violations are not
//! errors: the loops race against phase changes by design, so a late action
//! is logged at debug level and dropped. The reducer is the only code that
//! writes [`EngineState`](crate::state::EngineState).

use crate::actions::EngineAction;
use crate::state::{push_capped, EngineState, Phase};
use chrono::{DateTime, Utc};

/// Pure state-transition function for [`EngineAction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineReducer;

impl EngineReducer {
    /// Create a reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Apply `action` to `state`. `now` is injected by the store so the
    /// reducer stays deterministic.
    #[allow(clippy::too_many_lines)]
    pub fn reduce(&self, state: &mut EngineState, action: EngineAction, now: DateTime<Utc>) {
        match action {
            EngineAction::SetParams { params } => {
                if state.phase != Phase::Params {
                    tracing::debug!(phase = %state.phase, "ignoring SetParams outside params phase");
                    return;
                }
                if !params.is_valid() {
                    tracing::warn!("ignoring invalid search params");
                    return;
                }
                state.params = Some(params);
            }

            EngineAction::StartSearch => {
                // Phase is monotone: once booking started, a restart request
                // must not regress it.
                if state.params.is_none()
                    || !matches!(state.phase, Phase::Params | Phase::Searching)
                {
                    tracing::debug!(phase = %state.phase, "ignoring StartSearch");
                    return;
                }
                state.phase = Phase::Searching;
                state.search.is_running = true;
                state.search.slots.clear();
                state.search.token = None;
                state.search.last_result = None;
                state.search.errors.clear();
                state.reservation.current_slot_index = 0;
                if state.stats.start_time.is_none() {
                    state.stats.start_time = Some(now);
                }
            }

            EngineAction::IncrementSearchAttempt => {
                if state.phase == Phase::Success {
                    return;
                }
                state.search.attempts += 1;
                state.search.last_attempt = Some(now);
            }

            EngineAction::UpdateSearch { slots, token, result } => {
                if state.phase == Phase::Success {
                    return;
                }

                let token_changed = state.search.token.as_deref() != Some(token.as_str());
                let idx = state.reservation.current_slot_index;

                state.search.slots = slots.into();
                state.search.token = Some(token);
                state.search.last_result = Some(result);

                if token_changed || state.search.slots.len() < idx + 1 {
                    state.reservation.current_slot_index = 0;
                } else {
                    // Same token, list still covers the index: keep racing
                    // the same slot, clamped defensively.
                    state.reservation.current_slot_index =
                        idx.min(state.search.slots.len().saturating_sub(1));
                }

                // Racing only makes sense while there is something to race.
                if state.phase == Phase::Booking {
                    state.reservation.is_running = !state.search.slots.is_empty();
                }
            }

            EngineAction::LogSearchError { entry } => {
                state.record_error(&entry);
                push_capped(&mut state.search.errors, entry);
            }

            EngineAction::RecordCaptchaSolved { duration_ms } => {
                state.stats.captcha_attempts += 1;
                state.stats.captcha_successes += 1;
                state.stats.total_solve_ms += duration_ms;
            }

            EngineAction::ConsulateDetailsLoaded { details } => {
                if state.consulate_details.is_none() {
                    state.consulate_details = Some(details);
                }
            }

            EngineAction::StartReservation => {
                if state.phase != Phase::Searching || state.search.slots.is_empty() {
                    tracing::debug!(phase = %state.phase, "ignoring StartReservation");
                    return;
                }
                state.phase = Phase::Booking;
                state.reservation.is_running = true;
                state.reservation.attempts = 0;
                state.reservation.current_slot_index = 0;
                state.reservation.errors.clear();
            }

            EngineAction::IncrementReservationAttempt => {
                if state.phase != Phase::Booking {
                    return;
                }
                state.reservation.attempts += 1;
            }

            EngineAction::TryNextSlot => {
                if state.phase != Phase::Booking || state.search.slots.is_empty() {
                    return;
                }
                state.reservation.current_slot_index =
                    (state.reservation.current_slot_index + 1) % state.search.slots.len();
            }

            EngineAction::LogReservationError { entry } => {
                state.record_error(&entry);
                push_capped(&mut state.reservation.errors, entry);
            }

            EngineAction::ReservationSuccess { result } => {
                if state.phase == Phase::Success {
                    tracing::debug!("duplicate ReservationSuccess ignored");
                    return;
                }
                if state.phase != Phase::Booking {
                    tracing::debug!(phase = %state.phase, "ignoring ReservationSuccess");
                    return;
                }
                tracing::info!(
                    ticket_id = %result.primary_ticket.ticket_id,
                    date = %result.primary_ticket.date,
                    "reservation latched"
                );
                state.reservation.result = Some(result);
                state.phase = Phase::Success;
                state.search.is_running = false;
                state.reservation.is_running = false;
            }

            EngineAction::StopAll => {
                state.search.is_running = false;
                state.reservation.is_running = false;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, ErrorClass};
    use crate::config::SearchParams;
    use crate::state::ErrorEntry;
    use ekonsulat_client::{
        CheckSlotsResult, ClientError, ReservationResult, ReservationTicket, Slot,
    };

    fn reduce_all(state: &mut EngineState, actions: Vec<EngineAction>) {
        let reducer = EngineReducer::new();
        for action in actions {
            reducer.reduce(state, action, Utc::now());
            assert!(state.invariants_hold(), "invariants violated after action");
        }
    }

    fn update(slots: &[&str], token: &str) -> EngineAction {
        let slots: Vec<Slot> = slots.iter().copied().map(Slot::new).collect();
        EngineAction::UpdateSearch {
            slots: slots.clone(),
            token: token.to_string(),
            result: CheckSlotsResult {
                slots,
                token: Some(token.to_string()),
                consulate_id: Some("24".to_string()),
                service_type: None,
                location_id: "191".to_string(),
            },
        }
    }

    fn ticket(id: &str) -> ReservationResult {
        let t = ReservationTicket {
            ticket_id: id.to_string(),
            date: "2026-01-12".to_string(),
            time: None,
            is_child_application: false,
        };
        ReservationResult { primary_ticket: t.clone(), tickets: vec![t], is_child_application: false }
    }

    fn entry(class: ErrorClass) -> ErrorEntry {
        ErrorEntry::new(
            Utc::now(),
            &Classification { class, upstream_reason: None },
            &ClientError::Timeout,
            "test",
        )
    }

    fn booking_state() -> EngineState {
        let mut state = EngineState::new();
        reduce_all(
            &mut state,
            vec![
                EngineAction::SetParams { params: SearchParams::new("191", 1) },
                EngineAction::StartSearch,
                update(&["2026-01-12", "2026-01-13"], "T1"),
                EngineAction::StartReservation,
            ],
        );
        state
    }

    #[test]
    fn test_set_params_requires_params_phase() {
        let mut state = booking_state();
        let before = state.params.clone();
        reduce_all(&mut state, vec![EngineAction::SetParams {
            params: SearchParams::new("other", 3),
        }]);
        assert_eq!(state.params, before);
    }

    #[test]
    fn test_start_search_requires_params() {
        let mut state = EngineState::new();
        reduce_all(&mut state, vec![EngineAction::StartSearch]);
        assert_eq!(state.phase, Phase::Params);

        reduce_all(
            &mut state,
            vec![EngineAction::SetParams { params: SearchParams::new("191", 1) }, EngineAction::StartSearch],
        );
        assert_eq!(state.phase, Phase::Searching);
        assert!(state.search.is_running);
        assert!(state.stats.start_time.is_some());
    }

    #[test]
    fn test_update_search_new_token_resets_index() {
        let mut state = booking_state();
        reduce_all(&mut state, vec![EngineAction::TryNextSlot]);
        assert_eq!(state.reservation.current_slot_index, 1);

        reduce_all(&mut state, vec![update(&["2026-01-12", "2026-01-13"], "T2")]);
        assert_eq!(state.reservation.current_slot_index, 0);
        assert_eq!(state.search.token.as_deref(), Some("T2"));
    }

    #[test]
    fn test_update_search_same_token_keeps_index() {
        let mut state = booking_state();
        reduce_all(&mut state, vec![EngineAction::TryNextSlot]);
        reduce_all(&mut state, vec![update(&["2026-01-12", "2026-01-13", "2026-01-14"], "T1")]);
        assert_eq!(state.reservation.current_slot_index, 1);
    }

    #[test]
    fn test_update_search_shrunken_list_resets_index() {
        let mut state = booking_state();
        reduce_all(&mut state, vec![EngineAction::TryNextSlot]);
        assert_eq!(state.reservation.current_slot_index, 1);
        reduce_all(&mut state, vec![update(&["2026-01-12"], "T1")]);
        assert_eq!(state.reservation.current_slot_index, 0);
    }

    #[test]
    fn test_try_next_slot_wraps() {
        let mut state = booking_state();
        reduce_all(&mut state, vec![EngineAction::TryNextSlot, EngineAction::TryNextSlot]);
        assert_eq!(state.reservation.current_slot_index, 0);
    }

    #[test]
    fn test_success_latch_is_idempotent_and_absorbing() {
        let mut state = booking_state();
        reduce_all(&mut state, vec![EngineAction::ReservationSuccess { result: ticket("A") }]);
        assert_eq!(state.phase, Phase::Success);
        assert!(state.all_stopped());

        // A racing second success and late search updates are ignored.
        reduce_all(
            &mut state,
            vec![
                EngineAction::ReservationSuccess { result: ticket("B") },
                update(&["2026-02-01"], "T9"),
                EngineAction::IncrementSearchAttempt,
                EngineAction::StartSearch,
            ],
        );
        assert_eq!(state.phase, Phase::Success);
        assert_eq!(
            state.reservation.result.as_ref().unwrap().primary_ticket.ticket_id,
            "A"
        );
        assert!(state.search.slots.len() == 2, "slots untouched after success");
    }

    #[test]
    fn test_success_requires_booking_phase() {
        let mut state = EngineState::new();
        reduce_all(
            &mut state,
            vec![
                EngineAction::SetParams { params: SearchParams::new("191", 1) },
                EngineAction::StartSearch,
                EngineAction::ReservationSuccess { result: ticket("A") },
            ],
        );
        assert_eq!(state.phase, Phase::Searching);
        assert!(state.reservation.result.is_none());
    }

    #[test]
    fn test_stop_all_preserves_phase() {
        let mut state = booking_state();
        reduce_all(&mut state, vec![EngineAction::StopAll]);
        assert_eq!(state.phase, Phase::Booking);
        assert!(state.all_stopped());
    }

    #[test]
    fn test_captcha_stats_flow() {
        let mut state = booking_state();
        reduce_all(
            &mut state,
            vec![
                EngineAction::LogSearchError { entry: entry(ErrorClass::Captcha) },
                EngineAction::LogSearchError { entry: entry(ErrorClass::Captcha) },
                EngineAction::RecordCaptchaSolved { duration_ms: 900 },
            ],
        );
        assert_eq!(state.stats.captcha_failures, 2);
        assert_eq!(state.stats.captcha_successes, 1);
        assert_eq!(state.stats.captcha_attempts, 3);
        assert_eq!(state.stats.avg_solve_ms(), Some(900));
        assert_eq!(state.stats.error_counts[&ErrorClass::Captcha], 2);
        assert_eq!(state.search.errors.len(), 2);
    }

    #[test]
    fn test_start_reservation_requires_slots() {
        let mut state = EngineState::new();
        reduce_all(
            &mut state,
            vec![
                EngineAction::SetParams { params: SearchParams::new("191", 1) },
                EngineAction::StartSearch,
                EngineAction::StartReservation,
            ],
        );
        assert_eq!(state.phase, Phase::Searching);
    }

    #[test]
    fn test_phase_is_monotone_across_action_storm() {
        // Phase rank must never decrease, whatever the interleaving.
        let mut state = EngineState::new();
        let reducer = EngineReducer::new();
        let mut last = state.phase;

        let storm = vec![
            EngineAction::SetParams { params: SearchParams::new("191", 1) },
            EngineAction::StartSearch,
            EngineAction::IncrementSearchAttempt,
            update(&["2026-01-12"], "T1"),
            EngineAction::StartReservation,
            EngineAction::StartSearch,
            EngineAction::IncrementReservationAttempt,
            EngineAction::TryNextSlot,
            update(&["2026-01-12"], "T2"),
            EngineAction::ReservationSuccess { result: ticket("A") },
            EngineAction::StartSearch,
            EngineAction::StopAll,
            EngineAction::ReservationSuccess { result: ticket("B") },
        ];
        for action in storm {
            reducer.reduce(&mut state, action, Utc::now());
            assert!(state.phase >= last, "phase went backwards");
            assert!(state.invariants_hold());
            last = state.phase;
        }
        assert_eq!(state.phase, Phase::Success);
    }
}
