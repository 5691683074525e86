//! Booking loop: the consumer.
//!
//! Waits for the search loop to publish slots, then races reservations in
//! slot-index order using the token published with the slots it read; the
//! pair always comes from one snapshot, never mixed generations. The first
//! success cancels the session's in-flight work and latches the terminal
//! state. Reservations are never raced in parallel; parallelism exists only
//! between this loop and the search loop.

use crate::actions::EngineAction;
use crate::classifier::{classify, ErrorClass};
use crate::config::{EngineConfig, SearchParams};
use crate::environment::EngineEnvironment;
use crate::providers::{BookingApi, CaptchaProvider, Clock};
use crate::state::{ConsulateDetails, EngineState, ErrorEntry, Phase};
use crate::store::EngineStore;
use ekonsulat_client::{CancelToken, Country};
use std::sync::Arc;

pub(crate) async fn run_booking_loop<A, P, C>(
    store: Arc<EngineStore<C>>,
    env: EngineEnvironment<A, P, C>,
    config: Arc<EngineConfig>,
    params: SearchParams,
    cancel: CancelToken,
) where
    A: BookingApi,
    P: CaptchaProvider,
    C: Clock,
{
    tracing::info!(location_id = %params.location_id, "booking loop started");

    loop {
        let snap = store.snapshot().await;
        if cancel.is_cancelled() || snap.phase == Phase::Success || snap.all_stopped() {
            break;
        }

        if snap.search.slots.is_empty() {
            if cancel.sleep(config.idle_delay()).await {
                break;
            }
            continue;
        }

        // First slots seen: resolve display details, then open the race.
        if snap.phase == Phase::Searching {
            ensure_consulate_details(&store, &env, &snap, &params, &cancel).await;
            store.dispatch(EngineAction::StartReservation).await;
            continue;
        }

        // One consistent (slot, token) pair from the snapshot read above.
        let idx = snap.reservation.current_slot_index;
        let (Some(slot), Some(token)) = (snap.search.slots.get(idx), snap.search.token.as_deref())
        else {
            // Outran the published list; wait for the next search result.
            if cancel.sleep(config.idle_delay()).await {
                break;
            }
            continue;
        };

        store.dispatch(EngineAction::IncrementReservationAttempt).await;
        tracing::debug!(date = %slot.date, slot_index = idx, "attempting reservation");

        match env
            .api
            .create_reservation(&slot.date, &params.location_id, token, params.party_size, false, &cancel)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    ticket_id = %result.primary_ticket.ticket_id,
                    date = %result.primary_ticket.date,
                    "reservation won"
                );
                metrics::counter!("engine.reservations.won").increment(1);
                // Cancel first: an in-flight poll must not overwrite state
                // after success is latched.
                cancel.cancel();
                store.dispatch(EngineAction::StopAll).await;
                store.dispatch(EngineAction::ReservationSuccess { result }).await;
                break;
            }
            Err(error) => {
                if store.with_state(|s| s.phase == Phase::Success).await {
                    break;
                }

                let classification = classify(&error);
                tracing::warn!(
                    class = %classification.class,
                    date = %slot.date,
                    error = %error,
                    "reservation attempt failed"
                );
                metrics::counter!(
                    "engine.errors.total",
                    "loop" => "booking",
                    "class" => classification.class.name()
                )
                .increment(1);
                let entry =
                    ErrorEntry::new(env.clock.now(), &classification, &error, "create_reservation");
                store.dispatch(EngineAction::LogReservationError { entry }).await;

                let interrupted = match classification.class {
                    ErrorClass::RateLimitHard => {
                        tracing::error!("hard rate limit from upstream, stopping the session");
                        store.dispatch(EngineAction::StopAll).await;
                        cancel.cancel();
                        break;
                    }
                    ErrorClass::SlotUnavailable => {
                        store.dispatch(EngineAction::TryNextSlot).await;
                        cancel.sleep(config.backoff.slot_switch_delay()).await
                    }
                    // Same slot again: a stale token usually heals on the
                    // next search iteration.
                    _ => cancel.sleep(config.backoff.retry_delay()).await,
                };
                if interrupted {
                    break;
                }
            }
        }
    }

    tracing::info!("booking loop stopped");
}

/// Resolve consulate display details once, from the configuration endpoint.
///
/// Display-only data: a failure is logged and the race opens anyway.
async fn ensure_consulate_details<A, P, C>(
    store: &EngineStore<C>,
    env: &EngineEnvironment<A, P, C>,
    snap: &EngineState,
    params: &SearchParams,
    cancel: &CancelToken,
) where
    A: BookingApi,
    P: CaptchaProvider,
    C: Clock,
{
    if snap.consulate_details.is_some() {
        return;
    }

    match env.api.list_countries(cancel).await {
        Ok(countries) => {
            let consulate_id = snap
                .search
                .last_result
                .as_ref()
                .and_then(|r| r.consulate_id.clone());
            if let Some(details) =
                resolve_consulate_details(&countries, consulate_id.as_deref(), params)
            {
                store
                    .dispatch(EngineAction::ConsulateDetailsLoaded { details })
                    .await;
            }
        }
        Err(error) => {
            let classification = classify(&error);
            tracing::warn!(error = %error, "consulate details lookup failed");
            let entry =
                ErrorEntry::new(env.clock.now(), &classification, &error, "list_countries");
            store.dispatch(EngineAction::LogReservationError { entry }).await;
        }
    }
}

fn resolve_consulate_details(
    countries: &[Country],
    consulate_id: Option<&str>,
    params: &SearchParams,
) -> Option<ConsulateDetails> {
    let id = consulate_id?;
    for country in countries {
        if let Some(consulate) = country.consulates.iter().find(|c| c.id.to_string() == id) {
            return Some(ConsulateDetails {
                consulate_id: id.to_string(),
                country_name: country.name.clone(),
                consulate_name: consulate.name.clone(),
            });
        }
    }
    // Unknown id upstream: fall back to the operator-picked display names.
    Some(ConsulateDetails {
        consulate_id: id.to_string(),
        country_name: params.country_name.clone(),
        consulate_name: params.consulate_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ekonsulat_client::Consulate;

    #[test]
    fn test_resolve_consulate_details_by_id() {
        let countries = vec![Country {
            id: 5,
            name: "Białoruś".to_string(),
            consulates: vec![Consulate { id: 24, name: "Grodno".to_string() }],
        }];
        let params = SearchParams::new("191", 1);

        let details = resolve_consulate_details(&countries, Some("24"), &params)
            .map(|d| (d.country_name, d.consulate_name));
        assert_eq!(details, Some(("Białoruś".to_string(), "Grodno".to_string())));
    }

    #[test]
    fn test_resolve_consulate_details_falls_back_to_params() {
        let params = SearchParams::new("191", 1).with_display_names("Ukraina", "Lwów", "Wiza");
        let details = resolve_consulate_details(&[], Some("99"), &params);
        let details = details.map(|d| (d.country_name, d.consulate_name));
        assert_eq!(details, Some(("Ukraina".to_string(), "Lwów".to_string())));
    }

    #[test]
    fn test_resolve_consulate_details_requires_an_id() {
        let params = SearchParams::new("191", 1);
        assert!(resolve_consulate_details(&[], None, &params).is_none());
    }
}
