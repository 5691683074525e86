//! Concurrency and lifecycle properties of the engine.

#![allow(clippy::unwrap_used)]

use chrono::{TimeZone, Utc};
use ekonsulat_client::{ClientError, Endpoint};
use ekonsulat_engine::actions::EngineAction;
use ekonsulat_engine::backoff::BackoffPolicy;
use ekonsulat_engine::config::{EngineConfig, SearchParams};
use ekonsulat_engine::coordinator::Engine;
use ekonsulat_engine::environment::EngineEnvironment;
use ekonsulat_engine::mocks::{
    slots_result, ticket_result, FixedClock, MockBookingApi, MockCaptchaProvider,
};
use ekonsulat_engine::providers::SystemClock;
use ekonsulat_engine::state::Phase;
use ekonsulat_engine::store::EngineStore;
use ekonsulat_engine::ErrorClass;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_config() -> EngineConfig {
    EngineConfig::new().with_idle_delay_ms(2).with_backoff(
        BackoffPolicy::default()
            .with_base_ms(80)
            .with_soft_base_ms(10)
            .with_captcha_base_ms(5)
            .with_captcha_max_ms(20)
            .with_slot_switch_ms(2)
            .with_retry_ms(10)
            .with_jitter_ms(0),
    )
}

fn engine_with<C: ekonsulat_engine::Clock + 'static>(
    api: &MockBookingApi,
    captcha: &MockCaptchaProvider,
    clock: Arc<C>,
) -> Engine<MockBookingApi, MockCaptchaProvider, C> {
    let env = EngineEnvironment::new(Arc::new(api.clone()), Arc::new(captcha.clone()), clock);
    Engine::new(env, fast_config())
}

#[tokio::test]
async fn at_most_one_winner() {
    // Even with more successes scripted than needed, exactly one reservation
    // call wins and its ticket is the one latched.
    let api = MockBookingApi::new();
    let captcha = MockCaptchaProvider::new();
    api.queue_check_slots(Ok(slots_result(&["2026-01-12"], Some("T1"), "191")));
    api.queue_reservation(Ok(ticket_result("FIRST", "2026-01-12")));
    api.queue_reservation(Ok(ticket_result("SECOND", "2026-01-12")));

    let engine = engine_with(&api, &captcha, Arc::new(SystemClock));
    engine.configure(SearchParams::new("191", 1)).await.unwrap();
    engine.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), engine.join())
        .await
        .unwrap();

    assert_eq!(api.reservation_calls().len(), 1);
    let outcome = engine.outcome().await.unwrap();
    assert_eq!(outcome.result.primary_ticket.ticket_id, "FIRST");
}

#[tokio::test]
async fn duplicate_success_dispatch_keeps_the_first_result() {
    // The state layer tolerates double dispatch: the latch is idempotent.
    let store = EngineStore::new(Arc::new(SystemClock));
    store
        .dispatch(EngineAction::SetParams { params: SearchParams::new("191", 1) })
        .await;
    store.dispatch(EngineAction::StartSearch).await;
    store
        .dispatch(EngineAction::UpdateSearch {
            slots: slots_result(&["2026-01-12"], Some("T1"), "191").slots,
            token: "T1".to_string(),
            result: slots_result(&["2026-01-12"], Some("T1"), "191"),
        })
        .await;
    store.dispatch(EngineAction::StartReservation).await;

    store
        .dispatch(EngineAction::ReservationSuccess { result: ticket_result("A", "2026-01-12") })
        .await;
    store
        .dispatch(EngineAction::ReservationSuccess { result: ticket_result("B", "2026-01-12") })
        .await;

    let state = store.snapshot().await;
    assert_eq!(state.phase, Phase::Success);
    assert_eq!(state.reservation.result.unwrap().primary_ticket.ticket_id, "A");
}

#[tokio::test]
async fn hard_rate_limit_from_booking_stops_both_loops() {
    let api = MockBookingApi::new();
    let captcha = MockCaptchaProvider::new();
    api.queue_check_slots(Ok(slots_result(&["2026-01-12"], Some("T1"), "191")));
    api.queue_reservation(Err(ClientError::Api {
        endpoint: Endpoint::Reservation,
        status: 400,
        reason: Some("LIMIT_Z_JEDNEGO_IP_PRZEKROCZONY".to_string()),
        message: "banned".to_string(),
    }));

    let engine = engine_with(&api, &captcha, Arc::new(SystemClock));
    engine.configure(SearchParams::new("191", 1)).await.unwrap();
    engine.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), engine.join())
        .await
        .unwrap();

    let state = engine.snapshot().await;
    assert_ne!(state.phase, Phase::Success);
    assert!(state.all_stopped());
    assert_eq!(state.stats.error_counts[&ErrorClass::RateLimitHard], 1);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_calls_promptly() {
    // The upstream hangs for a full minute; stop() must still bring both
    // loops home within scheduling slack.
    let api = MockBookingApi::new().with_latency(Duration::from_secs(60));
    let captcha = MockCaptchaProvider::new();

    let engine = engine_with(&api, &captcha, Arc::new(SystemClock));
    engine.configure(SearchParams::new("191", 1)).await.unwrap();
    engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stop_started = Instant::now();
    engine.stop().await;
    tokio::time::timeout(Duration::from_secs(2), engine.join())
        .await
        .unwrap();
    assert!(stop_started.elapsed() < Duration::from_secs(2));

    let state = engine.snapshot().await;
    assert_ne!(state.phase, Phase::Success);
    assert!(state.all_stopped());

    // A user stop spends the session's cancellation; no restart.
    assert!(engine.start().await.is_err());
}

#[tokio::test]
async fn snapshots_reach_subscribers() {
    let api = MockBookingApi::new();
    let captcha = MockCaptchaProvider::new();
    api.queue_check_slots(Ok(slots_result(&["2026-01-12"], Some("T1"), "191")));
    api.queue_reservation(Ok(ticket_result("R1", "2026-01-12")));

    let engine = engine_with(&api, &captcha, Arc::new(SystemClock));
    let mut rx = engine.subscribe();

    engine.configure(SearchParams::new("191", 1)).await.unwrap();
    engine.start().await.unwrap();

    let observed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if rx.borrow_and_update().phase == Phase::Success {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(observed.is_ok(), "subscriber never observed success");

    engine.join().await;
}

#[tokio::test]
async fn error_entries_carry_the_injected_clock() {
    let pinned = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(pinned));

    let api = MockBookingApi::new();
    let captcha = MockCaptchaProvider::new();
    captcha.queue_failure(ClientError::CaptchaRejected);
    api.queue_check_slots(Ok(slots_result(&["2026-01-12"], Some("T1"), "191")));
    api.queue_reservation(Ok(ticket_result("R1", "2026-01-12")));

    let engine = engine_with(&api, &captcha, clock);
    engine.configure(SearchParams::new("191", 1)).await.unwrap();
    engine.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), engine.join())
        .await
        .unwrap();

    let state = engine.snapshot().await;
    assert_eq!(state.search.errors.len(), 1);
    assert_eq!(state.search.errors[0].timestamp, pinned);
    assert_eq!(state.stats.start_time, Some(pinned));
}

#[tokio::test]
async fn restart_attempts_after_success_are_rejected() {
    let api = MockBookingApi::new();
    let captcha = MockCaptchaProvider::new();
    api.queue_check_slots(Ok(slots_result(&["2026-01-12"], Some("T1"), "191")));
    api.queue_reservation(Ok(ticket_result("R1", "2026-01-12")));

    let engine = engine_with(&api, &captcha, Arc::new(SystemClock));
    engine.configure(SearchParams::new("191", 1)).await.unwrap();
    engine.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), engine.join())
        .await
        .unwrap();

    assert_eq!(engine.snapshot().await.phase, Phase::Success);
    assert!(engine.start().await.is_err());
    assert!(engine.configure(SearchParams::new("191", 1)).await.is_err());
}
