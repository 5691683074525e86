//! Search loop: the producer.
//!
//! Repeatedly acquires a verified CAPTCHA token, polls the slot endpoint, and
//! publishes the `(slots, token)` pair into the store. Runs until success is
//! latched, a hard rate limit kills the session, or the root token fires.
//! Phase is re-checked after every await point.

use crate::actions::EngineAction;
use crate::backoff::Backoff;
use crate::classifier::{classify, ErrorClass};
use crate::config::{EngineConfig, SearchParams};
use crate::environment::EngineEnvironment;
use crate::providers::{BookingApi, CaptchaProvider, Clock};
use crate::state::{ErrorEntry, Phase};
use crate::store::EngineStore;
use ekonsulat_client::{CancelToken, ClientError};
use std::sync::Arc;

/// Whether the loop should keep iterating.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LoopControl {
    Continue,
    Stop,
}

pub(crate) async fn run_search_loop<A, P, C>(
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
    tracing::info!(
        location_id = %params.location_id,
        party_size = params.party_size,
        "search loop started"
    );
    let mut consecutive_captcha_failures: u32 = 0;

    loop {
        let snap = store.snapshot().await;
        if cancel.is_cancelled() || snap.phase == Phase::Success || !snap.search.is_running {
            break;
        }

        store.dispatch(EngineAction::IncrementSearchAttempt).await;
        metrics::counter!("engine.search.attempts").increment(1);

        // 1. Fresh verified token.
        let verified = match env.captcha.solve_verified(&cancel).await {
            Ok(verified) => {
                consecutive_captcha_failures = 0;
                let duration_ms =
                    u64::try_from(verified.solve_duration.as_millis()).unwrap_or(u64::MAX);
                store
                    .dispatch(EngineAction::RecordCaptchaSolved { duration_ms })
                    .await;
                verified
            }
            Err(error) => {
                match handle_failure(
                    &store,
                    &env,
                    &config,
                    &cancel,
                    &error,
                    "solve_verified",
                    &mut consecutive_captcha_failures,
                )
                .await
                {
                    LoopControl::Stop => break,
                    LoopControl::Continue => continue,
                }
            }
        };

        // 2. Poll slots with it.
        match env
            .api
            .check_slots(&params.location_id, params.party_size, &verified.token, &cancel)
            .await
        {
            Ok(result) => {
                if store.with_state(|s| s.phase == Phase::Success).await {
                    break;
                }
                // The upstream sometimes omits the rotated token; the one we
                // sent remains valid in that case.
                let token = result
                    .token
                    .clone()
                    .unwrap_or_else(|| verified.token.clone());
                tracing::debug!(
                    slot_count = result.slots.len(),
                    token_rotated = result.token.is_some(),
                    "publishing search results"
                );
                store
                    .dispatch(EngineAction::UpdateSearch {
                        slots: result.slots.clone(),
                        token,
                        result,
                    })
                    .await;

                if cancel.sleep(config.backoff.poll_delay()).await {
                    break;
                }
            }
            Err(error) => {
                if handle_failure(
                    &store,
                    &env,
                    &config,
                    &cancel,
                    &error,
                    "check_slots",
                    &mut consecutive_captcha_failures,
                )
                .await
                    == LoopControl::Stop
                {
                    break;
                }
            }
        }
    }

    tracing::info!("search loop stopped");
}

/// Classify, log, and back off after a failed iteration.
///
/// Returns [`LoopControl::Stop`] on a hard rate limit, a fired token, or a
/// latched success.
async fn handle_failure<A, P, C>(
    store: &EngineStore<C>,
    env: &EngineEnvironment<A, P, C>,
    config: &EngineConfig,
    cancel: &CancelToken,
    error: &ClientError,
    context: &str,
    consecutive_captcha_failures: &mut u32,
) -> LoopControl
where
    A: BookingApi,
    P: CaptchaProvider,
    C: Clock,
{
    if store.with_state(|s| s.phase == Phase::Success).await {
        return LoopControl::Stop;
    }

    let classification = classify(error);
    tracing::warn!(
        class = %classification.class,
        context = context,
        error = %error,
        "search attempt failed"
    );
    metrics::counter!(
        "engine.errors.total",
        "loop" => "search",
        "class" => classification.class.name()
    )
    .increment(1);

    let entry = ErrorEntry::new(env.clock.now(), &classification, error, context);
    store.dispatch(EngineAction::LogSearchError { entry }).await;

    match classification.class {
        ErrorClass::Captcha => *consecutive_captcha_failures += 1,
        ErrorClass::RateLimitSoft | ErrorClass::Network | ErrorClass::Timeout => {
            *consecutive_captcha_failures = 0;
        }
        _ => {}
    }

    match config
        .backoff
        .delay_for(classification.class, *consecutive_captcha_failures)
    {
        Backoff::Stop => {
            tracing::error!("hard rate limit from upstream, stopping the session");
            store.dispatch(EngineAction::StopAll).await;
            cancel.cancel();
            LoopControl::Stop
        }
        Backoff::Delay(delay) => {
            tracing::debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "backing off");
            if cancel.sleep(delay).await {
                LoopControl::Stop
            } else {
                LoopControl::Continue
            }
        }
    }
}
