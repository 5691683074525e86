//! Coordinator: owns the store, the root cancellation token, and the two
//! loop tasks. This is the boundary UI/CLI collaborators drive.

use crate::actions::EngineAction;
use crate::config::{EngineConfig, SearchParams};
use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::providers::{BookingApi, CaptchaProvider, Clock};
use crate::state::{ConsulateDetails, EngineState, Phase};
use crate::store::EngineStore;
use crate::{booking, search};
use ekonsulat_client::{CancelToken, CheckSlotsResult, ReservationResult};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything a collaborator needs once the engine holds a reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutcome {
    /// The winning reservation.
    pub result: ReservationResult,
    /// The last successful slot search (token, consulate id, service type).
    pub last_search: Option<CheckSlotsResult>,
    /// Resolved consulate display details.
    pub consulate_details: Option<ConsulateDetails>,
}

/// The polling-and-booking engine.
///
/// # Lifecycle
///
/// ```text
/// configure(params) → start() → … → phase = success | stop()
/// ```
///
/// `start()` spawns the search and booking loops; the first successful
/// reservation latches the terminal state, fires cancellation into any
/// in-flight HTTP call, and both loops return within one iteration.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use ekonsulat_engine::config::{EngineConfig, SearchParams};
/// # use ekonsulat_engine::coordinator::Engine;
/// # use ekonsulat_engine::environment::EngineEnvironment;
/// # use ekonsulat_engine::providers::SystemClock;
/// # use ekonsulat_engine::mocks::{MockBookingApi, MockCaptchaProvider};
/// # async fn example() -> ekonsulat_engine::error::Result<()> {
/// # let env = EngineEnvironment::new(
/// #     Arc::new(MockBookingApi::new()),
/// #     Arc::new(MockCaptchaProvider::new()),
/// #     Arc::new(SystemClock),
/// # );
/// let engine = Engine::new(env, EngineConfig::new());
/// engine.configure(SearchParams::new("191", 1)).await?;
/// engine.start().await?;
/// engine.join().await;
/// if let Some(outcome) = engine.outcome().await {
///     println!("ticket: {}", outcome.result.primary_ticket.ticket_id);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Engine<A, P, C>
where
    A: BookingApi + 'static,
    P: CaptchaProvider + 'static,
    C: Clock + 'static,
{
    store: Arc<EngineStore<C>>,
    env: EngineEnvironment<A, P, C>,
    config: Arc<EngineConfig>,
    cancel: CancelToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<A, P, C> Engine<A, P, C>
where
    A: BookingApi + 'static,
    P: CaptchaProvider + 'static,
    C: Clock + 'static,
{
    /// Create an engine over the given environment.
    #[must_use]
    pub fn new(env: EngineEnvironment<A, P, C>, config: EngineConfig) -> Self {
        let store = Arc::new(EngineStore::new(Arc::clone(&env.clock)));
        Self {
            store,
            env,
            config: Arc::new(config),
            cancel: CancelToken::new(),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Store session parameters. Must run before [`Engine::start`].
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidParams`] on an empty location id or a
    /// non-positive party size; [`EngineError::Finished`] after success;
    /// [`EngineError::AlreadyStarted`] once the search is underway.
    pub async fn configure(&self, params: SearchParams) -> Result<()> {
        if !params.is_valid() {
            return Err(EngineError::InvalidParams(format!(
                "location {:?}, party size {}",
                params.location_id, params.party_size
            )));
        }
        match self.store.with_state(|s| s.phase).await {
            Phase::Params => {}
            Phase::Success => return Err(EngineError::Finished),
            Phase::Searching | Phase::Booking => return Err(EngineError::AlreadyStarted),
        }
        self.store.dispatch(EngineAction::SetParams { params }).await;
        Ok(())
    }

    /// Enter the `Searching` phase and spawn both loops.
    ///
    /// Idempotent while running: a second call is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotConfigured`] without parameters;
    /// [`EngineError::Finished`] after success; [`EngineError::Stopped`]
    /// after a user stop (the session's cancellation token is spent).
    pub async fn start(&self) -> Result<()> {
        let snap = self.store.snapshot().await;
        if snap.phase == Phase::Success {
            return Err(EngineError::Finished);
        }
        if self.cancel.is_cancelled() {
            return Err(EngineError::Stopped);
        }
        let Some(params) = snap.params else {
            return Err(EngineError::NotConfigured);
        };
        if snap.search.is_running {
            return Ok(());
        }

        self.store.dispatch(EngineAction::StartSearch).await;
        tracing::info!(
            location_id = %params.location_id,
            party_size = params.party_size,
            "engine started"
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(search::run_search_loop(
            Arc::clone(&self.store),
            self.env.clone(),
            Arc::clone(&self.config),
            params.clone(),
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(booking::run_booking_loop(
            Arc::clone(&self.store),
            self.env.clone(),
            Arc::clone(&self.config),
            params,
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// User quit: fire cancellation and stop both loops. The phase is left
    /// as-is. Terminal for the session; a stopped engine cannot be
    /// restarted.
    pub async fn stop(&self) {
        tracing::info!("engine stop requested");
        self.cancel.cancel();
        self.store.dispatch(EngineAction::StopAll).await;
    }

    /// Wait for both loops to return.
    pub async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().await;
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(error) = task.await {
                tracing::error!(error = %error, "engine loop task failed");
            }
        }
    }

    /// Subscribe to post-action state snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.store.subscribe()
    }

    /// Clone the current state.
    pub async fn snapshot(&self) -> EngineState {
        self.store.snapshot().await
    }

    /// The root cancellation token (shared with both loops).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The terminal outcome, once `phase = success`.
    pub async fn outcome(&self) -> Option<EngineOutcome> {
        self.store
            .with_state(|s| {
                if s.phase != Phase::Success {
                    return None;
                }
                s.reservation.result.clone().map(|result| EngineOutcome {
                    result,
                    last_search: s.search.last_result.clone(),
                    consulate_details: s.consulate_details.clone(),
                })
            })
            .await
    }
}
