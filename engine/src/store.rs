//! The engine store: serialized dispatch over the single mutable state.
//!
//! All reads and writes funnel through one write path; concurrent `dispatch`
//! calls serialize at the state lock, so observers always see a state some
//! prefix of the action stream produced. After every action the store
//! publishes an immutable snapshot on a watch channel for UI consumers.

use crate::actions::EngineAction;
use crate::providers::Clock;
use crate::reducer::EngineReducer;
use crate::state::EngineState;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Serialized owner of [`EngineState`].
///
/// Shared between the loops and the coordinator behind an `Arc`.
pub struct EngineStore<C: Clock> {
    state: Arc<RwLock<EngineState>>,
    reducer: EngineReducer,
    clock: Arc<C>,
    snapshots: watch::Sender<EngineState>,
}

impl<C: Clock> EngineStore<C> {
    /// Create a store with fresh state.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        let state = EngineState::new();
        let (snapshots, _) = watch::channel(state.clone());
        Self {
            state: Arc::new(RwLock::new(state)),
            reducer: EngineReducer::new(),
            clock,
            snapshots,
        }
    }

    /// Apply one action and publish the resulting snapshot.
    pub async fn dispatch(&self, action: EngineAction) {
        metrics::counter!("engine.actions.total", "action" => action.name()).increment(1);
        tracing::trace!(action = action.name(), "dispatching");

        let mut state = self.state.write().await;
        self.reducer.reduce(&mut state, action, self.clock.now());
        // Publish while still holding the write lock so snapshot order
        // matches action order.
        let _ = self.snapshots.send_replace(state.clone());
    }

    /// Clone the current state.
    pub async fn snapshot(&self) -> EngineState {
        self.state.read().await.clone()
    }

    /// Read a projection of the state without cloning all of it.
    pub async fn with_state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&EngineState) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Subscribe to post-action snapshots.
    ///
    /// The channel holds only the latest snapshot; slow consumers observe
    /// eventual consistency, not every intermediate state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.snapshots.subscribe()
    }
}
