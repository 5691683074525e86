//! Session parameters and engine tuning knobs.

use crate::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to hunt: one `(location, party size)` tuple plus display names for
/// downstream rendering. Fixed for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Upstream location id the slot search runs against.
    pub location_id: String,
    /// Number of people to reserve for. Positive.
    pub party_size: u32,
    /// Country display name.
    pub country_name: String,
    /// Consulate display name.
    pub consulate_name: String,
    /// Service display name.
    pub service_name: String,
}

impl SearchParams {
    /// Minimal params with empty display names.
    #[must_use]
    pub fn new(location_id: impl Into<String>, party_size: u32) -> Self {
        Self {
            location_id: location_id.into(),
            party_size,
            country_name: String::new(),
            consulate_name: String::new(),
            service_name: String::new(),
        }
    }

    /// Attach display names.
    #[must_use]
    pub fn with_display_names(
        mut self,
        country: impl Into<String>,
        consulate: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        self.country_name = country.into();
        self.consulate_name = consulate.into();
        self.service_name = service.into();
        self
    }

    /// Whether the params can start a search.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.location_id.is_empty() && self.party_size > 0
    }
}

/// Engine tuning: backoff constants plus the booking loop's idle pacing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay policy for both loops.
    pub backoff: BackoffPolicy,
    /// How long the booking loop waits when no slots are published.
    idle_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Config with contract defaults.
    #[must_use]
    pub fn new() -> Self {
        Self { backoff: BackoffPolicy::default(), idle_delay_ms: 100 }
    }

    /// Replace the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the booking loop's idle wait.
    #[must_use]
    pub const fn with_idle_delay_ms(mut self, ms: u64) -> Self {
        self.idle_delay_ms = ms;
        self
    }

    /// The booking loop's idle wait.
    #[must_use]
    pub const fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}
