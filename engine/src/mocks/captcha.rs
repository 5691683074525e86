//! Scripted CAPTCHA provider double.

use super::lock;
use crate::providers::CaptchaProvider;
use ekonsulat_client::{CancelToken, ClientError, Result, VerifiedCaptcha};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory [`CaptchaProvider`].
///
/// Each successful call mints a fresh token `T1`, `T2`, and so on, keeping
/// the pipeline contract that no token is reused. Failures are scripted as
/// a queue consumed before the next success.
#[derive(Debug, Clone, Default)]
pub struct MockCaptchaProvider {
    failures: Arc<Mutex<VecDeque<ClientError>>>,
    minted: Arc<AtomicU64>,
    solve_duration: Duration,
    latency: Duration,
}

impl MockCaptchaProvider {
    /// Create a double that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this solve duration on every success.
    #[must_use]
    pub fn with_solve_duration(mut self, duration: Duration) -> Self {
        self.solve_duration = duration;
        self
    }

    /// Add per-call latency (cancellable).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue one failure before the next success.
    pub fn queue_failure(&self, error: ClientError) {
        lock(&self.failures).push_back(error);
    }

    /// Queue `count` copies of the same failure.
    pub fn queue_failures(&self, count: usize, error: &ClientError) {
        let mut queue = lock(&self.failures);
        for _ in 0..count {
            queue.push_back(error.clone());
        }
    }

    /// How many tokens have been minted so far.
    #[must_use]
    pub fn minted(&self) -> u64 {
        self.minted.load(Ordering::SeqCst)
    }
}

impl CaptchaProvider for MockCaptchaProvider {
    async fn solve_verified(&self, cancel: &CancelToken) -> Result<VerifiedCaptcha> {
        if !self.latency.is_zero() && cancel.sleep(self.latency).await {
            return Err(ClientError::Cancelled);
        }

        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }

        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(VerifiedCaptcha {
            token: format!("T{n}"),
            solve_duration: self.solve_duration,
        })
    }
}
