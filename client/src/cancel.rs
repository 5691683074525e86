//! Cooperative cancellation for in-flight HTTP calls and engine loops.
//!
//! A single root [`CancelToken`] is cloned into both engine loops and passed
//! to every HTTP operation. Firing it aborts in-flight requests (surfaced as
//! [`ClientError::Cancelled`](crate::error::ClientError::Cancelled)) and
//! causes cooperative loops to return at their next await point.

use std::time::Duration;
use tokio::sync::watch;

/// Clonable cancellation token backed by a watch channel.
///
/// All clones observe the same flag; any clone may fire it. The token never
/// "un-cancels".
///
/// # Example
///
/// ```
/// use ekonsulat_client::cancel::CancelToken;
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// token.cancelled().await; // returns immediately
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a new, unfired token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        if self.tx.send_replace(true) {
            return;
        }
        tracing::debug!("cancellation fired");
    }

    /// Whether the token has been fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the token fires. Returns immediately if already fired.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // A sender half lives inside every clone of the token, so wait_for
        // can only fail after self is dropped.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless the token fires first.
    ///
    /// Returns `true` if the sleep was interrupted by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancelled() => true,
            () = tokio::time::sleep(duration) => false,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_unfired() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        token.cancel();

        assert!(clone.is_cancelled());
        clone.cancelled().await; // must not hang
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let token = CancelToken::new();
        let clone = token.clone();

        let waiter = tokio::spawn(async move { clone.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let interrupted = waiter.await.unwrap_or(false);
        assert!(interrupted, "sleep should report interruption");
    }

    #[tokio::test]
    async fn test_sleep_completes_when_unfired() {
        let token = CancelToken::new();
        let interrupted = token.sleep(Duration::from_millis(5)).await;
        assert!(!interrupted);
    }
}
