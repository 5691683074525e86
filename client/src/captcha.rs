//! CAPTCHA pipeline: fetch an image, hand it to the solver, verify the
//! solution, return a short-lived verified search token.
//!
//! The pipeline is stateless between calls: every verified token it returns
//! is fresh, never cached, never reused.

use crate::cancel::CancelToken;
use crate::client::EkonsulatClient;
use crate::error::{ClientError, Result};
use crate::types::CaptchaChallenge;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External CAPTCHA solver.
///
/// The solver receives raw image bytes and the expected solution length, and
/// returns the decoded characters. Latency is observable but not bounded
/// here; the engine's backoff absorbs slow runs.
pub trait CaptchaSolver: Send + Sync {
    /// Solve a CAPTCHA image.
    ///
    /// # Errors
    ///
    /// Implementations report failures as [`ClientError::Solver`].
    fn solve(
        &self,
        image: &[u8],
        expected_len: usize,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// A freshly verified CAPTCHA token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCaptcha {
    /// Opaque search token, bound upstream to one `(location, party size)`
    /// tuple and consumed by a successful reservation.
    pub token: String,
    /// Wall-clock duration of the fetch-solve-verify round trip.
    pub solve_duration: Duration,
}

/// Fetch → solve → verify pipeline over an [`EkonsulatClient`] and a solver.
#[derive(Debug, Clone)]
pub struct CaptchaPipeline<S> {
    client: EkonsulatClient,
    solver: Arc<S>,
}

impl<S: CaptchaSolver> CaptchaPipeline<S> {
    /// Create a pipeline sharing the given client and solver.
    #[must_use]
    pub fn new(client: EkonsulatClient, solver: Arc<S>) -> Self {
        Self { client, solver }
    }

    /// Run one full CAPTCHA round trip and return a verified token.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CaptchaRejected`] when the verify endpoint answers
    ///   `{ok: false}`.
    /// - [`ClientError::Solver`] when the solver fails or returns a solution
    ///   of the wrong shape.
    /// - A 403 from the verify endpoint propagates as a structured API error
    ///   the engine classifies as a soft rate limit.
    /// - [`ClientError::Cancelled`] as soon as the token fires.
    pub async fn solve_verified(&self, cancel: &CancelToken) -> Result<VerifiedCaptcha> {
        let started = Instant::now();

        let challenge = self.client.generate_captcha(cancel).await?;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let code = self
            .solver
            .solve(&challenge.image, challenge.expected_len)
            .await?;
        validate_solution(&code, &challenge)?;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let outcome = self
            .client
            .verify_captcha(&code, &challenge.image_token, cancel)
            .await?;

        let solve_duration = started.elapsed();
        match outcome.token.filter(|t| !t.is_empty()) {
            Some(token) if outcome.ok => {
                tracing::debug!(
                    solve_ms = solve_duration.as_millis() as u64,
                    "captcha verified"
                );
                metrics::histogram!("captcha.solve_duration_seconds")
                    .record(solve_duration.as_secs_f64());
                Ok(VerifiedCaptcha { token, solve_duration })
            }
            _ => {
                metrics::counter!("captcha.rejected.total").increment(1);
                Err(ClientError::CaptchaRejected)
            }
        }
    }
}

/// The upstream only accepts solutions of exactly the advertised length made
/// of printable ASCII; reject anything else before burning a verify call.
fn validate_solution(code: &str, challenge: &CaptchaChallenge) -> Result<()> {
    if code.len() != challenge.expected_len {
        return Err(ClientError::Solver(format!(
            "solution length {} does not match expected {}",
            code.len(),
            challenge.expected_len
        )));
    }
    if !code.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ClientError::Solver("solution contains non-printable characters".into()));
    }
    Ok(())
}
