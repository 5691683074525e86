//! Backoff policy.
//!
//! Translates an error class and the consecutive-failure history into the
//! next inter-attempt delay. Delays carry uniform jitter to avoid phase-locking
//! with other clients hammering the same endpoints.

use crate::classifier::ErrorClass;
use rand::Rng;
use std::time::Duration;

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Fatal: stop the session, do not retry.
    Stop,
    /// Sleep this long, then retry.
    Delay(Duration),
}

/// Delay policy constants, all in milliseconds.
///
/// The defaults are the repeatability contract; every constant has a
/// builder-style override.
///
/// # Example
///
/// ```
/// use ekonsulat_engine::backoff::BackoffPolicy;
///
/// let policy = BackoffPolicy::default().with_base_ms(250).with_jitter_ms(500);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Pacing base between successful polls.
    base_ms: u64,
    /// Floor after a soft rate limit.
    soft_base_ms: u64,
    /// First-failure CAPTCHA backoff.
    captcha_base_ms: u64,
    /// Exponential growth per consecutive CAPTCHA failure.
    captcha_multiplier: f64,
    /// Ceiling of the CAPTCHA backoff (before jitter).
    captcha_max_ms: u64,
    /// Delay when switching to the next slot.
    slot_switch_ms: u64,
    /// Delay when retrying the same slot after a structured API error.
    retry_ms: u64,
    /// Upper bound of the uniform jitter.
    jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 500,
            soft_base_ms: 3_000,
            captcha_base_ms: 2_500,
            captcha_multiplier: 2.0,
            captcha_max_ms: 12_000,
            slot_switch_ms: 100,
            retry_ms: 200,
            jitter_ms: 1_000,
        }
    }
}

impl BackoffPolicy {
    /// Set the pacing base between successful polls.
    #[must_use]
    pub const fn with_base_ms(mut self, ms: u64) -> Self {
        self.base_ms = ms;
        self
    }

    /// Set the soft-rate-limit floor.
    #[must_use]
    pub const fn with_soft_base_ms(mut self, ms: u64) -> Self {
        self.soft_base_ms = ms;
        self
    }

    /// Set the first-failure CAPTCHA backoff.
    #[must_use]
    pub const fn with_captcha_base_ms(mut self, ms: u64) -> Self {
        self.captcha_base_ms = ms;
        self
    }

    /// Set the CAPTCHA backoff ceiling.
    #[must_use]
    pub const fn with_captcha_max_ms(mut self, ms: u64) -> Self {
        self.captcha_max_ms = ms;
        self
    }

    /// Set the slot-switch delay.
    #[must_use]
    pub const fn with_slot_switch_ms(mut self, ms: u64) -> Self {
        self.slot_switch_ms = ms;
        self
    }

    /// Set the same-slot retry delay.
    #[must_use]
    pub const fn with_retry_ms(mut self, ms: u64) -> Self {
        self.retry_ms = ms;
        self
    }

    /// Set the jitter upper bound.
    #[must_use]
    pub const fn with_jitter_ms(mut self, ms: u64) -> Self {
        self.jitter_ms = ms;
        self
    }

    /// The slot-switch delay (booking loop, `slot_unavailable`).
    #[must_use]
    pub const fn slot_switch_delay(&self) -> Duration {
        Duration::from_millis(self.slot_switch_ms)
    }

    /// The same-slot retry delay (booking loop, `api` and friends).
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    /// Pacing between successful polls: `base + U(0, jitter)`.
    #[must_use]
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.base_ms + jitter(self.jitter_ms))
    }

    /// Deterministic part of the CAPTCHA backoff for `failures` consecutive
    /// failures: `min(captcha_base * multiplier^failures, captcha_max)`.
    #[must_use]
    pub fn captcha_backoff_floor(&self, failures: u32) -> u64 {
        let exp = self.captcha_base_ms as f64 * self.captcha_multiplier.powi(failures as i32);
        (exp as u64).min(self.captcha_max_ms)
    }

    /// Next delay for a failed attempt.
    ///
    /// `consecutive_captcha_failures` counts CAPTCHA failures since the last
    /// successful solve; it only influences the `Captcha` class.
    #[must_use]
    pub fn delay_for(&self, class: ErrorClass, consecutive_captcha_failures: u32) -> Backoff {
        let ms = match class {
            ErrorClass::RateLimitHard => return Backoff::Stop,
            ErrorClass::RateLimitSoft => self.soft_base_ms + jitter(2 * self.jitter_ms),
            ErrorClass::Captcha => {
                self.captcha_backoff_floor(consecutive_captcha_failures) + jitter(self.jitter_ms)
            }
            ErrorClass::Network | ErrorClass::Timeout => 2 * self.base_ms + jitter(self.jitter_ms),
            ErrorClass::SlotUnavailable => self.slot_switch_ms,
            ErrorClass::Api => self.retry_ms,
            ErrorClass::Unknown => self.retry_ms + jitter(self.jitter_ms),
        };
        Backoff::Delay(Duration::from_millis(ms))
    }
}

/// `U(0, max)` in milliseconds.
fn jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_ms)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn delay_ms(backoff: Backoff) -> u64 {
        match backoff {
            Backoff::Stop => panic!("expected a delay"),
            Backoff::Delay(d) => u64::try_from(d.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[test]
    fn test_hard_rate_limit_stops() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(ErrorClass::RateLimitHard, 0), Backoff::Stop);
        assert_eq!(policy.delay_for(ErrorClass::RateLimitHard, 7), Backoff::Stop);
    }

    #[test]
    fn test_soft_rate_limit_bounds() {
        let policy = BackoffPolicy::default();
        for _ in 0..50 {
            let ms = delay_ms(policy.delay_for(ErrorClass::RateLimitSoft, 0));
            assert!((3_000..=5_000).contains(&ms), "soft delay {ms} out of bounds");
        }
    }

    #[test]
    fn test_captcha_backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.captcha_backoff_floor(0), 2_500);
        assert_eq!(policy.captcha_backoff_floor(1), 5_000);
        assert_eq!(policy.captcha_backoff_floor(2), 10_000);
        // 2500 * 2^3 = 20000, capped
        assert_eq!(policy.captcha_backoff_floor(3), 12_000);
        assert_eq!(policy.captcha_backoff_floor(30), 12_000);

        // Deterministic floors are non-decreasing in the failure count.
        let floors: Vec<u64> = (0..6).map(|k| policy.captcha_backoff_floor(k)).collect();
        assert!(floors.windows(2).all(|w| w[0] <= w[1]));

        // Each jittered delay stays within [floor, cap + jitter].
        for k in 0..6 {
            let ms = delay_ms(policy.delay_for(ErrorClass::Captcha, k));
            assert!(ms >= policy.captcha_backoff_floor(k));
            assert!(ms <= 12_000 + 1_000, "captcha delay {ms} above cap+jitter");
        }
    }

    #[test]
    fn test_network_and_timeout_share_the_short_retry() {
        let policy = BackoffPolicy::default();
        for class in [ErrorClass::Network, ErrorClass::Timeout] {
            let ms = delay_ms(policy.delay_for(class, 0));
            assert!((1_000..=2_000).contains(&ms), "{class} delay {ms} out of bounds");
        }
    }

    #[test]
    fn test_booking_delays_are_fixed() {
        let policy = BackoffPolicy::default();
        assert_eq!(delay_ms(policy.delay_for(ErrorClass::SlotUnavailable, 0)), 100);
        assert_eq!(delay_ms(policy.delay_for(ErrorClass::Api, 0)), 200);
        assert_eq!(policy.slot_switch_delay(), Duration::from_millis(100));
        assert_eq!(policy.retry_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_poll_delay_bounds() {
        let policy = BackoffPolicy::default();
        for _ in 0..50 {
            let ms = u64::try_from(policy.poll_delay().as_millis()).unwrap_or(u64::MAX);
            assert!((500..=1_500).contains(&ms), "poll delay {ms} out of bounds");
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = BackoffPolicy::default().with_jitter_ms(0);
        assert_eq!(policy.poll_delay(), Duration::from_millis(500));
        assert_eq!(
            policy.delay_for(ErrorClass::RateLimitSoft, 0),
            Backoff::Delay(Duration::from_millis(3_000))
        );
    }
}
