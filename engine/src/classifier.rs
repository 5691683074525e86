//! Error classification.
//!
//! Maps any failure coming out of the API surface into a closed taxonomy the
//! backoff policy and loops act on. Pure: no I/O, total over every
//! [`ClientError`] value, never panics.

use ekonsulat_client::{ClientError, Endpoint};
use serde::{Deserialize, Serialize};

/// Upstream reason code for the per-IP reservation ban (~24 h).
pub const REASON_HARD_LIMIT: &str = "LIMIT_Z_JEDNEGO_IP_PRZEKROCZONY";
/// Upstream reason code for "no free slots".
pub const REASON_NO_SLOTS: &str = "BRAK_WOLNYCH_TERMINOW";
/// Upstream reason code for a stale or consumed search token.
pub const REASON_BAD_TOKEN: &str = "NIEPRAWIDLOWY_TOKEN";
/// Upstream reason code for a slot reserved by someone else first.
pub const REASON_SLOT_TAKEN: &str = "TERMIN_ZAJETY";

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Per-IP ban. Fatal for the session: stop everything, do not retry.
    RateLimitHard,
    /// Transient throttle (429-class, or a 403 from CAPTCHA verify).
    RateLimitSoft,
    /// CAPTCHA rejected or the solver produced an invalid code.
    Captcha,
    /// The targeted slot is gone; move to the next one.
    SlotUnavailable,
    /// Other structured upstream failure.
    Api,
    /// Deadline elapsed or the call was cancelled.
    Timeout,
    /// Transport failure.
    Network,
    /// Anything unclassified.
    Unknown,
}

impl ErrorClass {
    /// Stable snake_case name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RateLimitHard => "rate_limit_hard",
            Self::RateLimitSoft => "rate_limit_soft",
            Self::Captcha => "captcha",
            Self::SlotUnavailable => "slot_unavailable",
            Self::Api => "api",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification outcome: the class plus the upstream reason code, when the
/// failure carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The failure class.
    pub class: ErrorClass,
    /// Upstream reason code (`NIEPRAWIDLOWY_TOKEN`, …), preserved verbatim.
    pub upstream_reason: Option<String>,
}

impl Classification {
    fn bare(class: ErrorClass) -> Self {
        Self { class, upstream_reason: None }
    }

    fn with_reason(class: ErrorClass, reason: &str) -> Self {
        Self { class, upstream_reason: Some(reason.to_string()) }
    }
}

/// Classify a failure. Rules apply in order; the first match wins.
#[must_use]
pub fn classify(error: &ClientError) -> Classification {
    match error {
        // A 2xx reservation without a ticket is the domain-level
        // slot-unavailable signal.
        ClientError::NoTicket => Classification::bare(ErrorClass::SlotUnavailable),

        ClientError::Api { endpoint, status, reason, message } => {
            classify_api(*endpoint, *status, reason.as_deref(), message)
        }

        ClientError::CaptchaRejected | ClientError::Solver(_) => {
            Classification::bare(ErrorClass::Captcha)
        }

        ClientError::Timeout | ClientError::Cancelled => Classification::bare(ErrorClass::Timeout),

        ClientError::Network(_) => Classification::bare(ErrorClass::Network),

        // Local argument validation is reported the way the upstream would
        // reject the same request.
        ClientError::InvalidArgument(_) => Classification::bare(ErrorClass::Api),

        ClientError::Decode(message) => {
            if message_mentions_captcha(message) {
                Classification::bare(ErrorClass::Captcha)
            } else {
                Classification::bare(ErrorClass::Unknown)
            }
        }
    }
}

fn classify_api(
    endpoint: Endpoint,
    status: u16,
    reason: Option<&str>,
    message: &str,
) -> Classification {
    // Slot taken carries the same policy as an empty-ticket response.
    if reason == Some(REASON_SLOT_TAKEN) {
        return Classification::with_reason(ErrorClass::SlotUnavailable, REASON_SLOT_TAKEN);
    }

    if reason == Some(REASON_HARD_LIMIT) {
        return Classification::with_reason(ErrorClass::RateLimitHard, REASON_HARD_LIMIT);
    }

    if status == 429 || message.to_ascii_lowercase().contains("too many requests") {
        return Classification { class: ErrorClass::RateLimitSoft, upstream_reason: reason.map(str::to_string) };
    }

    if (400..500).contains(&status) {
        if let Some(code) = reason {
            if code == REASON_NO_SLOTS || code == REASON_BAD_TOKEN {
                return Classification::with_reason(ErrorClass::Api, code);
            }
        }
    }

    // The verify endpoint answers 403 when it throttles verification.
    if endpoint == Endpoint::CaptchaVerify && status == 403 {
        return Classification::bare(ErrorClass::RateLimitSoft);
    }

    if message_mentions_captcha(message) {
        return Classification { class: ErrorClass::Captcha, upstream_reason: reason.map(str::to_string) };
    }

    if (400..600).contains(&status) {
        return Classification { class: ErrorClass::Api, upstream_reason: reason.map(str::to_string) };
    }

    Classification::bare(ErrorClass::Unknown)
}

fn message_mentions_captcha(message: &str) -> bool {
    message.to_ascii_lowercase().contains("captcha")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(endpoint: Endpoint, status: u16, reason: Option<&str>, message: &str) -> ClientError {
        ClientError::Api {
            endpoint,
            status,
            reason: reason.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_rules_in_order() {
        // (error, expected class, expected reason), one row per rule.
        let cases: Vec<(ClientError, ErrorClass, Option<&str>)> = vec![
            // 1. 200 with empty ticket
            (ClientError::NoTicket, ErrorClass::SlotUnavailable, None),
            // 1'. TERMIN_ZAJETY carries slot-unavailable policy
            (
                api(Endpoint::Reservation, 400, Some(REASON_SLOT_TAKEN), "taken"),
                ErrorClass::SlotUnavailable,
                Some(REASON_SLOT_TAKEN),
            ),
            // 2. hard per-IP limit, regardless of status
            (
                api(Endpoint::Slots, 400, Some(REASON_HARD_LIMIT), "banned"),
                ErrorClass::RateLimitHard,
                Some(REASON_HARD_LIMIT),
            ),
            // 3. 429 and "too many requests"
            (api(Endpoint::Slots, 429, None, "slow down"), ErrorClass::RateLimitSoft, None),
            (
                api(Endpoint::Slots, 400, None, "Too Many Requests from this client"),
                ErrorClass::RateLimitSoft,
                None,
            ),
            // 4. known-reason 4xx stays api with reason preserved
            (
                api(Endpoint::Slots, 400, Some(REASON_NO_SLOTS), "none"),
                ErrorClass::Api,
                Some(REASON_NO_SLOTS),
            ),
            (
                api(Endpoint::Reservation, 400, Some(REASON_BAD_TOKEN), "stale"),
                ErrorClass::Api,
                Some(REASON_BAD_TOKEN),
            ),
            // 5. 403 from CAPTCHA verify is a verification throttle
            (api(Endpoint::CaptchaVerify, 403, None, "forbidden"), ErrorClass::RateLimitSoft, None),
            // ...but a 403 elsewhere is a plain api error
            (api(Endpoint::Slots, 403, None, "forbidden"), ErrorClass::Api, None),
            // 6. captcha-shaped failures
            (ClientError::CaptchaRejected, ErrorClass::Captcha, None),
            (ClientError::Solver("blurry".into()), ErrorClass::Captcha, None),
            (api(Endpoint::Slots, 400, None, "Captcha invalid"), ErrorClass::Captcha, None),
            // 7. deadline and cancellation
            (ClientError::Timeout, ErrorClass::Timeout, None),
            (ClientError::Cancelled, ErrorClass::Timeout, None),
            // 8. transport
            (ClientError::Network("connection refused".into()), ErrorClass::Network, None),
            // 9. remaining 4xx/5xx
            (api(Endpoint::Slots, 500, None, "boom"), ErrorClass::Api, None),
            (api(Endpoint::Reservation, 404, None, "missing"), ErrorClass::Api, None),
            // 10. anything else
            (ClientError::Decode("bad json".into()), ErrorClass::Unknown, None),
            (ClientError::InvalidArgument("empty token".into()), ErrorClass::Api, None),
        ];

        for (error, class, reason) in cases {
            let c = classify(&error);
            assert_eq!(c.class, class, "class for {error:?}");
            assert_eq!(c.upstream_reason.as_deref(), reason, "reason for {error:?}");
        }
    }

    #[test]
    fn test_hard_limit_beats_soft_signals() {
        // A 429 body carrying the ban reason is still fatal.
        let c = classify(&api(Endpoint::Slots, 429, Some(REASON_HARD_LIMIT), "banned"));
        assert_eq!(c.class, ErrorClass::RateLimitHard);
    }

    #[test]
    fn test_class_names_are_snake_case() {
        assert_eq!(ErrorClass::RateLimitHard.name(), "rate_limit_hard");
        assert_eq!(ErrorClass::SlotUnavailable.to_string(), "slot_unavailable");
    }
}
