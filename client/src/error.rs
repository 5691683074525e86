//! Error types for the e-konsulat API client.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Upstream endpoint a structured API error originated from.
///
/// The engine's error classifier needs the origin to tell a CAPTCHA-verify
/// throttle (HTTP 403) apart from an ordinary forbidden response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// POST `/api/u-captcha/generuj`
    CaptchaGenerate,
    /// POST `/api/u-captcha/sprawdz`
    CaptchaVerify,
    /// GET `/api/konfiguracja/placowki/placowki-w-krajach/{lang}`
    Countries,
    /// POST `/api/rezerwacja-wizyt-wizowych/terminy/{location}/{amount}`
    Slots,
    /// POST `/api/rezerwacja-wizyt-wizowych/rezerwacje`
    Reservation,
}

impl Endpoint {
    /// Short name used in logs and error-log context fields.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CaptchaGenerate => "captcha_generate",
            Self::CaptchaVerify => "captcha_verify",
            Self::Countries => "countries",
            Self::Slots => "slots",
            Self::Reservation => "reservation",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure modes of the upstream HTTP surface.
///
/// The engine never matches on strings alone: transport, deadline, and
/// structured upstream failures are distinct variants so the classifier can
/// apply its rules without re-parsing anything.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// A request argument failed local validation (empty location, bad date,
    /// non-positive party size, empty token).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure: connection refused, DNS, TLS, broken pipe.
    #[error("network error: {0}")]
    Network(String),

    /// The per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The root cancellation token fired while the call was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// The response body could not be decoded (JSON or base64).
    #[error("response decoding failed: {0}")]
    Decode(String),

    /// Structured non-2xx upstream response.
    #[error("api error from {endpoint} (status {status}): {message}")]
    Api {
        /// Endpoint the response came from.
        endpoint: Endpoint,
        /// HTTP status code.
        status: u16,
        /// Upstream reason code, when the body carried one
        /// (e.g. `NIEPRAWIDLOWY_TOKEN`).
        reason: Option<String>,
        /// Raw body or upstream message.
        message: String,
    },

    /// The CAPTCHA verify endpoint rejected the submitted solution
    /// (`{ok: false}`).
    #[error("captcha solution rejected")]
    CaptchaRejected,

    /// The external solver failed or produced an unusable solution.
    #[error("captcha solver failed: {0}")]
    Solver(String),

    /// A reservation request returned HTTP 200 but no ticket: the slot was
    /// taken between search and booking.
    #[error("reservation returned no ticket")]
    NoTicket,
}

impl ClientError {
    /// The upstream reason code, if this error carries one.
    #[must_use]
    pub fn upstream_reason(&self) -> Option<&str> {
        match self {
            Self::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// HTTP status for structured upstream errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for failures of the transport itself (not the upstream
    /// application layer).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Cancelled)
    }
}
