//! Engine boundary errors.
//!
//! Loop failures never escape the engine; they land in the state's error
//! logs. These errors cover misuse of the boundary itself.

use thiserror::Error;

/// Result type alias for engine boundary operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by [`Engine`](crate::coordinator::Engine) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start()` was called before `configure()`.
    #[error("search parameters not configured")]
    NotConfigured,

    /// The supplied parameters cannot start a search.
    #[error("invalid search parameters: {0}")]
    InvalidParams(String),

    /// The engine already holds a reservation; it cannot be restarted.
    #[error("engine already finished")]
    Finished,

    /// `configure()` was called after the search had already started.
    #[error("engine already started")]
    AlreadyStarted,

    /// The engine was stopped; the session's cancellation is spent.
    #[error("engine stopped")]
    Stopped,
}
