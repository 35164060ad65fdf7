//! Error types for agent-core

use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// Agent processing failed
    #[error("Agent processing failed: {0}")]
    ProcessingFailed(String),

    /// Input rejected before any work was attempted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The external service breaker is open; the call was not attempted
    #[error("Circuit open for service '{service}'")]
    CircuitOpen {
        /// Service identity (e.g. "completion")
        service: String,
    },

    /// A single failed call that may succeed on retry
    #[error("Transient failure from '{service}': {message}")]
    Transient {
        /// Service identity
        service: String,
        /// Failure detail
        message: String,
    },

    /// The call did not finish within the caller's remaining budget
    #[error("Call to '{service}' exceeded the request deadline")]
    Timeout {
        /// Service identity
        service: String,
    },

    /// The service answered but the payload could not be used
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Permanent failure (authentication, configuration, unknown model)
    #[error("Service '{service}' unavailable: {message}")]
    Unavailable {
        /// Service identity
        service: String,
        /// Failure detail
        message: String,
    },
}

impl Error {
    /// Whether a retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error counts against a service's circuit breaker
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::Timeout { .. } | Self::Unavailable { .. }
        )
    }
}
