//! Error types for LLM operations

use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Service identity under which completion failures are reported
pub const COMPLETION_SERVICE: &str = "completion";

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LLMError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The call exceeded its timeout budget
    #[error("Request timed out")]
    Timeout,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Map provider failures onto the agent-level taxonomy
///
/// Rate limits, transport errors and upstream 5xx responses are transient;
/// authentication and configuration problems are permanent.
impl From<LLMError> for agent_core::Error {
    fn from(err: LLMError) -> Self {
        let service = COMPLETION_SERVICE.to_string();
        match err {
            LLMError::Timeout => agent_core::Error::Timeout { service },
            LLMError::HttpError(ref e) if e.is_timeout() => agent_core::Error::Timeout { service },
            LLMError::RateLimitExceeded(_)
            | LLMError::RequestFailed(_)
            | LLMError::HttpError(_) => agent_core::Error::Transient {
                service,
                message: err.to_string(),
            },
            LLMError::UnexpectedResponse(msg) => agent_core::Error::MalformedResponse(msg),
            LLMError::SerializationError(e) => agent_core::Error::MalformedResponse(e.to_string()),
            LLMError::AuthenticationFailed
            | LLMError::InvalidRequest(_)
            | LLMError::ModelNotFound(_)
            | LLMError::ConfigurationError(_) => agent_core::Error::Unavailable {
                service,
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let err: agent_core::Error = LLMError::RateLimitExceeded("slow down".to_string()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_auth_is_permanent() {
        let err: agent_core::Error = LLMError::AuthenticationFailed.into();
        assert!(matches!(err, agent_core::Error::Unavailable { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_maps_to_timeout() {
        let err: agent_core::Error = LLMError::Timeout.into();
        assert_eq!(
            err,
            agent_core::Error::Timeout {
                service: COMPLETION_SERVICE.to_string()
            }
        );
    }
}
