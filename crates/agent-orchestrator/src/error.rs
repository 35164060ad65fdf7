//! Error types for the orchestration engine

use agent_core::AgentKind;
use thiserror::Error;

use crate::api::MARKET_DATA_SERVICE;
use agent_llm::error::COMPLETION_SERVICE;

/// Engine-level errors
///
/// Only `Validation` and `InsufficientResults` are returned from
/// [`AgentCoordinator::analyze`](crate::AgentCoordinator::analyze); every
/// other kind is absorbed into per-agent warnings.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// An agent task did not finish before the request deadline
    #[error("Agent '{agent}' timed out")]
    AgentTimeout {
        /// Agent that missed the deadline
        agent: String,
    },

    /// The breaker for an external service is open
    #[error("Circuit open for service '{service}'")]
    CircuitOpen {
        /// Service identity
        service: String,
    },

    /// A single failed call to an external service
    #[error("Transient failure from '{service}': {message}")]
    TransientService {
        /// Service identity
        service: String,
        /// Failure detail
        message: String,
    },

    /// The request was rejected before dispatch
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No agent produced a result
    #[error("No agent completed for {ticker} ({requested} requested)")]
    InsufficientResults {
        /// Ticker of the failed request
        ticker: String,
        /// Number of agents that were requested
        requested: usize,
    },

    /// The completion service answered with something unusable
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Market data could not be retrieved
    #[error("Market data error: {0}")]
    MarketData(String),

    /// The completion service failed permanently
    #[error("Completion service error: {0}")]
    Completion(String),

    /// An agent failed for a reason outside the taxonomy above
    #[error("Agent failed: {0}")]
    AgentFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Insight persistence failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Timeout for a specific agent
    pub fn agent_timeout(agent: AgentKind) -> Self {
        Self::AgentTimeout {
            agent: agent.to_string(),
        }
    }
}

/// Convert agent_core::Error to OrchestratorError
impl From<agent_core::Error> for OrchestratorError {
    fn from(err: agent_core::Error) -> Self {
        use agent_core::Error as E;
        match err {
            E::InvalidInput(msg) => Self::Validation(msg),
            E::CircuitOpen { service } => Self::CircuitOpen { service },
            E::Transient { service, message } => Self::TransientService { service, message },
            E::Timeout { service } => Self::AgentTimeout {
                agent: format!("{service} call"),
            },
            E::MalformedResponse(msg) => Self::MalformedResponse(msg),
            E::Unavailable { service, message } if service == MARKET_DATA_SERVICE => {
                Self::MarketData(message)
            },
            E::Unavailable { message, .. } => Self::Completion(message),
            E::Generic(msg) | E::ProcessingFailed(msg) => Self::AgentFailed(msg),
        }
    }
}

/// Convert OrchestratorError to agent_core::Error
impl From<OrchestratorError> for agent_core::Error {
    fn from(err: OrchestratorError) -> Self {
        use agent_core::Error as E;
        match err {
            OrchestratorError::Validation(msg) => E::InvalidInput(msg),
            OrchestratorError::CircuitOpen { service } => E::CircuitOpen { service },
            OrchestratorError::TransientService { service, message } => {
                E::Transient { service, message }
            },
            OrchestratorError::MalformedResponse(msg) => E::MalformedResponse(msg),
            OrchestratorError::Serialization(e) => E::MalformedResponse(e.to_string()),
            OrchestratorError::MarketData(message) => E::Unavailable {
                service: MARKET_DATA_SERVICE.to_string(),
                message,
            },
            OrchestratorError::Completion(message) => E::Unavailable {
                service: COMPLETION_SERVICE.to_string(),
                message,
            },
            other => E::ProcessingFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::agent_timeout(AgentKind::Technical);
        assert_eq!(err.to_string(), "Agent 'technical' timed out");

        let err = OrchestratorError::InsufficientResults {
            ticker: "AAPL".to_string(),
            requested: 4,
        };
        assert_eq!(err.to_string(), "No agent completed for AAPL (4 requested)");
    }

    #[test]
    fn test_unavailable_routes_by_service() {
        let err: OrchestratorError = agent_core::Error::Unavailable {
            service: MARKET_DATA_SERVICE.to_string(),
            message: "no quotes".to_string(),
        }
        .into();
        assert!(matches!(err, OrchestratorError::MarketData(_)));

        let err: OrchestratorError = agent_core::Error::Unavailable {
            service: COMPLETION_SERVICE.to_string(),
            message: "bad key".to_string(),
        }
        .into();
        assert!(matches!(err, OrchestratorError::Completion(_)));
    }

    #[test]
    fn test_transient_survives_round_trip() {
        let original = agent_core::Error::Transient {
            service: MARKET_DATA_SERVICE.to_string(),
            message: "rate limited".to_string(),
        };
        let engine: OrchestratorError = original.clone().into();
        let back: agent_core::Error = engine.into();
        assert_eq!(back, original);
        assert!(back.is_transient());
    }
}
