//! Multi-agent analysis orchestration engine
//!
//! Given a ticker, the engine fans out to independent analysis agents
//! (technical, fundamental, sentiment, risk), runs them concurrently under
//! one deadline with per-agent failure isolation, caches their outputs, and
//! synthesizes the results into one consensus recommendation.
//!
//! # Architecture
//!
//! - [`AgentCoordinator`]: validates requests, dispatches agents in
//!   dependency order, enforces the deadline, and builds the response
//! - [`CacheManager`]: bounded TTL + LRU cache shared across requests
//! - [`CircuitBreaker`]: per-service failure tracking shared across requests
//! - [`ServiceGateway`]: the breaker-, retry- and deadline-aware path from
//!   agents to the completion and market data services
//! - [`QualitySynthesizer`]: quality scoring, conflict resolution, consensus
//! - [`PerformanceMonitor`]: rolling health metrics fed by fire-and-forget
//!   events
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_llm::providers::AnthropicProvider;
//! use agent_orchestrator::{AgentCoordinator, OrchestratorConfig, YahooFinanceProvider};
//! use agent_core::{AnalysisRequest, AnalysisType};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OrchestratorConfig::default().with_env()?;
//!     let market = YahooFinanceProvider::new(config.market_data_rate_limit)?;
//!     let coordinator = AgentCoordinator::assemble(
//!         config,
//!         Arc::new(AnthropicProvider::from_env()?),
//!         Arc::new(market),
//!     );
//!
//!     let response = coordinator
//!         .analyze(AnalysisRequest::new("AAPL", AnalysisType::Comprehensive))
//!         .await?;
//!     println!("{}", response.insight.synthesis_summary);
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod api;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod prompts;
pub mod services;
pub mod store;
pub mod synthesis;

pub use agents::AgentRegistry;
pub use api::{MARKET_DATA_SERVICE, MarketDataProvider, YahooFinanceProvider};
pub use cache::{CacheKey, CacheManager, CacheStats};
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use config::{HealthThresholds, OrchestratorConfig, OrchestratorConfigBuilder};
pub use coordinator::{
    AgentCoordinator, AgentTask, AgentTaskReport, AnalysisResponse, PerformanceMetrics, Warning,
    WarningKind,
};
pub use error::{OrchestratorError, Result};
pub use monitor::{AgentStats, HealthReport, MonitorEvent, OverallHealth, PerformanceMonitor};
pub use notify::{NotificationPolicy, NotificationReason, Notifier, TracingNotifier};
pub use services::ServiceGateway;
pub use store::{InsightStore, JsonlInsightStore, NoopInsightStore};
pub use synthesis::{
    Action, QualitySynthesizer, QualityWeights, RiskLevel, Sentiment, SpecializationWeights,
    SynthesizedInsight,
};
