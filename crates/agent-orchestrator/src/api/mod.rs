//! Market data providers
//!
//! Agents never call a provider directly; the
//! [`ServiceGateway`](crate::services::ServiceGateway) wraps every fetch in
//! the circuit breaker under [`MARKET_DATA_SERVICE`].

pub mod yahoo;

pub use yahoo::YahooFinanceProvider;

use crate::error::Result;
use agent_core::Bar;
use async_trait::async_trait;

/// Service identity under which market data failures are tracked
pub const MARKET_DATA_SERVICE: &str = "market_data";

/// Source of raw daily price series
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for `ticker`, oldest first
    ///
    /// Rate limiting and network failures should surface as
    /// `OrchestratorError::TransientService`; an unknown ticker or an empty
    /// series as `OrchestratorError::MarketData`.
    async fn fetch_series(&self, ticker: &str) -> Result<Vec<Bar>>;

    /// Get the provider name (e.g., "yahoo")
    fn name(&self) -> &str;
}
