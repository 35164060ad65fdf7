//! Yahoo Finance market data provider

use super::{MARKET_DATA_SERVICE, MarketDataProvider};
use crate::error::{OrchestratorError, Result};
use agent_core::Bar;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Calendar days of history requested; covers the 50-day average with slack
const HISTORY_DAYS: i64 = 120;

/// Yahoo Finance provider, rate limited per process
pub struct YahooFinanceProvider {
    connector: yahoo::YahooConnector,
    rate_limiter: SharedRateLimiter,
    history_days: i64,
}

impl YahooFinanceProvider {
    /// Create a provider allowing `requests_per_second` fetches
    pub fn new(requests_per_second: u32) -> Result<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| OrchestratorError::MarketData(format!("Yahoo client setup failed: {e}")))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            connector,
            rate_limiter,
            history_days: HISTORY_DAYS,
        })
    }

    /// Override how many calendar days of history are fetched
    pub fn with_history_days(mut self, days: i64) -> Self {
        self.history_days = days.max(1);
        self
    }

    fn transient(message: impl std::fmt::Display) -> OrchestratorError {
        OrchestratorError::TransientService {
            service: MARKET_DATA_SERVICE.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    #[instrument(skip(self))]
    async fn fetch_series(&self, ticker: &str) -> Result<Vec<Bar>> {
        self.rate_limiter.until_ready().await;

        let end = Utc::now();
        let start = end - chrono::Duration::days(self.history_days);

        // Convert chrono DateTime to time OffsetDateTime
        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| OrchestratorError::MarketData(format!("Invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| OrchestratorError::MarketData(format!("Invalid end timestamp: {e}")))?;

        let response = self
            .connector
            .get_quote_history(ticker, start_odt, end_odt)
            .await
            .map_err(Self::transient)?;

        let quotes = response
            .quotes()
            .map_err(|e| OrchestratorError::MarketData(format!("{ticker}: {e}")))?;

        let bars: Vec<Bar> = quotes
            .iter()
            .filter(|q| q.close.is_finite() && q.close > 0.0)
            .map(|q| Bar {
                timestamp: DateTime::from_timestamp(q.timestamp as i64, 0)
                    .unwrap_or_else(Utc::now),
                open: q.open,
                high: q.high,
                low: q.low,
                close: q.close,
                volume: q.volume,
            })
            .collect();

        if bars.is_empty() {
            return Err(OrchestratorError::MarketData(format!(
                "no price history for {ticker}"
            )));
        }

        debug!(bars = bars.len(), "fetched price history");
        Ok(bars)
    }

    fn name(&self) -> &'static str {
        "yahoo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_clamped() {
        let provider = YahooFinanceProvider::new(0).unwrap().with_history_days(0);
        assert_eq!(provider.history_days, 1);
        assert_eq!(provider.name(), "yahoo");
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_series() {
        let provider = YahooFinanceProvider::new(2).unwrap();
        let bars = provider.fetch_series("AAPL").await.unwrap();
        assert!(bars.len() > 50);
        assert!(bars.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_unknown_ticker() {
        let provider = YahooFinanceProvider::new(2).unwrap();
        assert!(provider.fetch_series("INVALID_SYMBOL_12345").await.is_err());
    }
}
