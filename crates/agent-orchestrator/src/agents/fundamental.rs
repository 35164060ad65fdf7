//! Fundamental analysis agent

use super::ask;
use crate::config::OrchestratorConfig;
use crate::prompts::FUNDAMENTAL_USER;
use agent_core::{Agent, AgentContext, AgentKind, AgentResult, Bar, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Agent assessing valuation and business quality
pub struct FundamentalAgent {
    config: Arc<OrchestratorConfig>,
}

impl FundamentalAgent {
    /// Create a new fundamental agent
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct MarketStats {
    last_close: f64,
    high: f64,
    low: f64,
    average_volume: u64,
    sessions: usize,
}

impl MarketStats {
    fn from_bars(bars: &[Bar]) -> Option<Self> {
        let last = bars.last()?;
        let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let total_volume: u64 = bars.iter().map(|b| b.volume).sum();
        Some(Self {
            last_close: last.close,
            high,
            low,
            average_volume: total_volume / bars.len() as u64,
            sessions: bars.len(),
        })
    }
}

#[derive(Serialize)]
struct Inputs {
    stats: Option<MarketStats>,
}

#[async_trait]
impl Agent for FundamentalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Fundamental
    }

    async fn run(&self, ticker: &str, context: &AgentContext) -> Result<AgentResult> {
        let bars = context.fetch_series(ticker).await?;
        let stats = MarketStats::from_bars(&bars);

        ask(
            self.kind(),
            &self.config,
            ticker,
            context,
            FUNDAMENTAL_USER,
            stats.map(|s| s.last_close),
            Inputs { stats },
        )
        .await
    }
}
