//! Technical analysis agent

use super::ask;
use super::indicators::TechnicalSnapshot;
use crate::api::MARKET_DATA_SERVICE;
use crate::config::OrchestratorConfig;
use crate::prompts::TECHNICAL_USER;
use agent_core::{Agent, AgentContext, AgentKind, AgentResult, Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Agent reading price action through RSI, moving averages and momentum
pub struct TechnicalAgent {
    config: Arc<OrchestratorConfig>,
}

impl TechnicalAgent {
    /// Create a new technical agent
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config }
    }
}

#[derive(Serialize)]
struct Inputs {
    snapshot: TechnicalSnapshot,
    rsi_band: &'static str,
    trend: &'static str,
}

#[async_trait]
impl Agent for TechnicalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Technical
    }

    async fn run(&self, ticker: &str, context: &AgentContext) -> Result<AgentResult> {
        let bars = context.fetch_series(ticker).await?;
        let snapshot = TechnicalSnapshot::from_bars(&bars).ok_or_else(|| Error::Unavailable {
            service: MARKET_DATA_SERVICE.to_string(),
            message: format!("no usable price history for {ticker}"),
        })?;

        let inputs = Inputs {
            snapshot,
            rsi_band: snapshot.rsi_band(),
            trend: snapshot.trend(),
        };
        ask(
            self.kind(),
            &self.config,
            ticker,
            context,
            TECHNICAL_USER,
            Some(snapshot.last_close),
            inputs,
        )
        .await
    }
}
