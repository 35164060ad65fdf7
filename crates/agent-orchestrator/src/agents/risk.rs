//! Risk assessment agent
//!
//! Reads the technical and fundamental results as context when they are
//! available; runs with whatever subset completed otherwise.

use super::ask;
use super::indicators::RiskSnapshot;
use crate::config::OrchestratorConfig;
use crate::prompts::RISK_USER;
use agent_core::{Agent, AgentContext, AgentKind, AgentResult, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Agent weighing volatility, drawdown and the other agents' findings
pub struct RiskAgent {
    config: Arc<OrchestratorConfig>,
}

impl RiskAgent {
    /// Create a new risk agent
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config }
    }
}

#[derive(Serialize)]
struct Finding<'a> {
    agent: AgentKind,
    confidence: f64,
    insight: &'a str,
}

#[derive(Serialize)]
struct Inputs<'a> {
    snapshot: Option<RiskSnapshot>,
    findings: Vec<Finding<'a>>,
}

#[async_trait]
impl Agent for RiskAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Risk
    }

    async fn run(&self, ticker: &str, context: &AgentContext) -> Result<AgentResult> {
        let bars = context.fetch_series(ticker).await?;
        let snapshot = RiskSnapshot::from_bars(&bars);
        let findings = context
            .dependencies()
            .map(|r| Finding {
                agent: r.agent,
                confidence: r.confidence,
                insight: &r.insight,
            })
            .collect();

        ask(
            self.kind(),
            &self.config,
            ticker,
            context,
            RISK_USER,
            snapshot.map(|s| s.last_close),
            Inputs { snapshot, findings },
        )
        .await
    }
}
