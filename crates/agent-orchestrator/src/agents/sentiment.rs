//! Market sentiment agent

use super::ask;
use crate::config::OrchestratorConfig;
use crate::prompts::SENTIMENT_USER;
use agent_core::{Agent, AgentContext, AgentKind, AgentResult, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Agent gauging news flow and investor mood
pub struct SentimentAgent {
    config: Arc<OrchestratorConfig>,
}

impl SentimentAgent {
    /// Create a new sentiment agent
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Agent for SentimentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Sentiment
    }

    async fn run(&self, ticker: &str, context: &AgentContext) -> Result<AgentResult> {
        ask(
            self.kind(),
            &self.config,
            ticker,
            context,
            SENTIMENT_USER,
            None,
            (),
        )
        .await
    }
}
