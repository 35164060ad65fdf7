//! Shared doubles for the engine integration tests
#![allow(dead_code)]

use agent_core::{AgentKind, Bar};
use agent_llm::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider, Message, StopReason, TokenUsage,
};
use agent_orchestrator::MarketDataProvider;
use async_trait::async_trait;
use chrono::{Duration as Days, TimeZone, Utc};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

mock! {
    pub Llm {}

    #[async_trait]
    impl LLMProvider for Llm {
        async fn complete(&self, request: CompletionRequest) -> agent_llm::Result<CompletionResponse>;
        fn name(&self) -> &str;
    }
}

mock! {
    pub Market {}

    #[async_trait]
    impl MarketDataProvider for Market {
        async fn fetch_series(&self, ticker: &str) -> agent_orchestrator::Result<Vec<Bar>>;
        fn name(&self) -> &str;
    }
}

/// Market data double serving a steady uptrend for every ticker
pub fn market() -> MockMarket {
    let mut market = MockMarket::new();
    market.expect_fetch_series().returning(|_| Ok(rising_bars(60)));
    market.expect_name().return_const("mock-market".to_string());
    market
}

pub fn rising_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 150.0 + i as f64 * 0.5;
            Bar {
                timestamp: start + Days::days(i as i64),
                open: close - 0.2,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 50_000_000,
            }
        })
        .collect()
}

/// Which agent a completion request came from, read off its system prompt
pub fn agent_of(request: &CompletionRequest) -> AgentKind {
    let system = request.system.as_deref().unwrap_or_default();
    if system.contains("technical analysis") {
        AgentKind::Technical
    } else if system.contains("fundamental") {
        AgentKind::Fundamental
    } else if system.contains("sentiment analyst") {
        AgentKind::Sentiment
    } else {
        AgentKind::Risk
    }
}

/// A well-formed reply for each agent, agreeing on a bullish view
pub fn answer(agent: AgentKind) -> String {
    let (insight, confidence) = match agent {
        AgentKind::Technical => ("The stock is in a strong uptrend with bullish momentum; buy on dips", 0.8),
        AgentKind::Fundamental => ("The company shows robust growth and strong margins; accumulate", 0.75),
        AgentKind::Sentiment => ("Investor sentiment toward the stock is positive and optimistic", 0.7),
        AgentKind::Risk => ("Risk appears moderate; hold the current position size", 0.6),
    };
    serde_json::json!({
        "insight": insight,
        "confidence": confidence,
        "actionable": true,
    })
    .to_string()
}

pub fn reply(text: impl Into<String>) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(text.into()),
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
    }
}

/// How the scripted provider treats one agent's prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Answer,
    Malformed,
    Hang,
    Unauthorized,
}

/// Completion provider that behaves per agent and counts calls
pub struct ScriptedLlm {
    script: Box<dyn Fn(AgentKind) -> Script + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(script: impl Fn(AgentKind) -> Script + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let agent = agent_of(&request);
        match (self.script)(agent) {
            Script::Answer => Ok(reply(answer(agent))),
            Script::Malformed => Ok(reply("I would rather not say.")),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(reply(answer(agent)))
            },
            Script::Unauthorized => Err(LLMError::AuthenticationFailed),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
