//! The four analysis agents and the table they are dispatched from

pub mod fundamental;
pub mod indicators;
pub mod risk;
pub mod sentiment;
pub mod technical;

pub use fundamental::FundamentalAgent;
pub use risk::RiskAgent;
pub use sentiment::SentimentAgent;
pub use technical::TechnicalAgent;

use crate::config::OrchestratorConfig;
use crate::prompts;
use agent_core::{
    Agent, AgentContext, AgentKind, AgentResult, CompletionPrompt, Error, PortfolioPosition,
    Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Dispatch table of agents keyed by kind
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four standard agents
    pub fn standard(config: Arc<OrchestratorConfig>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TechnicalAgent::new(Arc::clone(&config))));
        registry.register(Arc::new(FundamentalAgent::new(Arc::clone(&config))));
        registry.register(Arc::new(SentimentAgent::new(Arc::clone(&config))));
        registry.register(Arc::new(RiskAgent::new(config)));
        registry
    }

    /// Register an agent, replacing any agent of the same kind
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Look up the agent for a kind
    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.agents.get(&kind).cloned()
    }

    /// Registered kinds, in agent order
    pub fn kinds(&self) -> Vec<AgentKind> {
        self.agents.keys().copied().collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.kinds())
            .finish()
    }
}

/// Inputs every user prompt shares
#[derive(Debug, Serialize)]
struct PromptFrame<'a, T: Serialize> {
    ticker: &'a str,
    depth: &'a str,
    position_note: String,
    #[serde(flatten)]
    extra: T,
}

/// Render the user template, ask the model, and parse its reply
async fn ask<T: Serialize>(
    kind: AgentKind,
    config: &OrchestratorConfig,
    ticker: &str,
    context: &AgentContext,
    template: &str,
    last_close: Option<f64>,
    extra: T,
) -> Result<AgentResult> {
    let frame = PromptFrame {
        ticker,
        depth: context.analysis_type().as_str(),
        position_note: position_note(context.position(), last_close),
        extra,
    };
    let prompt = CompletionPrompt {
        system: prompts::system_prompt(kind),
        user: prompts::render(template, &frame)?,
        max_tokens: config.max_tokens_for(context.analysis_type()),
    };

    let text = context.complete(prompt).await?;
    debug!(agent = %kind, ticker, chars = text.len(), "completion received");
    parse_reply(kind, ticker, &text)
}

fn position_note(position: Option<&PortfolioPosition>, last_close: Option<f64>) -> String {
    let Some(position) = position else {
        return String::new();
    };
    let mut note = format!(
        "\nThe caller holds {} shares with a cost basis of {:.2}.",
        position.shares, position.cost_basis
    );
    if let Some(price) = last_close {
        note.push_str(&format!(
            " Unrealized P/L at {:.2} is {:.2} ({:+.1}%).",
            price,
            position.unrealized_pnl(price),
            position.unrealized_return(price) * 100.0
        ));
    }
    note
}

#[derive(Debug, Deserialize)]
struct Reply {
    insight: String,
    confidence: f64,
    #[serde(default)]
    actionable: bool,
}

/// Parse the model's JSON reply into a result
///
/// The object may be wrapped in prose or a code fence; everything between
/// the first `{` and the last `}` is parsed.
pub(crate) fn parse_reply(kind: AgentKind, ticker: &str, text: &str) -> Result<AgentResult> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(Error::MalformedResponse(format!(
            "{kind} reply contains no JSON object"
        )));
    };
    if end < start {
        return Err(Error::MalformedResponse(format!(
            "{kind} reply contains no JSON object"
        )));
    }

    let reply: Reply = serde_json::from_str(&text[start..=end])
        .map_err(|e| Error::MalformedResponse(format!("{kind} reply: {e}")))?;

    let insight = reply.insight.trim();
    if insight.is_empty() {
        return Err(Error::MalformedResponse(format!("{kind} reply has no insight")));
    }
    if !reply.confidence.is_finite() || !(0.0..=1.0).contains(&reply.confidence) {
        return Err(Error::MalformedResponse(format!(
            "{kind} confidence {} is outside [0, 1]",
            reply.confidence
        )));
    }

    Ok(AgentResult::new(
        kind,
        ticker,
        insight,
        reply.confidence,
        reply.actionable,
    ))
}
