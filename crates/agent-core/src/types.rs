//! Data model shared by agents and the orchestration engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

use crate::{Error, Result};

/// Identity of one analysis capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Price/indicator driven analysis
    Technical,
    /// Valuation and business quality
    Fundamental,
    /// News and market mood
    Sentiment,
    /// Downside, volatility and position exposure
    Risk,
}

impl AgentKind {
    /// Every agent, in dispatch-table order
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Technical,
        AgentKind::Fundamental,
        AgentKind::Sentiment,
        AgentKind::Risk,
    ];

    /// Stable identifier used in cache keys, logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Fundamental => "fundamental",
            Self::Sentiment => "sentiment",
            Self::Risk => "risk",
        }
    }

    /// Agents whose results this agent reads as context
    pub fn dependencies(&self) -> &'static [AgentKind] {
        match self {
            Self::Risk => &[AgentKind::Technical, AgentKind::Fundamental],
            _ => &[],
        }
    }

    /// Whether this agent's text feeds the overall sentiment score
    pub fn is_sentiment_bearing(&self) -> bool {
        !matches!(self, Self::Risk)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technical" => Ok(Self::Technical),
            "fundamental" => Ok(Self::Fundamental),
            "sentiment" => Ok(Self::Sentiment),
            "risk" => Ok(Self::Risk),
            other => Err(Error::InvalidInput(format!("unknown agent: {other}"))),
        }
    }
}

/// Depth of an analysis; selects the agent set and the time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Fast pass: technical and sentiment only
    Quick,
    /// All four agents
    Comprehensive,
    /// All four agents with longer prompts and budget
    Deep,
}

impl AnalysisType {
    /// Agents dispatched when the request does not name its own set
    pub fn default_agents(&self) -> Vec<AgentKind> {
        match self {
            Self::Quick => vec![AgentKind::Technical, AgentKind::Sentiment],
            Self::Comprehensive | Self::Deep => AgentKind::ALL.to_vec(),
        }
    }

    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Comprehensive => "comprehensive",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "comprehensive" => Ok(Self::Comprehensive),
            "deep" => Ok(Self::Deep),
            other => Err(Error::InvalidInput(format!("unknown analysis_type: {other}"))),
        }
    }
}

/// An existing holding the analysis should take into account
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    /// Number of shares held
    pub shares: f64,
    /// Average cost per share
    pub cost_basis: f64,
}

impl PortfolioPosition {
    /// Create a new position
    pub fn new(shares: f64, cost_basis: f64) -> Self {
        Self { shares, cost_basis }
    }

    /// Unrealised profit or loss at `price`
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.cost_basis) * self.shares
    }

    /// Unrealised return at `price` as a fraction of cost
    pub fn unrealized_return(&self, price: f64) -> f64 {
        if self.cost_basis <= 0.0 {
            return 0.0;
        }
        (price - self.cost_basis) / self.cost_basis
    }
}

/// One analysis request for a single ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Caller-visible identifier, unique per request
    pub request_id: String,
    /// Upper-cased ticker symbol
    pub ticker: String,
    /// Depth of analysis
    pub analysis_type: AnalysisType,
    /// Agents to run
    pub agents: Vec<AgentKind>,
    /// Optional holding to analyse against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_position: Option<PortfolioPosition>,
    /// Absolute deadline; when unset the engine derives it from `analysis_type`
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl AnalysisRequest {
    /// Create a request with the default agent set for `analysis_type`
    pub fn new(ticker: impl Into<String>, analysis_type: AnalysisType) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            ticker: ticker.into().trim().to_uppercase(),
            analysis_type,
            agents: analysis_type.default_agents(),
            portfolio_position: None,
            deadline: None,
        }
    }

    /// Override the agent set
    pub fn with_agents(mut self, agents: impl IntoIterator<Item = AgentKind>) -> Self {
        let mut agents: Vec<AgentKind> = agents.into_iter().collect();
        agents.sort();
        agents.dedup();
        self.agents = agents;
        self
    }

    /// Attach a portfolio position
    pub fn with_position(mut self, position: PortfolioPosition) -> Self {
        self.portfolio_position = Some(position);
        self
    }

    /// Use a caller-supplied request id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Pin the deadline instead of deriving it from `analysis_type`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Reject malformed requests before any agent is dispatched
    pub fn validate(&self) -> Result<()> {
        if self.ticker.is_empty() {
            return Err(Error::InvalidInput("ticker must not be empty".to_string()));
        }
        if self.ticker.len() > 10 {
            return Err(Error::InvalidInput(format!(
                "ticker '{}' is longer than 10 characters",
                self.ticker
            )));
        }
        if !self
            .ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(Error::InvalidInput(format!(
                "ticker '{}' contains invalid characters",
                self.ticker
            )));
        }
        if self.agents.is_empty() {
            return Err(Error::InvalidInput(
                "at least one agent must be requested".to_string(),
            ));
        }
        if let Some(position) = &self.portfolio_position {
            let shares_ok = position.shares.is_finite() && position.shares > 0.0;
            let cost_ok = position.cost_basis.is_finite() && position.cost_basis >= 0.0;
            if !(shares_ok && cost_ok) {
                return Err(Error::InvalidInput(
                    "portfolio position needs positive shares and a non-negative cost basis"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Lifecycle of one agent task within a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Waiting on dependencies or dispatch
    Pending,
    /// Dispatched and in flight
    Running,
    /// Produced a result
    Done,
    /// Failed (service error, open circuit, malformed response)
    Failed,
    /// Not done by the request deadline
    TimedOut,
}

impl AgentStatus {
    /// Whether the task has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }
}

/// Output of one agent for one ticker
///
/// Immutable once produced; the synthesizer attaches a quality score by
/// building a new value with [`AgentResult::with_quality_score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentKind,
    pub ticker: String,
    pub insight: String,
    pub confidence: f64,
    #[serde(default)]
    pub quality_score: f64,
    pub actionable: bool,
    pub produced_at: DateTime<Utc>,
}

impl AgentResult {
    pub fn new(
        agent: AgentKind,
        ticker: impl Into<String>,
        insight: impl Into<String>,
        confidence: f64,
        actionable: bool,
    ) -> Self {
        Self {
            agent,
            ticker: ticker.into(),
            insight: insight.into(),
            confidence: clamp_unit(confidence),
            quality_score: 0.0,
            actionable,
            produced_at: Utc::now(),
        }
    }

    /// Copy of this result carrying a synthesizer-assigned quality score
    pub fn with_quality_score(&self, quality_score: f64) -> Self {
        Self {
            quality_score: clamp_unit(quality_score),
            ..self.clone()
        }
    }

    /// Copy of this result with a fixed production time
    pub fn with_produced_at(mut self, produced_at: DateTime<Utc>) -> Self {
        self.produced_at = produced_at;
        self
    }
}

/// One OHLCV bar from the market-data provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Prompt handed to the completion service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPrompt {
    /// System instructions
    pub system: String,
    /// User message
    pub user: String,
    /// Generation budget
    pub max_tokens: usize,
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
