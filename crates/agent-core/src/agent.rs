//! Core Agent trait definition

use crate::{AgentContext, AgentKind, AgentResult, Bar, CompletionPrompt, Result};
use async_trait::async_trait;
use tokio::time::Instant;

/// One analysis capability
///
/// Implementations are stateless: everything a run needs arrives through the
/// [`AgentContext`], including the gateway to external services. Variants
/// differ only in prompt and local computation, never in protocol.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identity used for dispatch, caching and synthesis
    fn kind(&self) -> AgentKind;

    /// Analyse `ticker` and produce one result
    async fn run(&self, ticker: &str, context: &AgentContext) -> Result<AgentResult>;

    /// Get the agent's name
    fn name(&self) -> &str {
        self.kind().as_str()
    }
}

/// Gateway to the external collaborators an agent may call
///
/// The engine supplies an implementation that applies circuit breaking,
/// retries and deadline propagation. `deadline` is the caller's absolute
/// deadline; implementations must use the remaining time as the sub-call's
/// own timeout budget.
#[async_trait]
pub trait AgentServices: Send + Sync {
    /// Complete a natural-language analysis prompt
    async fn complete(&self, prompt: CompletionPrompt, deadline: Instant) -> Result<String>;

    /// Fetch the raw price series for `ticker`
    async fn fetch_series(&self, ticker: &str, deadline: Instant) -> Result<Vec<Bar>>;
}
