//! Execution context for agents
//!
//! The `AgentContext` carries everything one agent run may read: the request
//! it serves, the results of the agents it depends on, the request deadline,
//! and the service gateway.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    AgentKind, AgentResult, AgentServices, AnalysisRequest, AnalysisType, Bar, CompletionPrompt,
    PortfolioPosition, Result,
};

/// Context passed to agents during execution
#[derive(Clone)]
pub struct AgentContext {
    request: Arc<AnalysisRequest>,
    dependencies: BTreeMap<AgentKind, AgentResult>,
    deadline: Instant,
    services: Arc<dyn AgentServices>,
}

impl AgentContext {
    /// Create a context without dependency results
    pub fn new(
        request: Arc<AnalysisRequest>,
        deadline: Instant,
        services: Arc<dyn AgentServices>,
    ) -> Self {
        Self {
            request,
            dependencies: BTreeMap::new(),
            deadline,
            services,
        }
    }

    /// Attach the results of completed dependencies
    pub fn with_dependencies(
        mut self,
        dependencies: impl IntoIterator<Item = AgentResult>,
    ) -> Self {
        self.dependencies = dependencies
            .into_iter()
            .map(|result| (result.agent, result))
            .collect();
        self
    }

    // =========== Request Accessors ===========

    /// The request this run serves
    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    /// Ticker under analysis
    pub fn ticker(&self) -> &str {
        &self.request.ticker
    }

    /// Depth of analysis
    pub fn analysis_type(&self) -> AnalysisType {
        self.request.analysis_type
    }

    /// Portfolio position, if the caller supplied one
    pub fn position(&self) -> Option<&PortfolioPosition> {
        self.request.portfolio_position.as_ref()
    }

    // =========== Dependencies ===========

    /// Result of a completed dependency
    pub fn dependency(&self, kind: AgentKind) -> Option<&AgentResult> {
        self.dependencies.get(&kind)
    }

    /// All completed dependency results, in agent order
    pub fn dependencies(&self) -> impl Iterator<Item = &AgentResult> {
        self.dependencies.values()
    }

    // =========== Deadline ===========

    /// Absolute deadline of the request
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline (zero once it has passed)
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    // =========== Services ===========

    /// Complete a prompt within the request deadline
    pub async fn complete(&self, prompt: CompletionPrompt) -> Result<String> {
        self.services.complete(prompt, self.deadline).await
    }

    /// Fetch the price series within the request deadline
    pub async fn fetch_series(&self, ticker: &str) -> Result<Vec<Bar>> {
        self.services.fetch_series(ticker, self.deadline).await
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("request_id", &self.request.request_id)
            .field("ticker", &self.request.ticker)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullServices;

    #[async_trait]
    impl AgentServices for NullServices {
        async fn complete(&self, prompt: CompletionPrompt, _deadline: Instant) -> Result<String> {
            Ok(prompt.user)
        }

        async fn fetch_series(&self, _ticker: &str, _deadline: Instant) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }
    }

    fn context(deadline: Instant) -> AgentContext {
        let request = Arc::new(AnalysisRequest::new("AAPL", AnalysisType::Comprehensive));
        AgentContext::new(request, deadline, Arc::new(NullServices))
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_saturates() {
        let ctx = context(Instant::now() + Duration::from_secs(5));
        assert_eq!(ctx.remaining(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_dependencies_by_kind() {
        let ctx = context(Instant::now()).with_dependencies([
            AgentResult::new(AgentKind::Fundamental, "AAPL", "cheap", 0.6, true),
            AgentResult::new(AgentKind::Technical, "AAPL", "uptrend", 0.8, true),
        ]);

        assert_eq!(
            ctx.dependency(AgentKind::Technical).map(|r| r.insight.as_str()),
            Some("uptrend")
        );
        assert!(ctx.dependency(AgentKind::Sentiment).is_none());
        let order: Vec<AgentKind> = ctx.dependencies().map(|r| r.agent).collect();
        assert_eq!(order, vec![AgentKind::Technical, AgentKind::Fundamental]);
    }

    #[tokio::test]
    async fn test_complete_goes_through_services() {
        let ctx = context(Instant::now());
        let text = ctx
            .complete(CompletionPrompt {
                system: String::new(),
                user: "hello".to_string(),
                max_tokens: 16,
            })
            .await
            .unwrap();
        assert_eq!(text, "hello");
        assert_eq!(ctx.ticker(), "AAPL");
    }
}
