//! Gateway from agents to external services
//!
//! Every call an agent makes goes through [`ServiceGateway`], which applies
//! the shared circuit breaker, retries transient failures with backoff, and
//! bounds each attempt by the request deadline. The remaining time is also
//! handed to the completion provider as its own timeout.

use crate::api::{MARKET_DATA_SERVICE, MarketDataProvider};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::OrchestratorConfig;
use agent_core::{AgentServices, Bar, CompletionPrompt, Error, Result};
use agent_llm::error::COMPLETION_SERVICE;
use agent_llm::{CompletionRequest, LLMProvider, Message};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Breaker-, retry- and deadline-aware access to the completion and market
/// data services
pub struct ServiceGateway {
    llm: Arc<dyn LLMProvider>,
    market_data: Arc<dyn MarketDataProvider>,
    breaker: Arc<CircuitBreaker>,
    config: Arc<OrchestratorConfig>,
}

impl ServiceGateway {
    /// Create a gateway over the given providers
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        market_data: Arc<dyn MarketDataProvider>,
        breaker: Arc<CircuitBreaker>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            llm,
            market_data,
            breaker,
            config,
        }
    }

    /// The breaker shared with other gateways
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        service: &str,
        deadline: Instant,
        mut attempt_fn: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = self
                .breaker
                .call(service, || bounded(service, deadline, attempt_fn()))
                .await;

            match result {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let backoff = self.config.retry_backoff(attempt);
                    if Instant::now() + backoff >= deadline {
                        return Err(e);
                    }
                    warn!(service, attempt, ?backoff, error = %e, "transient failure, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                other => return other,
            }
        }
    }
}

/// Run `fut` until `deadline`, reporting a timeout against `service`
async fn bounded<T>(
    service: &str,
    deadline: Instant,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            service: service.to_string(),
        }),
    }
}

#[async_trait]
impl AgentServices for ServiceGateway {
    async fn complete(&self, prompt: CompletionPrompt, deadline: Instant) -> Result<String> {
        self.call_with_retry(COMPLETION_SERVICE, deadline, || {
            let request = CompletionRequest::builder(self.config.model.clone())
                .system(prompt.system.clone())
                .add_message(Message::user(prompt.user.clone()))
                .max_tokens(prompt.max_tokens)
                .temperature(self.config.temperature)
                .timeout(deadline.saturating_duration_since(Instant::now()))
                .build();
            let llm = Arc::clone(&self.llm);

            async move {
                let response = llm.complete(request).await?;
                debug!(
                    tokens = response.usage.total(),
                    stop_reason = ?response.stop_reason,
                    "completion received"
                );
                response.text().map(str::to_string).ok_or_else(|| {
                    Error::MalformedResponse("completion contained no text".to_string())
                })
            }
        })
        .await
    }

    async fn fetch_series(&self, ticker: &str, deadline: Instant) -> Result<Vec<Bar>> {
        self.call_with_retry(MARKET_DATA_SERVICE, deadline, || {
            let provider = Arc::clone(&self.market_data);
            async move { provider.fetch_series(ticker).await.map_err(Error::from) }
        })
        .await
    }
}

impl std::fmt::Debug for ServiceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceGateway")
            .field("llm", &self.llm.name())
            .field("market_data", &self.market_data.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{BreakerConfig, CircuitState};
    use crate::error::OrchestratorError;
    use agent_llm::{CompletionResponse, LLMError, StopReason, TokenUsage};
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
            async fn fetch_series(&self, ticker: &str) -> crate::error::Result<Vec<Bar>>;
            fn name(&self) -> &str;
        }
    }

    fn reply(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    fn prompt() -> CompletionPrompt {
        CompletionPrompt {
            system: "system".to_string(),
            user: "user".to_string(),
            max_tokens: 64,
        }
    }

    fn gateway(llm: MockLlm, market: MockMarket, config: OrchestratorConfig) -> ServiceGateway {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            cooldown: config.breaker_cooldown,
        });
        ServiceGateway::new(
            Arc::new(llm),
            Arc::new(market),
            Arc::new(breaker),
            Arc::new(config),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut llm = MockLlm::new();
        llm.expect_complete().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LLMError::RateLimitExceeded("slow down".to_string()))
            } else {
                Ok(reply("{\"insight\":\"ok\"}"))
            }
        });

        let gateway = gateway(llm, MockMarket::new(), OrchestratorConfig::default());
        let deadline = Instant::now() + Duration::from_secs(30);
        let text = gateway.complete(prompt(), deadline).await.unwrap();

        assert_eq!(text, "{\"insight\":\"ok\"}");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_one_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut llm = MockLlm::new();
        llm.expect_complete().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LLMError::RequestFailed("HTTP 503".to_string()))
        });

        let gateway = gateway(llm, MockMarket::new(), OrchestratorConfig::default());
        let result = gateway
            .complete(prompt(), Instant::now() + Duration::from_secs(30))
            .await;

        assert!(matches!(result, Err(Error::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let mut llm = MockLlm::new();
        llm.expect_complete()
            .times(1)
            .returning(|_| Err(LLMError::AuthenticationFailed));

        let gateway = gateway(llm, MockMarket::new(), OrchestratorConfig::default());
        let result = gateway
            .complete(prompt(), Instant::now() + Duration::from_secs(30))
            .await;
        assert!(matches!(result, Err(Error::Unavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_becomes_request_timeout() {
        let mut llm = MockLlm::new();
        llm.expect_complete()
            .withf(|request| {
                request
                    .timeout
                    .is_some_and(|t| t > Duration::ZERO && t <= Duration::from_secs(12))
            })
            .times(1)
            .returning(|_| Ok(reply("done")));

        let gateway = gateway(llm, MockMarket::new(), OrchestratorConfig::default());
        let deadline = Instant::now() + Duration::from_secs(12);
        assert_eq!(gateway.complete(prompt(), deadline).await.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_data_goes_through_breaker() {
        let mut market = MockMarket::new();
        market.expect_fetch_series().times(2).returning(|_| {
            Err(OrchestratorError::TransientService {
                service: MARKET_DATA_SERVICE.to_string(),
                message: "429".to_string(),
            })
        });

        let config = OrchestratorConfig::builder()
            .breaker_failure_threshold(2)
            .build()
            .unwrap();
        let gateway = gateway(MockLlm::new(), market, config);
        let deadline = Instant::now() + Duration::from_secs(30);

        assert!(gateway.fetch_series("AAPL", deadline).await.is_err());
        assert_eq!(
            gateway.breaker().state(MARKET_DATA_SERVICE),
            CircuitState::Open
        );
        assert!(matches!(
            gateway.fetch_series("MSFT", deadline).await,
            Err(Error::CircuitOpen { .. })
        ));
    }

    struct HungMarket;

    #[async_trait]
    impl MarketDataProvider for HungMarket {
        async fn fetch_series(&self, _ticker: &str) -> crate::error::Result<Vec<Bar>> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "hung"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_at_deadline() {
        let breaker = Arc::new(CircuitBreaker::default());
        let gateway = ServiceGateway::new(
            Arc::new(MockLlm::new()),
            Arc::new(HungMarket),
            Arc::clone(&breaker),
            Arc::new(OrchestratorConfig::default()),
        );

        let started = Instant::now();
        let result = gateway
            .fetch_series("AAPL", started + Duration::from_secs(5))
            .await;

        assert_eq!(
            result.unwrap_err(),
            Error::Timeout {
                service: MARKET_DATA_SERVICE.to_string()
            }
        );
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(
            breaker.circuit(MARKET_DATA_SERVICE).unwrap().consecutive_failures,
            1
        );
    }
}
