//! Request coordination: dependency-ordered concurrent dispatch under one
//! deadline, followed by synthesis
//!
//! Each request owns its task table. Agents without pending dependencies
//! start immediately; dependents start once every dependency is terminal,
//! or at the dependency cutoff (a configured share of the budget) with
//! whatever dependencies completed by then. Tasks still running at the
//! deadline are aborted and reported as timed out; an aborted task never
//! writes to the cache.

use crate::agents::AgentRegistry;
use crate::api::MarketDataProvider;
use crate::cache::{CacheKey, CacheManager};
use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::monitor::{MonitorEvent, PerformanceMonitor};
use crate::services::ServiceGateway;
use crate::store::{InsightStore, NoopInsightStore};
use crate::synthesis::{QualitySynthesizer, SynthesizedInsight};
use agent_core::{
    Agent, AgentContext, AgentKind, AgentResult, AgentServices, AgentStatus, AnalysisRequest,
    Error,
};
use agent_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{Id as TaskId, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One agent's unit of work within a request
#[derive(Debug, Clone)]
pub struct AgentTask {
    /// Agent to run
    pub agent: AgentKind,
    /// Request the task serves
    pub request: Arc<AnalysisRequest>,
    /// Requested agents whose results this task reads
    pub dependencies: Vec<AgentKind>,
    /// Lifecycle state
    pub status: AgentStatus,
}

impl AgentTask {
    fn new(agent: AgentKind, request: &Arc<AnalysisRequest>) -> Self {
        let dependencies = agent
            .dependencies()
            .iter()
            .copied()
            .filter(|dep| request.agents.contains(dep))
            .collect();
        Self {
            agent,
            request: Arc::clone(request),
            dependencies,
            status: AgentStatus::Pending,
        }
    }
}

/// Final state of one agent task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTaskReport {
    pub agent: AgentKind,
    pub status: AgentStatus,
    /// Time from dispatch to the terminal state (zero if never dispatched)
    pub latency: Duration,
    pub cache_hit: bool,
    pub error: Option<String>,
}

/// Category of a per-agent warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The agent did not finish before the deadline
    AgentTimeout,
    /// A service breaker was open
    CircuitOpen,
    /// A service failed after the retry
    TransientService,
    /// The completion could not be parsed
    MalformedResponse,
    /// A service failed permanently
    ServiceUnavailable,
    /// Any other agent failure
    AgentFailed,
}

/// A degraded agent, reported alongside a successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub agent: AgentKind,
    pub kind: WarningKind,
    pub message: String,
}

/// Request-level execution figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Dispatched agents answered from the cache
    pub cache_hit_rate: f64,
    /// Sum of agent latencies over wall-clock time
    pub parallel_efficiency: f64,
    /// Requested agents that completed
    pub success_rate: f64,
}

/// Result of [`AgentCoordinator::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub request_id: String,
    pub insight: SynthesizedInsight,
    /// One entry per agent that did not contribute
    pub warnings: Vec<Warning>,
    /// Final state of every requested agent, in agent order
    pub agent_statuses: Vec<AgentTaskReport>,
    pub execution_time: Duration,
    pub performance_metrics: PerformanceMetrics,
    pub degraded_quality: bool,
}

enum Outcome {
    Done { result: AgentResult, cache_hit: bool },
    Failed(Error),
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Entry point of the engine
///
/// Construct once at process start; the cache, breaker and monitor it holds
/// are shared by every request it serves.
pub struct AgentCoordinator {
    registry: AgentRegistry,
    cache: Arc<CacheManager>,
    services: Arc<dyn AgentServices>,
    synthesizer: QualitySynthesizer,
    monitor: PerformanceMonitor,
    store: Arc<dyn InsightStore>,
    writes: Mutex<JoinSet<()>>,
    config: Arc<OrchestratorConfig>,
}

impl AgentCoordinator {
    /// Create a coordinator from its parts
    pub fn new(
        config: Arc<OrchestratorConfig>,
        registry: AgentRegistry,
        cache: Arc<CacheManager>,
        services: Arc<dyn AgentServices>,
        monitor: PerformanceMonitor,
    ) -> Self {
        let synthesizer = QualitySynthesizer::new(Arc::clone(&cache), &config);
        Self {
            registry,
            cache,
            services,
            synthesizer,
            monitor,
            store: Arc::new(NoopInsightStore),
            writes: Mutex::new(JoinSet::new()),
            config,
        }
    }

    /// Wire the standard agents to the given providers
    ///
    /// Builds the shared monitor, circuit breaker, cache and service gateway.
    /// Must be called from within a tokio runtime.
    pub fn assemble(
        config: OrchestratorConfig,
        llm: Arc<dyn LLMProvider>,
        market_data: Arc<dyn MarketDataProvider>,
    ) -> Self {
        let config = Arc::new(config);
        let monitor = PerformanceMonitor::spawn(config.monitor_window, config.health);
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            cooldown: config.breaker_cooldown,
        })
        .with_monitor(monitor.clone());
        let cache = Arc::new(CacheManager::new(config.cache_capacity));
        let services = Arc::new(ServiceGateway::new(
            llm,
            market_data,
            Arc::new(breaker),
            Arc::clone(&config),
        ));

        Self::new(
            Arc::clone(&config),
            AgentRegistry::standard(config),
            cache,
            services,
            monitor,
        )
    }

    /// Persist insights to `store`
    pub fn with_store(mut self, store: Arc<dyn InsightStore>) -> Self {
        self.store = store;
        self
    }

    /// Use a custom synthesizer
    pub fn with_synthesizer(mut self, synthesizer: QualitySynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Wait for every pending insight write to finish
    ///
    /// Call before shutting down; writes run in the background otherwise.
    pub async fn flush(&self) {
        let mut writes = self.writes.lock().await;
        while let Some(joined) = writes.join_next().await {
            if let Err(e) = joined {
                warn!(store = self.store.name(), error = %e, "insight write task failed");
            }
        }
    }

    /// Health monitor shared with the breaker
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Result cache shared across requests
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Engine configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every requested agent and synthesize their results
    ///
    /// Per-agent failures become warnings. Only an invalid request
    /// ([`OrchestratorError::Validation`]) or a request in which no agent
    /// completed ([`OrchestratorError::InsufficientResults`]) is an error.
    #[instrument(
        skip_all,
        fields(
            ticker = %request.ticker,
            analysis_type = %request.analysis_type,
            request_id = %request.request_id
        )
    )]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse> {
        let started = Instant::now();
        request.validate()?;
        if let Some(kind) = request
            .agents
            .iter()
            .find(|kind| self.registry.get(**kind).is_none())
        {
            return Err(OrchestratorError::Validation(format!(
                "no agent registered for '{kind}'"
            )));
        }

        let deadline = request
            .deadline
            .unwrap_or_else(|| started + self.config.timeout_for(request.analysis_type));
        let cutoff = started
            + self
                .config
                .dependency_wait(deadline.saturating_duration_since(started));
        let request = Arc::new(request);
        info!(agents = request.agents.len(), budget = ?deadline.saturating_duration_since(started), "analysis started");

        let mut run = RequestRun::new(&request);
        self.execute(&mut run, cutoff, deadline).await;

        let execution_time = started.elapsed();
        let performance_metrics = run.metrics(execution_time);
        let (results, warnings, agent_statuses) = run.finish();
        for warning in &warnings {
            warn!(agent = %warning.agent, kind = ?warning.kind, "{}", warning.message);
        }

        let synthesized = self
            .synthesizer
            .synthesize(&request.ticker, &request.agents, results)
            .await;
        self.monitor.record(MonitorEvent::RequestCompleted {
            request_id: request.request_id.clone(),
            elapsed: execution_time,
            succeeded: synthesized.is_ok(),
        });
        let insight = synthesized?;

        let store = Arc::clone(&self.store);
        let stored = insight.clone();
        {
            let mut writes = self.writes.lock().await;
            while writes.try_join_next().is_some() {}
            writes.spawn(async move {
                if let Err(e) = store.store_insight(&stored).await {
                    warn!(store = store.name(), ticker = %stored.ticker, error = %e, "failed to persist insight");
                }
            });
        }

        info!(
            sentiment = %insight.overall_sentiment,
            risk = %insight.risk_level,
            action = %insight.action_recommendation,
            consensus = insight.agent_consensus,
            degraded = insight.degraded_quality,
            elapsed = ?execution_time,
            "analysis completed"
        );

        Ok(AnalysisResponse {
            request_id: request.request_id.clone(),
            degraded_quality: insight.degraded_quality,
            insight,
            warnings,
            agent_statuses,
            execution_time,
            performance_metrics,
        })
    }

    /// Drive the task table until every task is terminal or the deadline
    async fn execute(&self, run: &mut RequestRun, cutoff: Instant, deadline: Instant) {
        let mut join: JoinSet<(AgentKind, Outcome)> = JoinSet::new();
        let mut spawned: HashMap<TaskId, AgentKind> = HashMap::new();

        loop {
            let now = Instant::now();
            let mut ready = run.ready(now >= cutoff);
            if ready.is_empty() && join.is_empty() {
                ready = run.ready(true);
            }
            for kind in ready {
                if let Some(id) = self.dispatch(run, kind, deadline, &mut join) {
                    spawned.insert(id, kind);
                }
            }
            if !run.has_pending() && join.is_empty() {
                break;
            }

            let wake = if run.has_pending() && cutoff < deadline && now < cutoff {
                cutoff
            } else {
                deadline
            };
            match tokio::time::timeout_at(wake, join.join_next_with_id()).await {
                Ok(Some(Ok((id, (kind, outcome))))) => {
                    spawned.remove(&id);
                    self.complete(run, kind, outcome);
                },
                Ok(Some(Err(e))) => match spawned.remove(&e.id()) {
                    Some(kind) => {
                        let error = Error::ProcessingFailed(format!("agent task failed: {e}"));
                        self.complete(run, kind, Outcome::Failed(error));
                    },
                    None => warn!(error = %e, "untracked agent task ended abnormally"),
                },
                Ok(None) => {},
                Err(_) if Instant::now() >= deadline => break,
                Err(_) => debug!("dependency cutoff reached"),
            }
        }

        join.abort_all();
        for kind in run.unfinished() {
            let latency = run.latency(kind, deadline);
            self.monitor.record(MonitorEvent::TaskTimedOut {
                request_id: run.request.request_id.clone(),
                agent: kind,
                latency,
            });
            run.settle(
                kind,
                AgentStatus::TimedOut,
                latency,
                Some(Warning {
                    agent: kind,
                    kind: WarningKind::AgentTimeout,
                    message: OrchestratorError::agent_timeout(kind).to_string(),
                }),
            );
        }
    }

    fn dispatch(
        &self,
        run: &mut RequestRun,
        kind: AgentKind,
        deadline: Instant,
        join: &mut JoinSet<(AgentKind, Outcome)>,
    ) -> Option<TaskId> {
        let Some(agent) = self.registry.get(kind) else {
            run.settle(
                kind,
                AgentStatus::Failed,
                Duration::ZERO,
                Some(Warning {
                    agent: kind,
                    kind: WarningKind::AgentFailed,
                    message: format!("no agent registered for '{kind}'"),
                }),
            );
            return None;
        };
        let dependencies = run.dependency_results(kind);
        let received: Vec<AgentKind> = dependencies.iter().map(|r| r.agent).collect();
        let key = CacheKey::for_agent(&run.request, kind, &received);
        debug!(agent = %kind, dependencies = dependencies.len(), "dispatching agent");
        run.start(kind);
        self.monitor.record(MonitorEvent::TaskDispatched {
            request_id: run.request.request_id.clone(),
            agent: kind,
        });

        let context = AgentContext::new(
            Arc::clone(&run.request),
            deadline,
            Arc::clone(&self.services),
        )
        .with_dependencies(dependencies);
        let cache = Arc::clone(&self.cache);
        let ttl = self.config.ttl_for(kind);

        let handle =
            join.spawn(async move { (kind, run_agent(agent, context, key, cache, ttl).await) });
        Some(handle.id())
    }

    fn complete(&self, run: &mut RequestRun, kind: AgentKind, outcome: Outcome) {
        let latency = run.latency(kind, Instant::now());
        let request_id = run.request.request_id.clone();

        match outcome {
            Outcome::Done { result, cache_hit } => {
                debug!(agent = %kind, cache_hit, ?latency, "agent done");
                self.monitor.record(MonitorEvent::TaskDone {
                    request_id,
                    agent: kind,
                    latency,
                    cache_hit,
                });
                run.succeed(kind, result, latency, cache_hit);
            },
            Outcome::Failed(error) => {
                let (status, warning_kind) = classify(&error);
                if status == AgentStatus::TimedOut {
                    self.monitor.record(MonitorEvent::TaskTimedOut {
                        request_id,
                        agent: kind,
                        latency,
                    });
                } else {
                    self.monitor.record(MonitorEvent::TaskFailed {
                        request_id,
                        agent: kind,
                        latency,
                        error: error.to_string(),
                    });
                }
                run.settle(
                    kind,
                    status,
                    latency,
                    Some(Warning {
                        agent: kind,
                        kind: warning_kind,
                        message: error.to_string(),
                    }),
                );
            },
        }
    }
}

impl std::fmt::Debug for AgentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCoordinator")
            .field("registry", &self.registry)
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

/// Cache lookup, then the agent itself, then cache write-back
async fn run_agent(
    agent: Arc<dyn Agent>,
    context: AgentContext,
    key: CacheKey,
    cache: Arc<CacheManager>,
    ttl: Duration,
) -> Outcome {
    let kind = agent.kind();

    if let Some(value) = cache.get(&key).await {
        match serde_json::from_value::<AgentResult>(value) {
            Ok(result) => {
                return Outcome::Done {
                    result,
                    cache_hit: true,
                };
            },
            Err(e) => {
                warn!(agent = %kind, error = %e, "discarding unreadable cache entry");
                cache.invalidate(&key).await;
            },
        }
    }

    // A panicking agent surfaces as a join error instead of tearing down the
    // request; dropping the guard (deadline abort) cancels the agent too.
    let ticker = context.ticker().to_string();
    let mut handle = AbortOnDrop(tokio::spawn(async move {
        agent.run(&ticker, &context).await
    }));
    let result = match (&mut handle.0).await {
        Ok(result) => result,
        Err(e) => Err(Error::ProcessingFailed(format!("agent task failed: {e}"))),
    };

    match result {
        Ok(result) => {
            match serde_json::to_value(&result) {
                Ok(value) => cache.put(key, value, ttl).await,
                Err(e) => warn!(agent = %kind, error = %e, "result not cacheable"),
            }
            Outcome::Done {
                result,
                cache_hit: false,
            }
        },
        Err(e) => Outcome::Failed(e),
    }
}

fn classify(error: &Error) -> (AgentStatus, WarningKind) {
    match error {
        Error::Timeout { .. } => (AgentStatus::TimedOut, WarningKind::AgentTimeout),
        Error::CircuitOpen { .. } => (AgentStatus::Failed, WarningKind::CircuitOpen),
        Error::Transient { .. } => (AgentStatus::Failed, WarningKind::TransientService),
        Error::MalformedResponse(_) => (AgentStatus::Failed, WarningKind::MalformedResponse),
        Error::Unavailable { .. } => (AgentStatus::Failed, WarningKind::ServiceUnavailable),
        _ => (AgentStatus::Failed, WarningKind::AgentFailed),
    }
}

/// Task table of one request
struct RequestRun {
    request: Arc<AnalysisRequest>,
    tasks: BTreeMap<AgentKind, AgentTask>,
    pending: BTreeSet<AgentKind>,
    dispatched_at: BTreeMap<AgentKind, Instant>,
    results: BTreeMap<AgentKind, AgentResult>,
    reports: BTreeMap<AgentKind, AgentTaskReport>,
    warnings: Vec<Warning>,
}

impl RequestRun {
    fn new(request: &Arc<AnalysisRequest>) -> Self {
        let tasks: BTreeMap<AgentKind, AgentTask> = request
            .agents
            .iter()
            .map(|kind| (*kind, AgentTask::new(*kind, request)))
            .collect();
        Self {
            request: Arc::clone(request),
            pending: tasks.keys().copied().collect(),
            tasks,
            dispatched_at: BTreeMap::new(),
            results: BTreeMap::new(),
            reports: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn status(&self, kind: AgentKind) -> AgentStatus {
        self.tasks
            .get(&kind)
            .map_or(AgentStatus::Pending, |task| task.status)
    }

    /// Pending tasks whose dependencies are all terminal, or every pending
    /// task when `force` is set
    fn ready(&self, force: bool) -> Vec<AgentKind> {
        self.pending
            .iter()
            .copied()
            .filter(|kind| {
                force
                    || self.tasks.get(kind).is_some_and(|task| {
                        task.dependencies
                            .iter()
                            .all(|dep| self.status(*dep).is_terminal())
                    })
            })
            .collect()
    }

    fn dependency_results(&self, kind: AgentKind) -> Vec<AgentResult> {
        self.tasks
            .get(&kind)
            .map(|task| {
                task.dependencies
                    .iter()
                    .filter_map(|dep| self.results.get(dep).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn start(&mut self, kind: AgentKind) {
        self.pending.remove(&kind);
        self.dispatched_at.insert(kind, Instant::now());
        if let Some(task) = self.tasks.get_mut(&kind) {
            task.status = AgentStatus::Running;
        }
    }

    fn latency(&self, kind: AgentKind, until: Instant) -> Duration {
        self.dispatched_at
            .get(&kind)
            .map_or(Duration::ZERO, |at| until.saturating_duration_since(*at))
    }

    fn unfinished(&self) -> Vec<AgentKind> {
        self.tasks
            .values()
            .filter(|task| !task.status.is_terminal())
            .map(|task| task.agent)
            .collect()
    }

    fn succeed(&mut self, kind: AgentKind, result: AgentResult, latency: Duration, cache_hit: bool) {
        self.results.insert(kind, result);
        self.record(kind, AgentStatus::Done, latency, cache_hit, None);
    }

    fn settle(
        &mut self,
        kind: AgentKind,
        status: AgentStatus,
        latency: Duration,
        warning: Option<Warning>,
    ) {
        let error = warning.as_ref().map(|w| w.message.clone());
        self.warnings.extend(warning);
        self.record(kind, status, latency, false, error);
    }

    fn record(
        &mut self,
        kind: AgentKind,
        status: AgentStatus,
        latency: Duration,
        cache_hit: bool,
        error: Option<String>,
    ) {
        self.pending.remove(&kind);
        if let Some(task) = self.tasks.get_mut(&kind) {
            task.status = status;
        }
        self.reports.insert(
            kind,
            AgentTaskReport {
                agent: kind,
                status,
                latency,
                cache_hit,
                error,
            },
        );
    }

    fn metrics(&self, elapsed: Duration) -> PerformanceMetrics {
        let dispatched = self.dispatched_at.len();
        let hits = self.reports.values().filter(|r| r.cache_hit).count();
        let busy: Duration = self
            .dispatched_at
            .keys()
            .filter_map(|kind| self.reports.get(kind))
            .map(|r| r.latency)
            .sum();
        let done = self.results.len();

        PerformanceMetrics {
            cache_hit_rate: if dispatched == 0 {
                0.0
            } else {
                hits as f64 / dispatched as f64
            },
            parallel_efficiency: if elapsed.is_zero() {
                1.0
            } else {
                busy.as_secs_f64() / elapsed.as_secs_f64()
            },
            success_rate: if self.tasks.is_empty() {
                0.0
            } else {
                done as f64 / self.tasks.len() as f64
            },
        }
    }

    fn finish(mut self) -> (Vec<AgentResult>, Vec<Warning>, Vec<AgentTaskReport>) {
        self.warnings.sort_by_key(|w| w.agent);
        (
            self.results.into_values().collect(),
            self.warnings,
            self.reports.into_values().collect(),
        )
    }
}
