//! Passive performance monitoring
//!
//! [`PerformanceMonitor::record`] never blocks: events go over an unbounded
//! channel to a background task that folds them into rolling-window
//! counters. [`PerformanceMonitor::snapshot`] grades those counters into a
//! [`HealthReport`] and is never consulted by dispatch decisions.

use crate::circuit_breaker::CircuitState;
use crate::config::HealthThresholds;
use agent_core::AgentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// One observation emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// An agent task was started
    TaskDispatched {
        /// Owning request
        request_id: String,
        /// Agent identity
        agent: AgentKind,
    },
    /// An agent task produced a result
    TaskDone {
        /// Owning request
        request_id: String,
        /// Agent identity
        agent: AgentKind,
        /// Time from dispatch to result
        latency: Duration,
        /// Whether the result came from the cache
        cache_hit: bool,
    },
    /// An agent task failed
    TaskFailed {
        /// Owning request
        request_id: String,
        /// Agent identity
        agent: AgentKind,
        /// Time from dispatch to failure
        latency: Duration,
        /// Failure description
        error: String,
    },
    /// An agent task missed the request deadline
    TaskTimedOut {
        /// Owning request
        request_id: String,
        /// Agent identity
        agent: AgentKind,
        /// Time from dispatch to the deadline
        latency: Duration,
    },
    /// A request finished, successfully or not
    RequestCompleted {
        /// Request identity
        request_id: String,
        /// Total wall-clock time
        elapsed: Duration,
        /// Whether a synthesized insight was produced
        succeeded: bool,
    },
    /// A service breaker changed state
    BreakerTransition {
        /// Service identity
        service: String,
        /// Previous state
        from: CircuitState,
        /// New state
        to: CircuitState,
    },
}

/// Aggregate health grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    /// All thresholds met
    Healthy,
    /// Some threshold missed or a breaker is probing
    Degraded,
    /// Severe threshold missed or a breaker is open
    Poor,
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Poor => "poor",
        };
        write!(f, "{s}")
    }
}

/// Rolling-window statistics for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Finished tasks in the window
    pub requests: usize,
    /// Tasks that produced a result
    pub successes: usize,
    /// Tasks that failed
    pub failures: usize,
    /// Tasks that missed the deadline
    pub timeouts: usize,
    /// `successes / requests`, 1.0 when idle
    pub success_rate: f64,
    /// Median latency
    pub p50_latency: Duration,
    /// 95th percentile latency
    pub p95_latency: Duration,
}

/// Point-in-time health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// When the report was computed
    pub generated_at: DateTime<Utc>,
    /// Length of the rolling window
    pub window: Duration,
    /// Per-agent statistics
    pub agents: BTreeMap<AgentKind, AgentStats>,
    /// Fraction of agent tasks served from cache, if any ran
    pub cache_hit_rate: Option<f64>,
    /// Last known breaker state per service
    pub breakers: BTreeMap<String, CircuitState>,
    /// Requests completed in the window
    pub requests_completed: usize,
    /// Requests that ended in a synthesized insight
    pub requests_succeeded: usize,
    /// Success rate across all agent tasks in the window
    pub success_rate: f64,
    /// 95th percentile latency across all agent tasks
    pub p95_latency: Duration,
    /// Aggregate grade
    pub overall_health: OverallHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done { cache_hit: bool },
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
struct TaskSample {
    at: Instant,
    agent: AgentKind,
    outcome: Outcome,
    latency: Duration,
}

#[derive(Debug, Clone, Copy)]
struct RequestSample {
    at: Instant,
    succeeded: bool,
}

#[derive(Debug, Default)]
struct MonitorState {
    tasks: VecDeque<TaskSample>,
    requests: VecDeque<RequestSample>,
    breakers: BTreeMap<String, CircuitState>,
}

impl MonitorState {
    fn apply(&mut self, event: MonitorEvent, now: Instant) {
        match event {
            MonitorEvent::TaskDispatched { .. } => {},
            MonitorEvent::TaskDone {
                agent,
                latency,
                cache_hit,
                ..
            } => self.push_task(now, agent, Outcome::Done { cache_hit }, latency),
            MonitorEvent::TaskFailed { agent, latency, .. } => {
                self.push_task(now, agent, Outcome::Failed, latency);
            },
            MonitorEvent::TaskTimedOut { agent, latency, .. } => {
                self.push_task(now, agent, Outcome::TimedOut, latency);
            },
            MonitorEvent::RequestCompleted { succeeded, .. } => {
                self.requests.push_back(RequestSample { at: now, succeeded });
            },
            MonitorEvent::BreakerTransition { service, to, .. } => {
                self.breakers.insert(service, to);
            },
        }
    }

    fn push_task(&mut self, at: Instant, agent: AgentKind, outcome: Outcome, latency: Duration) {
        self.tasks.push_back(TaskSample {
            at,
            agent,
            outcome,
            latency,
        });
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        let fresh = |at: Instant| now.saturating_duration_since(at) < window;
        while self.tasks.front().is_some_and(|s| !fresh(s.at)) {
            self.tasks.pop_front();
        }
        while self.requests.front().is_some_and(|s| !fresh(s.at)) {
            self.requests.pop_front();
        }
    }
}

enum Command {
    Record(MonitorEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the monitor; cheap to clone
#[derive(Clone)]
pub struct PerformanceMonitor {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<MonitorState>>,
    window: Duration,
    thresholds: HealthThresholds,
}

impl PerformanceMonitor {
    /// Start the background aggregation task
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// handle has been dropped.
    pub fn spawn(window: Duration, thresholds: HealthThresholds) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let state = Arc::new(Mutex::new(MonitorState::default()));

        let worker_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Record(event) => {
                        let now = Instant::now();
                        let mut state =
                            worker_state.lock().unwrap_or_else(PoisonError::into_inner);
                        state.apply(event, now);
                        state.prune(now, window);
                    },
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    },
                }
            }
            debug!("performance monitor stopped");
        });

        Self {
            tx,
            state,
            window,
            thresholds,
        }
    }

    /// Record an event without waiting for it to be applied
    pub fn record(&self, event: MonitorEvent) {
        if self.tx.send(Command::Record(event)).is_err() {
            debug!("performance monitor is gone, dropping event");
        }
    }

    /// Wait until every event recorded so far has been applied
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Grade the current rolling window
    pub fn snapshot(&self) -> HealthReport {
        let now = Instant::now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = |at: Instant| now.saturating_duration_since(at) < self.window;

        let tasks: Vec<&TaskSample> = state.tasks.iter().filter(|s| fresh(s.at)).collect();
        let requests: Vec<&RequestSample> =
            state.requests.iter().filter(|s| fresh(s.at)).collect();

        let mut agents = BTreeMap::new();
        for agent in AgentKind::ALL {
            let samples: Vec<&TaskSample> =
                tasks.iter().copied().filter(|s| s.agent == agent).collect();
            if !samples.is_empty() {
                agents.insert(agent, agent_stats(&samples));
            }
        }

        let done: Vec<bool> = tasks
            .iter()
            .filter_map(|s| match s.outcome {
                Outcome::Done { cache_hit } => Some(cache_hit),
                _ => None,
            })
            .collect();
        let cache_hit_rate = (!done.is_empty())
            .then(|| done.iter().filter(|hit| **hit).count() as f64 / done.len() as f64);

        let success_rate = ratio(done.len(), tasks.len());
        let mut latencies: Vec<Duration> = tasks.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();
        let p95_latency = percentile(&latencies, 0.95);

        let overall_health = grade(
            success_rate,
            p95_latency,
            state.breakers.values(),
            &self.thresholds,
        );

        HealthReport {
            generated_at: Utc::now(),
            window: self.window,
            agents,
            cache_hit_rate,
            breakers: state.breakers.clone(),
            requests_completed: requests.len(),
            requests_succeeded: requests.iter().filter(|r| r.succeeded).count(),
            success_rate,
            p95_latency,
            overall_health,
        }
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn agent_stats(samples: &[&TaskSample]) -> AgentStats {
    let successes = samples
        .iter()
        .filter(|s| matches!(s.outcome, Outcome::Done { .. }))
        .count();
    let failures = samples
        .iter()
        .filter(|s| s.outcome == Outcome::Failed)
        .count();
    let timeouts = samples
        .iter()
        .filter(|s| s.outcome == Outcome::TimedOut)
        .count();

    let mut latencies: Vec<Duration> = samples.iter().map(|s| s.latency).collect();
    latencies.sort_unstable();

    AgentStats {
        requests: samples.len(),
        successes,
        failures,
        timeouts,
        success_rate: ratio(successes, samples.len()),
        p50_latency: percentile(&latencies, 0.50),
        p95_latency: percentile(&latencies, 0.95),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        1.0
    } else {
        part as f64 / whole as f64
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn grade<'a>(
    success_rate: f64,
    p95_latency: Duration,
    breakers: impl Iterator<Item = &'a CircuitState>,
    thresholds: &HealthThresholds,
) -> OverallHealth {
    let worst_breaker = breakers
        .map(|state| match state {
            CircuitState::Closed => OverallHealth::Healthy,
            CircuitState::HalfOpen => OverallHealth::Degraded,
            CircuitState::Open => OverallHealth::Poor,
        })
        .max()
        .unwrap_or(OverallHealth::Healthy);

    let by_success = if success_rate < thresholds.poor_success_rate {
        OverallHealth::Poor
    } else if success_rate < thresholds.degraded_success_rate {
        OverallHealth::Degraded
    } else {
        OverallHealth::Healthy
    };

    let by_latency = if p95_latency > thresholds.poor_p95_latency {
        OverallHealth::Poor
    } else if p95_latency > thresholds.degraded_p95_latency {
        OverallHealth::Degraded
    } else {
        OverallHealth::Healthy
    };

    worst_breaker.max(by_success).max(by_latency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::spawn(Duration::from_secs(900), HealthThresholds::default())
    }

    fn done(agent: AgentKind, millis: u64, cache_hit: bool) -> MonitorEvent {
        MonitorEvent::TaskDone {
            request_id: "r".to_string(),
            agent,
            latency: Duration::from_millis(millis),
            cache_hit,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let v: Vec<Duration> = (1..=20).map(Duration::from_secs).collect();
        assert_eq!(percentile(&v, 0.50), Duration::from_secs(10));
        assert_eq!(percentile(&v, 0.95), Duration::from_secs(19));
        assert_eq!(percentile(&[], 0.95), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_idle_monitor_is_healthy() {
        let report = monitor().snapshot();
        assert_eq!(report.overall_health, OverallHealth::Healthy);
        assert!(report.agents.is_empty());
        assert_eq!(report.cache_hit_rate, None);
    }

    #[tokio::test]
    async fn test_per_agent_counters() {
        let monitor = monitor();
        monitor.record(done(AgentKind::Technical, 100, false));
        monitor.record(done(AgentKind::Technical, 300, true));
        monitor.record(MonitorEvent::TaskFailed {
            request_id: "r".to_string(),
            agent: AgentKind::Sentiment,
            latency: Duration::from_millis(50),
            error: "boom".to_string(),
        });
        monitor.flush().await;

        let report = monitor.snapshot();
        let technical = &report.agents[&AgentKind::Technical];
        assert_eq!(technical.requests, 2);
        assert_eq!(technical.successes, 2);
        assert_eq!(technical.p50_latency, Duration::from_millis(100));
        assert_eq!(technical.p95_latency, Duration::from_millis(300));

        let sentiment = &report.agents[&AgentKind::Sentiment];
        assert_eq!(sentiment.failures, 1);
        assert!((sentiment.success_rate - 0.0).abs() < f64::EPSILON);

        assert_eq!(report.cache_hit_rate, Some(0.5));
        assert_eq!(report.overall_health, OverallHealth::Degraded);
    }

    #[tokio::test]
    async fn test_open_breaker_makes_health_poor() {
        let monitor = monitor();
        monitor.record(done(AgentKind::Risk, 10, false));
        monitor.record(MonitorEvent::BreakerTransition {
            service: "completion".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        });
        monitor.flush().await;

        let report = monitor.snapshot();
        assert_eq!(report.breakers["completion"], CircuitState::Open);
        assert_eq!(report.overall_health, OverallHealth::Poor);

        monitor.record(MonitorEvent::BreakerTransition {
            service: "completion".to_string(),
            from: CircuitState::Open,
            to: CircuitState::HalfOpen,
        });
        monitor.flush().await;
        assert_eq!(monitor.snapshot().overall_health, OverallHealth::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls_off_old_samples() {
        let monitor = PerformanceMonitor::spawn(Duration::from_secs(60), HealthThresholds::default());
        monitor.record(MonitorEvent::TaskTimedOut {
            request_id: "r".to_string(),
            agent: AgentKind::Technical,
            latency: Duration::from_secs(30),
        });
        monitor.record(MonitorEvent::RequestCompleted {
            request_id: "r".to_string(),
            elapsed: Duration::from_secs(30),
            succeeded: true,
        });
        monitor.flush().await;
        assert_eq!(monitor.snapshot().agents[&AgentKind::Technical].timeouts, 1);
        assert_eq!(monitor.snapshot().requests_completed, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        let report = monitor.snapshot();
        assert!(report.agents.is_empty());
        assert_eq!(report.requests_completed, 0);
        assert_eq!(report.overall_health, OverallHealth::Healthy);
    }

    #[tokio::test]
    async fn test_slow_agents_degrade_health() {
        let monitor = monitor();
        monitor.record(done(AgentKind::Fundamental, 25_000, false));
        monitor.flush().await;
        assert_eq!(monitor.snapshot().overall_health, OverallHealth::Degraded);
    }
}
