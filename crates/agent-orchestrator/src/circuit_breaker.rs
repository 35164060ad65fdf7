//! Per-service circuit breaker
//!
//! One `CircuitBreaker` is shared by every request; it keeps one state
//! machine per service identity:
//!
//! - **Closed**: calls pass; `failure_threshold` consecutive failures open
//!   the circuit.
//! - **Open**: calls fail fast with [`Error::CircuitOpen`] until `cooldown`
//!   has elapsed, then the next caller becomes the half-open probe.
//! - **HalfOpen**: only the probe is in flight; everyone else fails fast.
//!   Probe success closes the circuit, probe failure reopens it and restarts
//!   the cooldown.
//!
//! The lock is a `std::sync::Mutex` held only for state updates, never
//! across the guarded call. A probe whose future is dropped before finishing
//! (for example on request deadline) counts as a failed probe.

use crate::monitor::{MonitorEvent, PerformanceMonitor};
use agent_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast
    Open,
    /// Admitting a single recovery probe
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker tuning shared by all services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a probe
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Observable state of one service circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCircuit {
    /// Current state
    pub state: CircuitState,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// When `state` was entered
    pub last_transition_at: Instant,
    /// Whether the half-open probe is still running
    pub probe_in_flight: bool,
}

impl ServiceCircuit {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_transition_at: now,
            probe_in_flight: false,
        }
    }

    fn enter(&mut self, state: CircuitState, now: Instant) -> (CircuitState, CircuitState) {
        let from = self.state;
        self.state = state;
        self.last_transition_at = now;
        (from, state)
    }
}

type Transition = (CircuitState, CircuitState);

/// Failure tracker keyed by service identity
pub struct CircuitBreaker {
    config: BreakerConfig,
    circuits: Mutex<HashMap<String, ServiceCircuit>>,
    monitor: Option<PerformanceMonitor>,
}

impl CircuitBreaker {
    /// Create a breaker with the given tuning
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
            monitor: None,
        }
    }

    /// Report state transitions to `monitor`
    pub fn with_monitor(mut self, monitor: PerformanceMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Run `f` under the breaker for `service`
    ///
    /// Errors for which [`Error::is_service_failure`] holds count against
    /// the circuit; any other outcome means the service answered and counts
    /// as a success.
    pub async fn call<T, F, Fut>(&self, service: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let probe = self.admit(service)?;
        let mut guard = ProbeGuard {
            breaker: self,
            service,
            armed: probe,
        };

        let result = f().await;
        guard.armed = false;

        match &result {
            Err(e) if e.is_service_failure() => self.on_failure(service, probe, e),
            _ => self.on_success(service, probe),
        }
        result
    }

    /// Current state of `service` (closed if never called)
    pub fn state(&self, service: &str) -> CircuitState {
        self.circuit(service).map_or(CircuitState::Closed, |c| c.state)
    }

    /// Full circuit record of `service`, if it has been called
    pub fn circuit(&self, service: &str) -> Option<ServiceCircuit> {
        self.lock().get(service).copied()
    }

    /// State of every known service
    pub fn states(&self) -> BTreeMap<String, CircuitState> {
        self.lock()
            .iter()
            .map(|(service, circuit)| (service.clone(), circuit.state))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ServiceCircuit>> {
        self.circuits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed; `Ok(true)` marks the probe
    fn admit(&self, service: &str) -> Result<bool> {
        let now = Instant::now();
        let (admitted, transition) = {
            let mut circuits = self.lock();
            let circuit = circuits
                .entry(service.to_string())
                .or_insert_with(|| ServiceCircuit::new(now));

            match circuit.state {
                CircuitState::Closed => (Ok(false), None),
                CircuitState::Open => {
                    if now.saturating_duration_since(circuit.last_transition_at)
                        >= self.config.cooldown
                    {
                        circuit.probe_in_flight = true;
                        let t = circuit.enter(CircuitState::HalfOpen, now);
                        (Ok(true), Some(t))
                    } else {
                        (Err(()), None)
                    }
                },
                CircuitState::HalfOpen if circuit.probe_in_flight => (Err(()), None),
                CircuitState::HalfOpen => {
                    circuit.probe_in_flight = true;
                    (Ok(true), None)
                },
            }
        };

        self.emit(service, transition);
        admitted.map_err(|()| {
            debug!(service, "circuit open, failing fast");
            Error::CircuitOpen {
                service: service.to_string(),
            }
        })
    }

    fn on_success(&self, service: &str, probe: bool) {
        let now = Instant::now();
        let transition = {
            let mut circuits = self.lock();
            let Some(circuit) = circuits.get_mut(service) else {
                return;
            };
            match circuit.state {
                CircuitState::HalfOpen if probe => {
                    circuit.probe_in_flight = false;
                    circuit.consecutive_failures = 0;
                    Some(circuit.enter(CircuitState::Closed, now))
                },
                CircuitState::Closed => {
                    circuit.consecutive_failures = 0;
                    None
                },
                _ => None,
            }
        };

        if transition.is_some() {
            info!(service, "circuit closed after successful probe");
        }
        self.emit(service, transition);
    }

    fn on_failure(&self, service: &str, probe: bool, error: &Error) {
        let now = Instant::now();
        let threshold = self.config.failure_threshold;
        let transition = {
            let mut circuits = self.lock();
            let Some(circuit) = circuits.get_mut(service) else {
                return;
            };
            match circuit.state {
                CircuitState::HalfOpen if probe => {
                    circuit.probe_in_flight = false;
                    Some(circuit.enter(CircuitState::Open, now))
                },
                CircuitState::Closed => {
                    circuit.consecutive_failures += 1;
                    (circuit.consecutive_failures >= threshold)
                        .then(|| circuit.enter(CircuitState::Open, now))
                },
                _ => None,
            }
        };

        if let Some((from, _)) = transition {
            warn!(service, %from, %error, "circuit opened");
        } else {
            debug!(service, %error, "service failure recorded");
        }
        self.emit(service, transition);
    }

    fn on_abandoned_probe(&self, service: &str) {
        let now = Instant::now();
        let transition = {
            let mut circuits = self.lock();
            circuits
                .get_mut(service)
                .filter(|c| c.state == CircuitState::HalfOpen)
                .map(|circuit| {
                    circuit.probe_in_flight = false;
                    circuit.enter(CircuitState::Open, now)
                })
        };

        if transition.is_some() {
            warn!(service, "half-open probe abandoned, circuit reopened");
        }
        self.emit(service, transition);
    }

    fn emit(&self, service: &str, transition: Option<Transition>) {
        if let (Some(monitor), Some((from, to))) = (&self.monitor, transition) {
            monitor.record(MonitorEvent::BreakerTransition {
                service: service.to_string(),
                from,
                to,
            });
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("states", &self.states())
            .finish_non_exhaustive()
    }
}

/// Reopens the circuit if a probe's future is dropped mid-flight
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    service: &'a str,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.on_abandoned_probe(self.service);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SERVICE: &str = "completion";

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        })
    }

    fn transient() -> Error {
        Error::Transient {
            service: SERVICE.to_string(),
            message: "503".to_string(),
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<()> {
        breaker.call(SERVICE, || async { Err(transient()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<()> {
        breaker.call(SERVICE, || async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_initial_state_closed() {
        let breaker = breaker();
        assert_eq!(breaker.state(SERVICE), CircuitState::Closed);
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = breaker();
        for _ in 0..2 {
            assert!(fail(&breaker).await.is_err());
        }
        assert_eq!(breaker.state(SERVICE), CircuitState::Closed);

        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(SERVICE), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = breaker
            .call(SERVICE, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let breaker = breaker();
        fail(&breaker).await.ok();
        fail(&breaker).await.ok();
        succeed(&breaker).await.ok();
        fail(&breaker).await.ok();
        fail(&breaker).await.ok();

        assert_eq!(breaker.state(SERVICE), CircuitState::Closed);
        assert_eq!(breaker.circuit(SERVICE).unwrap().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_non_service_errors_do_not_count() {
        let breaker = breaker();
        for _ in 0..5 {
            let result: Result<()> = breaker
                .call(SERVICE, || async {
                    Err(Error::MalformedResponse("prose".to_string()))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(breaker.state(SERVICE), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_services_are_independent() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        assert_eq!(breaker.state(SERVICE), CircuitState::Open);
        assert_eq!(breaker.state("market_data"), CircuitState::Closed);
        assert!(breaker.call("market_data", || async { Ok(1) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(matches!(
            succeed(&breaker).await,
            Err(Error::CircuitOpen { .. })
        ));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.state(SERVICE), CircuitState::Closed);
        assert_eq!(breaker.circuit(SERVICE).unwrap().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_and_resets_cooldown() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(matches!(fail(&breaker).await, Err(Error::Transient { .. })));
        assert_eq!(breaker.state(SERVICE), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(matches!(
            succeed(&breaker).await,
            Err(Error::CircuitOpen { .. })
        ));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_one_probe_in_flight() {
        let breaker = Arc::new(breaker());
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let probe = {
            let breaker = Arc::clone(&breaker);
            tokio::spawn(async move {
                breaker
                    .call(SERVICE, || async move {
                        let _ = wait.await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(SERVICE), CircuitState::HalfOpen);

        let calls = AtomicU32::new(0);
        let concurrent = breaker
            .call(SERVICE, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(concurrent, Err(Error::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        assert!(probe.await.unwrap().is_ok());
        assert_eq!(breaker.state(SERVICE), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_reopens() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let hung = breaker.call(SERVICE, || std::future::pending::<Result<()>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), hung).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.state(SERVICE), CircuitState::Open);
        assert!(!breaker.circuit(SERVICE).unwrap().probe_in_flight);
    }

    #[tokio::test]
    async fn test_transitions_reach_monitor() {
        let monitor = PerformanceMonitor::spawn(
            Duration::from_secs(60),
            crate::config::HealthThresholds::default(),
        );
        let breaker = breaker().with_monitor(monitor.clone());
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        monitor.flush().await;

        assert_eq!(monitor.snapshot().breakers[SERVICE], CircuitState::Open);
    }
}
