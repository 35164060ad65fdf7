//! Configuration for the orchestration engine

use crate::error::{OrchestratorError, Result};
use agent_core::{AgentKind, AnalysisType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Thresholds the health snapshot grades against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Success rate below which health is at best degraded
    pub degraded_success_rate: f64,
    /// Success rate below which health is poor
    pub poor_success_rate: f64,
    /// p95 agent latency above which health is at best degraded
    pub degraded_p95_latency: Duration,
    /// p95 agent latency above which health is poor
    pub poor_p95_latency: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_success_rate: 0.9,
            poor_success_rate: 0.5,
            degraded_p95_latency: Duration::from_secs(20),
            poor_p95_latency: Duration::from_secs(45),
        }
    }
}

/// Configuration for the orchestration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Request budget for quick analyses
    pub quick_timeout: Duration,

    /// Request budget for comprehensive analyses
    pub comprehensive_timeout: Duration,

    /// Request budget for deep analyses
    pub deep_timeout: Duration,

    /// Fraction of the request budget a dependent agent waits for its
    /// dependencies before running with whatever has completed
    pub dependency_wait_fraction: f64,

    /// Maximum number of cache entries
    pub cache_capacity: usize,

    /// Cache TTL for technical results
    pub ttl_technical: Duration,

    /// Cache TTL for fundamental results
    pub ttl_fundamental: Duration,

    /// Cache TTL for sentiment results
    pub ttl_sentiment: Duration,

    /// Cache TTL for risk results
    pub ttl_risk: Duration,

    /// How long an agent's previous output is kept for novelty scoring
    pub history_ttl: Duration,

    /// Consecutive failures that open a service breaker
    pub breaker_failure_threshold: u32,

    /// Time an open breaker waits before admitting a probe
    pub breaker_cooldown: Duration,

    /// Retries for transient service failures
    pub max_retries: u32,

    /// Initial backoff duration for retries
    pub retry_backoff_base: Duration,

    /// Minimum confidence for a directional result to count in a conflict
    pub min_conflict_confidence: f64,

    /// Length of the monitor's rolling window
    pub monitor_window: Duration,

    /// Health grading thresholds
    pub health: HealthThresholds,

    /// Completion model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token budget for quick analyses
    pub max_tokens_quick: usize,

    /// Completion token budget for comprehensive analyses
    pub max_tokens_comprehensive: usize,

    /// Completion token budget for deep analyses
    pub max_tokens_deep: usize,

    /// Market data requests allowed per second
    pub market_data_rate_limit: u32,

    /// JSON-lines file that synthesized insights are appended to
    pub insight_log: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            quick_timeout: Duration::from_secs(30),
            comprehensive_timeout: Duration::from_secs(60),
            deep_timeout: Duration::from_secs(120),
            dependency_wait_fraction: 0.5,
            cache_capacity: 500,
            ttl_technical: Duration::from_secs(15 * 60),
            ttl_fundamental: Duration::from_secs(3600),
            ttl_sentiment: Duration::from_secs(5 * 60),
            ttl_risk: Duration::from_secs(30 * 60),
            history_ttl: Duration::from_secs(24 * 3600),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            max_retries: 1,
            retry_backoff_base: Duration::from_millis(500),
            min_conflict_confidence: 0.5,
            monitor_window: Duration::from_secs(15 * 60),
            health: HealthThresholds::default(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            temperature: 0.2,
            max_tokens_quick: 512,
            max_tokens_comprehensive: 1024,
            max_tokens_deep: 2048,
            market_data_rate_limit: 2,
            insight_log: None,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration builder
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Apply `ORCHESTRATOR_*` environment overrides
    ///
    /// Durations are whole seconds except `ORCHESTRATOR_RETRY_BACKOFF_MS`.
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secs = |key: &str| -> Result<Option<Duration>> {
            lookup(key)
                .map(|v| parse::<u64>(key, &v).map(Duration::from_secs))
                .transpose()
        };

        if let Some(d) = secs("ORCHESTRATOR_QUICK_TIMEOUT_SECS")? {
            self.quick_timeout = d;
        }
        if let Some(d) = secs("ORCHESTRATOR_COMPREHENSIVE_TIMEOUT_SECS")? {
            self.comprehensive_timeout = d;
        }
        if let Some(d) = secs("ORCHESTRATOR_DEEP_TIMEOUT_SECS")? {
            self.deep_timeout = d;
        }
        if let Some(v) = lookup("ORCHESTRATOR_CACHE_CAPACITY") {
            self.cache_capacity = parse("ORCHESTRATOR_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_BREAKER_THRESHOLD") {
            self.breaker_failure_threshold = parse("ORCHESTRATOR_BREAKER_THRESHOLD", &v)?;
        }
        if let Some(d) = secs("ORCHESTRATOR_BREAKER_COOLDOWN_SECS")? {
            self.breaker_cooldown = d;
        }
        if let Some(v) = lookup("ORCHESTRATOR_MAX_RETRIES") {
            self.max_retries = parse("ORCHESTRATOR_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_RETRY_BACKOFF_MS") {
            self.retry_backoff_base =
                Duration::from_millis(parse("ORCHESTRATOR_RETRY_BACKOFF_MS", &v)?);
        }
        if let Some(v) = lookup("ORCHESTRATOR_MIN_CONFLICT_CONFIDENCE") {
            self.min_conflict_confidence = parse("ORCHESTRATOR_MIN_CONFLICT_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("ORCHESTRATOR_DEPENDENCY_WAIT_FRACTION") {
            self.dependency_wait_fraction = parse("ORCHESTRATOR_DEPENDENCY_WAIT_FRACTION", &v)?;
        }
        if let Some(model) = lookup("ORCHESTRATOR_MODEL") {
            self.model = model;
        }
        if let Some(v) = lookup("ORCHESTRATOR_MARKET_DATA_RPS") {
            self.market_data_rate_limit = parse("ORCHESTRATOR_MARKET_DATA_RPS", &v)?;
        }
        if let Some(path) = lookup("ORCHESTRATOR_INSIGHT_LOG") {
            self.insight_log = Some(PathBuf::from(path));
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(OrchestratorError::Config(
                "cache_capacity must be greater than 0".to_string(),
            ));
        }

        if self.breaker_failure_threshold == 0 {
            return Err(OrchestratorError::Config(
                "breaker_failure_threshold must be greater than 0".to_string(),
            ));
        }

        if [self.quick_timeout, self.comprehensive_timeout, self.deep_timeout]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(OrchestratorError::Config(
                "analysis timeouts must be greater than 0".to_string(),
            ));
        }

        if !(self.dependency_wait_fraction > 0.0 && self.dependency_wait_fraction <= 1.0) {
            return Err(OrchestratorError::Config(
                "dependency_wait_fraction must be within (0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_conflict_confidence) {
            return Err(OrchestratorError::Config(
                "min_conflict_confidence must be within [0, 1]".to_string(),
            ));
        }

        let h = &self.health;
        if !(0.0..=1.0).contains(&h.poor_success_rate)
            || !(0.0..=1.0).contains(&h.degraded_success_rate)
            || h.poor_success_rate > h.degraded_success_rate
        {
            return Err(OrchestratorError::Config(
                "health success-rate thresholds must satisfy 0 <= poor <= degraded <= 1".to_string(),
            ));
        }

        if self.market_data_rate_limit == 0 {
            return Err(OrchestratorError::Config(
                "market_data_rate_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Request budget for an analysis depth
    pub fn timeout_for(&self, analysis_type: AnalysisType) -> Duration {
        match analysis_type {
            AnalysisType::Quick => self.quick_timeout,
            AnalysisType::Comprehensive => self.comprehensive_timeout,
            AnalysisType::Deep => self.deep_timeout,
        }
    }

    /// How long dependents wait for their dependencies within `budget`
    pub fn dependency_wait(&self, budget: Duration) -> Duration {
        budget.mul_f64(self.dependency_wait_fraction)
    }

    /// Cache TTL for an agent's results
    pub fn ttl_for(&self, agent: AgentKind) -> Duration {
        match agent {
            AgentKind::Technical => self.ttl_technical,
            AgentKind::Fundamental => self.ttl_fundamental,
            AgentKind::Sentiment => self.ttl_sentiment,
            AgentKind::Risk => self.ttl_risk,
        }
    }

    /// Completion token budget for an analysis depth
    pub fn max_tokens_for(&self, analysis_type: AnalysisType) -> usize {
        match analysis_type {
            AnalysisType::Quick => self.max_tokens_quick,
            AnalysisType::Comprehensive => self.max_tokens_comprehensive,
            AnalysisType::Deep => self.max_tokens_deep,
        }
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base * 2_u32.saturating_pow(attempt)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| OrchestratorError::Config(format!("{key}={value}: {e}")))
}

/// Builder for OrchestratorConfig
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    quick_timeout: Option<Duration>,
    comprehensive_timeout: Option<Duration>,
    deep_timeout: Option<Duration>,
    dependency_wait_fraction: Option<f64>,
    cache_capacity: Option<usize>,
    ttls: Vec<(AgentKind, Duration)>,
    history_ttl: Option<Duration>,
    breaker_failure_threshold: Option<u32>,
    breaker_cooldown: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    min_conflict_confidence: Option<f64>,
    monitor_window: Option<Duration>,
    health: Option<HealthThresholds>,
    model: Option<String>,
    temperature: Option<f32>,
    market_data_rate_limit: Option<u32>,
    insight_log: Option<PathBuf>,
}

impl OrchestratorConfigBuilder {
    /// Set the request budget for one analysis depth
    pub fn timeout(mut self, analysis_type: AnalysisType, duration: Duration) -> Self {
        match analysis_type {
            AnalysisType::Quick => self.quick_timeout = Some(duration),
            AnalysisType::Comprehensive => self.comprehensive_timeout = Some(duration),
            AnalysisType::Deep => self.deep_timeout = Some(duration),
        }
        self
    }

    /// Set the share of the budget dependents wait for their dependencies
    pub fn dependency_wait_fraction(mut self, fraction: f64) -> Self {
        self.dependency_wait_fraction = Some(fraction);
        self
    }

    /// Set the cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set the cache TTL for one agent
    pub fn ttl(mut self, agent: AgentKind, duration: Duration) -> Self {
        self.ttls.push((agent, duration));
        self
    }

    /// Set how long previous outputs are kept for novelty scoring
    pub fn history_ttl(mut self, duration: Duration) -> Self {
        self.history_ttl = Some(duration);
        self
    }

    /// Set the breaker failure threshold
    pub fn breaker_failure_threshold(mut self, failures: u32) -> Self {
        self.breaker_failure_threshold = Some(failures);
        self
    }

    /// Set the breaker cooldown
    pub fn breaker_cooldown(mut self, duration: Duration) -> Self {
        self.breaker_cooldown = Some(duration);
        self
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    /// Set the minimum confidence for conflict detection
    pub fn min_conflict_confidence(mut self, confidence: f64) -> Self {
        self.min_conflict_confidence = Some(confidence);
        self
    }

    /// Set the monitor window
    pub fn monitor_window(mut self, duration: Duration) -> Self {
        self.monitor_window = Some(duration);
        self
    }

    /// Set health thresholds
    pub fn health(mut self, thresholds: HealthThresholds) -> Self {
        self.health = Some(thresholds);
        self
    }

    /// Set the completion model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the market data rate limit
    pub fn market_data_rate_limit(mut self, per_second: u32) -> Self {
        self.market_data_rate_limit = Some(per_second);
        self
    }

    /// Append synthesized insights to a JSON-lines file
    pub fn insight_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.insight_log = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<OrchestratorConfig> {
        let defaults = OrchestratorConfig::default();

        let mut config = OrchestratorConfig {
            quick_timeout: self.quick_timeout.unwrap_or(defaults.quick_timeout),
            comprehensive_timeout: self
                .comprehensive_timeout
                .unwrap_or(defaults.comprehensive_timeout),
            deep_timeout: self.deep_timeout.unwrap_or(defaults.deep_timeout),
            dependency_wait_fraction: self
                .dependency_wait_fraction
                .unwrap_or(defaults.dependency_wait_fraction),
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
            history_ttl: self.history_ttl.unwrap_or(defaults.history_ttl),
            breaker_failure_threshold: self
                .breaker_failure_threshold
                .unwrap_or(defaults.breaker_failure_threshold),
            breaker_cooldown: self.breaker_cooldown.unwrap_or(defaults.breaker_cooldown),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            min_conflict_confidence: self
                .min_conflict_confidence
                .unwrap_or(defaults.min_conflict_confidence),
            monitor_window: self.monitor_window.unwrap_or(defaults.monitor_window),
            health: self.health.unwrap_or(defaults.health),
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            market_data_rate_limit: self
                .market_data_rate_limit
                .unwrap_or(defaults.market_data_rate_limit),
            insight_log: self.insight_log,
            ..defaults
        };

        for (agent, ttl) in self.ttls {
            match agent {
                AgentKind::Technical => config.ttl_technical = ttl,
                AgentKind::Fundamental => config.ttl_fundamental = ttl,
                AgentKind::Sentiment => config.ttl_sentiment = ttl,
                AgentKind::Risk => config.ttl_risk = ttl,
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_capacity, 500);
        assert_eq!(config.timeout_for(AnalysisType::Quick), Duration::from_secs(30));
        assert_eq!(config.timeout_for(AnalysisType::Deep), Duration::from_secs(120));
        assert_eq!(config.ttl_for(AgentKind::Sentiment), Duration::from_secs(300));
        assert_eq!(config.ttl_for(AgentKind::Fundamental), Duration::from_secs(3600));
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::builder()
            .cache_capacity(8)
            .timeout(AnalysisType::Comprehensive, Duration::from_secs(5))
            .ttl(AgentKind::Risk, Duration::from_secs(9))
            .breaker_failure_threshold(3)
            .build()
            .unwrap();

        assert_eq!(config.cache_capacity, 8);
        assert_eq!(
            config.timeout_for(AnalysisType::Comprehensive),
            Duration::from_secs(5)
        );
        assert_eq!(config.ttl_for(AgentKind::Risk), Duration::from_secs(9));
        assert_eq!(config.ttl_for(AgentKind::Technical), Duration::from_secs(900));
        assert_eq!(config.breaker_failure_threshold, 3);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let result = OrchestratorConfig::builder().cache_capacity(0).build();
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_confidence_out_of_range() {
        let config = OrchestratorConfig {
            min_conflict_confidence: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dependency_wait() {
        let config = OrchestratorConfig::default();
        assert_eq!(
            config.dependency_wait(Duration::from_secs(60)),
            Duration::from_secs(30)
        );

        let result = OrchestratorConfig::builder()
            .dependency_wait_fraction(0.0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let result = OrchestratorConfig::builder()
            .timeout(AnalysisType::Quick, Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = OrchestratorConfig::default()
            .with_lookup(lookup(&[
                ("ORCHESTRATOR_CACHE_CAPACITY", "42"),
                ("ORCHESTRATOR_DEEP_TIMEOUT_SECS", "300"),
                ("ORCHESTRATOR_RETRY_BACKOFF_MS", "250"),
                ("ORCHESTRATOR_MODEL", "test-model"),
            ]))
            .unwrap();

        assert_eq!(config.cache_capacity, 42);
        assert_eq!(config.deep_timeout, Duration::from_secs(300));
        assert_eq!(config.retry_backoff_base, Duration::from_millis(250));
        assert_eq!(config.model, "test-model");
    }

    #[test]
    fn test_env_rejects_garbage() {
        let result = OrchestratorConfig::default()
            .with_lookup(lookup(&[("ORCHESTRATOR_BREAKER_THRESHOLD", "many")]));
        assert!(matches!(result, Err(OrchestratorError::Config(msg)) if msg.contains("BREAKER")));
    }

    #[test]
    fn test_retry_backoff() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry_backoff(0), Duration::from_millis(500));
        assert_eq!(config.retry_backoff(1), Duration::from_secs(1));
        assert_eq!(config.retry_backoff(2), Duration::from_secs(2));
    }
}
