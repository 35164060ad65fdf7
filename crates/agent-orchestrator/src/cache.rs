//! Bounded result cache with per-entry TTL and LRU eviction
//!
//! One `CacheManager` is constructed at process start and shared by every
//! in-flight request. Recency is tracked by [`cached::SizedCache`], which
//! moves an entry to the front on both hit and insert and drops the back
//! entry when an insert would exceed capacity. Expiry is lazy: a stale entry
//! is removed by the `get` that finds it, or falls off the LRU end.

use agent_core::{AgentKind, AnalysisRequest};
use cached::{Cached, SizedCache};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Cache key for one cached value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Ticker symbol
    pub ticker: String,
    /// Producer of the value (agent name, or a namespace such as "history")
    pub namespace: String,
    /// Additional parameters as JSON string
    pub params: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(
        ticker: impl Into<String>,
        namespace: impl Into<String>,
        params: impl Serialize,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            namespace: namespace.into(),
            params: serde_json::to_string(&params).unwrap_or_default(),
        }
    }

    /// Key for one agent's result on a request
    ///
    /// Depends on the ticker, the agent and the request parameters that
    /// change the agent's output. The request id is deliberately absent.
    /// For an agent with dependencies, `received` (the dependency results it
    /// was given) is part of the key, so a result built on partial context
    /// is never served to a run that has the full context.
    pub fn for_agent(
        request: &AnalysisRequest,
        agent: AgentKind,
        received: &[AgentKind],
    ) -> Self {
        let position = request
            .portfolio_position
            .as_ref()
            .map(|p| (p.shares, p.cost_basis));
        let mut params = serde_json::json!({
            "analysis_type": request.analysis_type,
            "position": position,
        });
        if !agent.dependencies().is_empty() {
            let mut context: Vec<AgentKind> = received.to_vec();
            context.sort();
            context.dedup();
            params["context"] = serde_json::json!(context);
        }
        Self::new(request.ticker.clone(), agent.as_str(), params)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
    ttl: Duration,
    last_accessed_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Counters describing cache behaviour since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Stale entries removed on lookup
    pub expirations: u64,
    /// Entries currently held (including not-yet-purged stale ones)
    pub entries: usize,
    /// Maximum number of entries
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, or `None` before the first lookup
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

struct CacheState {
    entries: SizedCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

impl CacheState {
    fn insert(&mut self, key: CacheKey, value: serde_json::Value, ttl: Duration, now: Instant) {
        let full = self.entries.cache_size() >= self.stats.capacity;
        let entry = CacheEntry {
            value,
            inserted_at: now,
            ttl,
            last_accessed_at: now,
        };

        if self.entries.cache_set(key, entry).is_none() && full {
            self.stats.evictions += 1;
            debug!("cache full, evicted least-recently-used entry");
        }
    }
}

/// Thread-safe bounded cache shared across requests
pub struct CacheManager {
    state: Mutex<CacheState>,
}

impl CacheManager {
    /// Create a cache holding at most `capacity` entries (minimum one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: SizedCache::with_size(capacity),
                stats: CacheStats {
                    capacity,
                    ..CacheStats::default()
                },
            }),
        }
    }

    /// Get a live value, refreshing its recency
    ///
    /// An expired entry counts as a miss and is removed.
    pub async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let lookup = match state.entries.cache_get_mut(key) {
            Some(entry) if entry.is_expired(now) => Err(()),
            Some(entry) => {
                let idle = now.saturating_duration_since(entry.last_accessed_at);
                entry.last_accessed_at = now;
                Ok((entry.value.clone(), idle))
            },
            None => {
                state.stats.misses += 1;
                debug!(namespace = %key.namespace, ticker = %key.ticker, "cache miss");
                return None;
            },
        };

        match lookup {
            Ok((value, idle)) => {
                state.stats.hits += 1;
                debug!(namespace = %key.namespace, ticker = %key.ticker, ?idle, "cache hit");
                Some(value)
            },
            Err(()) => {
                let _ = state.entries.cache_remove(key);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                debug!(namespace = %key.namespace, ticker = %key.ticker, "cache entry expired");
                None
            },
        }
    }

    /// Insert or replace a value
    ///
    /// When the cache is full and `key` is new, the least-recently-used entry
    /// is evicted first.
    pub async fn put(&self, key: CacheKey, value: serde_json::Value, ttl: Duration) {
        let mut state = self.state.lock().await;
        state.insert(key, value, ttl, Instant::now());
    }

    /// Read-modify-write one entry under a single lock
    ///
    /// `f` receives the live value (`None` if absent or expired) and returns
    /// the value to store, or `None` to leave the entry untouched. Hit and
    /// miss counters are not affected.
    pub async fn update<F>(&self, key: CacheKey, ttl: Duration, f: F)
    where
        F: FnOnce(Option<serde_json::Value>) -> Option<serde_json::Value>,
    {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let current = state
            .entries
            .cache_get(&key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());

        if let Some(value) = f(current) {
            state.insert(key, value, ttl, now);
        }
    }

    /// Remove one entry
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state.lock().await;
        let _ = state.entries.cache_remove(key);
    }

    /// Remove every entry
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.cache_clear();
    }

    /// Get the number of cached entries
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.cache_size()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current counters
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.cache_size(),
            ..state.stats
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(500)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}
