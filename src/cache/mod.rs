//! Latest-value cache
//!
//! Write-through cache of the most recent tick per symbol. Cache failures
//! are logged and counted but never interrupt ingestion.

mod store;

pub use store::{KeyValueStore, MemoryStore, RedisStore};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::feed::Tick;
use crate::telemetry::{increment_counter, CounterMetric};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Default bound on a single store call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Latest tick per symbol, stored as JSON under `ticker:{symbol}:latest`
///
/// Every store call is bounded by `timeout`; a stalled store costs the
/// caller at most that long per record.
pub struct LatestValueCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    timeout: Duration,
}

impl LatestValueCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    /// Open the store named by the configuration.
    ///
    /// Without a Redis URL the in-process store is used. An unreachable Redis
    /// yields `None` and the pipeline runs without a cache.
    pub async fn open(config: &CacheConfig, clock: Arc<dyn Clock>) -> Option<Self> {
        let Some(url) = config.redis_url.as_deref() else {
            let store = Arc::new(MemoryStore::new(clock));
            return Some(Self::new(store, config.ttl()).with_timeout(config.timeout()));
        };

        let store = match RedisStore::connect(url, config.timeout()).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, running without cache");
                return None;
            }
        };

        let cache = Self::new(Arc::new(store), config.ttl()).with_timeout(config.timeout());
        if let Err(e) = cache.ping().await {
            tracing::warn!(error = %e, "Redis ping failed, running without cache");
            return None;
        }

        tracing::info!("Redis cache connected");
        Some(cache)
    }

    pub fn key(symbol: &str) -> String {
        format!("ticker:{}:latest", symbol)
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Overwrite the symbol's entry and reset its TTL
    pub async fn put_tick(&self, tick: &Tick) {
        let payload = match serde_json::to_string(tick) {
            Ok(payload) => payload,
            Err(e) => {
                increment_counter(CounterMetric::CacheErrors, 1);
                tracing::warn!(symbol = %tick.symbol, error = %e, "Failed to encode tick for cache");
                return;
            }
        };

        let key = Self::key(&tick.symbol);
        if let Err(e) = self
            .bounded(self.store.set_ex(&key, payload, self.ttl))
            .await
        {
            increment_counter(CounterMetric::CacheErrors, 1);
            tracing::warn!(symbol = %tick.symbol, error = %e, "Cache write failed");
        }
    }

    /// Most recent tick for `symbol` if one was written within the TTL
    pub async fn latest(&self, symbol: &str) -> Option<Tick> {
        let key = Self::key(symbol);
        let raw = match self.bounded(self.store.get(&key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                increment_counter(CounterMetric::CacheErrors, 1);
                tracing::warn!(symbol, error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(tick) => Some(tick),
            Err(e) => {
                increment_counter(CounterMetric::CacheErrors, 1);
                tracing::warn!(symbol, error = %e, "Cached tick is not valid JSON");
                None
            }
        }
    }

    /// Check the store is reachable
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded(self.store.ping()).await
    }
}
