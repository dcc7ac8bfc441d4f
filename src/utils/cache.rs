use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use std::fmt::Display;
use std::time::Duration;

use crate::services::quote::{Pair, PriceQuote};

/// Default capacity of the in-process cache
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Storage for the latest quote per pair
///
/// Backends never surface errors to callers: a failed read is a miss and a
/// failed write is logged and dropped, so the lookup path keeps serving
/// fresh provider results while the backend is down.
#[async_trait]
pub trait PriceCache: Send + Sync {
    /// Short backend name for logs and health output (e.g. "memory")
    fn backend_name(&self) -> &'static str;

    /// Returns the stored quote if present and not expired
    async fn get(&self, pair: &Pair) -> Option<PriceQuote>;

    /// Stores the quote for the pair, replacing any previous one.
    /// A missing timestamp is set to now.
    async fn set(&self, pair: &Pair, quote: PriceQuote);

    /// Best-effort reachability check
    async fn check_connectivity(&self) -> bool;

    /// Releases backend resources
    async fn close(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheBackendError {
    Connect(String),
    Timeout(Duration),
    Command(String),
    Codec(String),
    /// Backend skipped after a recent failure; retried once this elapses
    Unavailable(Duration),
}

impl Display for CacheBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendError::Connect(msg) => write!(f, "cache connection failed: {}", msg),
            CacheBackendError::Timeout(d) => {
                write!(f, "cache operation timed out after {}ms", d.as_millis())
            }
            CacheBackendError::Command(msg) => write!(f, "cache command failed: {}", msg),
            CacheBackendError::Codec(msg) => write!(f, "cache entry codec error: {}", msg),
            CacheBackendError::Unavailable(d) => {
                write!(f, "cache backend down, retrying in {}ms", d.as_millis())
            }
        }
    }
}

impl std::error::Error for CacheBackendError {}

/// Helper to build consistent cache keys across the application
pub struct CacheKey {
    namespace: String,
    parts: Vec<String>,
}

impl CacheKey {
    /// Create a new cache key with a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            parts: Vec::new(),
        }
    }

    /// Add a part to the cache key
    pub fn with(mut self, part: impl Display) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Build the final cache key string
    pub fn build(self) -> String {
        if self.parts.is_empty() {
            self.namespace
        } else {
            format!("{}:{}", self.namespace, self.parts.join(":"))
        }
    }
}

/// In-process quote cache backed by moka
///
/// Entries expire `ttl` after they were written; expiry is checked on read.
/// A zero TTL keeps entries until they are overwritten or evicted for
/// capacity.
#[derive(Clone)]
pub struct MemoryPriceCache {
    entries: MokaCache<Pair, PriceQuote>,
}

impl MemoryPriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
        let mut builder = MokaCache::builder().max_capacity(max_capacity);
        if !ttl.is_zero() {
            builder = builder.time_to_live(ttl);
        }

        Self {
            entries: builder.build(),
        }
    }
}

impl Default for MemoryPriceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl PriceCache for MemoryPriceCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, pair: &Pair) -> Option<PriceQuote> {
        self.entries.get(pair).await
    }

    async fn set(&self, pair: &Pair, quote: PriceQuote) {
        self.entries
            .insert(pair.clone(), quote.with_default_timestamp())
            .await;
    }

    async fn check_connectivity(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use std::str::FromStr;
    use std::sync::Arc;

    fn quote(pair: &str, amount: &str) -> PriceQuote {
        PriceQuote::new(
            Pair::from(pair),
            BigDecimal::from_str(amount).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_cache_key_builder() {
        let key = CacheKey::new("ltp").with("BTC/USD").build();
        assert_eq!(key, "ltp:BTC/USD");

        let key = CacheKey::new("simple").build();
        assert_eq!(key, "simple");
    }

    #[tokio::test]
    async fn test_get_returns_stored_quote() {
        let cache = MemoryPriceCache::new(Duration::from_secs(60));
        let pair = Pair::from("BTC/USD");

        assert!(cache.get(&pair).await.is_none());

        cache.set(&pair, quote("BTC/USD", "64000.12345")).await;
        let cached = cache.get(&pair).await.unwrap();
        assert_eq!(cached.amount.to_plain_string(), "64000.12345");
        assert!(cache.check_connectivity().await);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryPriceCache::new(Duration::from_millis(100));
        let pair = Pair::from("BTC/EUR");

        cache.set(&pair, quote("BTC/EUR", "58000")).await;
        assert!(cache.get(&pair).await.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.get(&pair).await.is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_quote() {
        let cache = MemoryPriceCache::default();
        let pair = Pair::from("BTC/CHF");

        cache.set(&pair, quote("BTC/CHF", "1")).await;
        cache.set(&pair, quote("BTC/CHF", "2")).await;

        assert_eq!(cache.get(&pair).await.unwrap().amount, BigDecimal::from(2));
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let cache = MemoryPriceCache::new(Duration::ZERO);
        let pair = Pair::from("ETH/USD");

        cache.set(&pair, quote("ETH/USD", "3000")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get(&pair).await.is_some());
    }

    #[tokio::test]
    async fn test_set_fills_missing_timestamp() {
        let cache = MemoryPriceCache::default();
        let pair = Pair::from("BTC/USD");

        cache
            .set(
                &pair,
                PriceQuote {
                    pair: pair.clone(),
                    amount: BigDecimal::from(1),
                    ..Default::default()
                },
            )
            .await;

        assert!(cache.get(&pair).await.unwrap().timestamp.is_some());
    }

    #[tokio::test]
    async fn test_degraded_quotes_are_stored_as_is() {
        let cache = MemoryPriceCache::default();
        let pair = Pair::from("BTC/USD");

        cache
            .set(&pair, PriceQuote::degraded(pair.clone(), "timeout"))
            .await;

        assert_eq!(cache.get(&pair).await.unwrap().error(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(MemoryPriceCache::default());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let pair = Pair::new(format!("P{}/USD", i % 4));
                    cache.set(&pair, quote(pair.as_str(), &i.to_string())).await;
                    cache.get(&pair).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
    }
}
