//! Last traded price lookup service with caching
//!
//! This module provides the main interface for looking up last traded prices.
//! It handles:
//! - Serving quotes from the cache while they are younger than the TTL
//! - Fetching from the market data provider on a miss or stale entry
//! - Collapsing concurrent fetches for the same pair into a single call
//! - Recovering from provider panics so lookups never fail

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::price_provider::MarketDataProvider;
use super::quote::{Pair, PriceQuote};
use crate::utils::cache::PriceCache;
use crate::utils::metrics::Metrics;

/// TTL used when the configured one is zero
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Upper bound for each connectivity check
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);

type SharedFetch = Shared<BoxFuture<'static, Option<PriceQuote>>>;
type InFlight = Arc<Mutex<HashMap<Pair, SharedFetch>>>;

/// Lookup service that combines a quote cache with a market data provider
///
/// The cache and provider are injected; the service does not manage their
/// lifecycle. Public operations never fail: provider failures show up as
/// degraded quotes and "nothing found" as `None` or an empty list.
pub struct LtpService<P: MarketDataProvider + 'static> {
    cache: Arc<dyn PriceCache>,
    provider: Arc<P>,
    ttl: Duration,
    pairs: Vec<Pair>,
    in_flight: InFlight,
    metrics: Option<Arc<Metrics>>,
}

impl<P: MarketDataProvider + 'static> LtpService<P> {
    /// Creates a new lookup service
    ///
    /// # Arguments
    /// * `cache` - Quote storage shared with whoever closes it at shutdown
    /// * `provider` - Remote price source
    /// * `ttl` - Freshness window; zero falls back to [`DEFAULT_TTL`]
    /// * `pairs` - Pairs served by [`Self::get_all_ltps`]
    pub fn new(cache: Arc<dyn PriceCache>, provider: P, ttl: Duration, pairs: Vec<Pair>) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };

        Self {
            cache,
            provider: Arc::new(provider),
            ttl,
            pairs,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            metrics: None,
        }
    }

    /// Count cache hits and misses of [`Self::get_ltp`] in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache(&self) -> &Arc<dyn PriceCache> {
        &self.cache
    }

    /// Get the last traded price for a pair
    ///
    /// # Returns
    /// * `Some(quote)` - Fresh cached quote, or the result of a new fetch
    ///   (possibly degraded, with `error` set)
    /// * `None` - Nothing usable was produced
    pub async fn get_ltp(&self, pair: &Pair) -> Option<PriceQuote> {
        match self.cache.get(pair).await {
            Some(cached) if self.is_fresh(&cached) => {
                log::debug!("Cache hit for {}", pair);
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit();
                }
                return Some(cached);
            }
            Some(_) => log::debug!("Cached quote for {} is stale, refetching", pair),
            None => log::debug!("Cache miss for {}, fetching from provider", pair),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        self.fetch_coalesced(pair).await
    }

    /// Get quotes for several pairs
    ///
    /// Pairs are looked up concurrently. The result keeps the input order and
    /// skips pairs that produced nothing; degraded quotes are kept.
    pub async fn get_ltps(&self, pairs: &[Pair]) -> Vec<PriceQuote> {
        join_all(pairs.iter().map(|pair| self.get_ltp(pair)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Get quotes for every configured pair
    pub async fn get_all_ltps(&self) -> Vec<PriceQuote> {
        self.get_ltps(&self.pairs).await
    }

    /// Fetch a pair from the provider regardless of cache freshness
    ///
    /// Writes whatever the provider returned (degraded quotes included) to
    /// the cache. Joins a fetch that is already in flight for the pair.
    pub async fn force_refresh(&self, pair: &Pair) -> Option<PriceQuote> {
        self.fetch_coalesced(pair).await
    }

    /// Force-refresh several pairs concurrently
    pub async fn refresh_pairs(&self, pairs: &[Pair]) {
        let results = join_all(pairs.iter().map(|pair| self.force_refresh(pair))).await;

        let mut degraded = 0;
        for (pair, result) in pairs.iter().zip(&results) {
            match result {
                Some(quote) if quote.is_degraded() => degraded += 1,
                Some(_) => {}
                None => log::warn!("Refresh of {} produced no quote", pair),
            }
        }

        log::debug!(
            "Refreshed {} pairs from {} ({} degraded)",
            pairs.len(),
            self.provider.source_name(),
            degraded
        );
    }

    pub async fn check_cache_connectivity(&self) -> bool {
        tokio::time::timeout(CONNECTIVITY_TIMEOUT, self.cache.check_connectivity())
            .await
            .unwrap_or(false)
    }

    pub async fn check_provider_connectivity(&self) -> bool {
        tokio::time::timeout(CONNECTIVITY_TIMEOUT, self.provider.check_connectivity())
            .await
            .unwrap_or(false)
    }

    fn is_fresh(&self, quote: &PriceQuote) -> bool {
        let Some(timestamp) = quote.timestamp else {
            return false;
        };

        // A timestamp slightly in the future (clock skew) counts as fresh
        match (Utc::now() - timestamp).to_std() {
            Ok(age) => age < self.ttl,
            Err(_) => true,
        }
    }

    /// Runs at most one provider fetch per pair at a time
    ///
    /// The first caller registers a shared future; callers arriving while it
    /// is pending await the same future and get the same result.
    async fn fetch_coalesced(&self, pair: &Pair) -> Option<PriceQuote> {
        let fetch = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(pair) {
                Some(existing) => {
                    log::debug!("Joining in-flight fetch for {}", pair);
                    existing.clone()
                }
                None => {
                    let fetch = fetch_and_store(
                        self.provider.clone(),
                        self.cache.clone(),
                        self.in_flight.clone(),
                        pair.clone(),
                    )
                    .boxed()
                    .shared();
                    in_flight.insert(pair.clone(), fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }
}

async fn fetch_and_store<P: MarketDataProvider + 'static>(
    provider: Arc<P>,
    cache: Arc<dyn PriceCache>,
    in_flight: InFlight,
    pair: Pair,
) -> Option<PriceQuote> {
    let result = fetch_guarded(provider.as_ref(), &pair).await;

    if let Some(quote) = &result {
        cache.set(&pair, quote.clone()).await;
    }

    in_flight.lock().await.remove(&pair);
    result
}

/// Calls the provider, turning a panic or an empty quote into `None`
async fn fetch_guarded<P: MarketDataProvider>(provider: &P, pair: &Pair) -> Option<PriceQuote> {
    log::debug!("Fetching {} from {}", pair, provider.source_name());

    match AssertUnwindSafe(provider.fetch(pair)).catch_unwind().await {
        Ok(quote) if quote.is_empty() => {
            log::warn!(
                "{} returned an empty quote for {}",
                provider.source_name(),
                pair
            );
            None
        }
        Ok(quote) => {
            if let Some(reason) = quote.error() {
                log::warn!("Degraded quote for {}: {}", pair, reason);
            }
            Some(quote)
        }
        Err(panic) => {
            log::warn!(
                "Recovered from panic in {} while fetching {}: {}",
                provider.source_name(),
                pair,
                panic_message(panic.as_ref())
            );
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
