//! Test doubles for the lookup service and refresher
//!
//! Fakes are injected through constructors, the same way the real Kraken
//! client and cache backends are.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::services::price_provider::MarketDataProvider;
use crate::services::quote::{Pair, PriceQuote};
use crate::utils::cache::PriceCache;

#[derive(Clone)]
enum Scripted {
    Price(BigDecimal),
    Quote(PriceQuote),
}

#[derive(Default)]
struct FakeProviderState {
    responses: Mutex<HashMap<Pair, Scripted>>,
    panics: Mutex<HashSet<Pair>>,
    calls: Mutex<HashMap<Pair, usize>>,
    delay: Mutex<Duration>,
    unreachable: AtomicBool,
}

/// Scripted market data provider
///
/// Cloning shares the script and the call counters, so a test can keep a
/// handle after moving a clone into the service. Pairs without a script get
/// a degraded "unsupported" quote, like the real adapter.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<FakeProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `pair` with `amount`, stamped at fetch time
    pub fn with_price(self, pair: &str, amount: &str) -> Self {
        self.set_price(pair, amount);
        self
    }

    pub fn set_price(&self, pair: &str, amount: &str) {
        let amount = BigDecimal::from_str(amount).unwrap();
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(Pair::from(pair), Scripted::Price(amount));
    }

    /// Answer `pair` with exactly this quote
    pub fn with_quote(self, pair: &str, quote: PriceQuote) -> Self {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(Pair::from(pair), Scripted::Quote(quote));
        self
    }

    /// Answer `pair` with a degraded quote carrying `reason`
    pub fn with_error(self, pair: &str, reason: &str) -> Self {
        let quote = PriceQuote::degraded(Pair::from(pair), reason);
        self.with_quote(pair, quote)
    }

    pub fn with_panic(self, pair: &str) -> Self {
        self.state.panics.lock().unwrap().insert(Pair::from(pair));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.delay.lock().unwrap() = delay;
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn calls(&self, pair: &str) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .get(&Pair::from(pair))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn source_name(&self) -> &'static str {
        "fake"
    }

    fn translate_pair(&self, pair: &Pair) -> Option<String> {
        self.state
            .responses
            .lock()
            .unwrap()
            .contains_key(pair)
            .then(|| pair.as_str().replace('/', ""))
    }

    async fn fetch(&self, pair: &Pair) -> PriceQuote {
        *self
            .state
            .calls
            .lock()
            .unwrap()
            .entry(pair.clone())
            .or_insert(0) += 1;

        let delay = *self.state.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.panics.lock().unwrap().contains(pair) {
            panic!("scripted provider failure for {}", pair);
        }

        let scripted = self.state.responses.lock().unwrap().get(pair).cloned();
        match scripted {
            Some(Scripted::Price(amount)) => PriceQuote::new(pair.clone(), amount, Utc::now()),
            Some(Scripted::Quote(quote)) => quote,
            None => PriceQuote::degraded(pair.clone(), format!("Unsupported pair: {}", pair)),
        }
    }

    async fn check_connectivity(&self) -> bool {
        !self.state.unreachable.load(Ordering::SeqCst)
    }
}

/// Cache whose backend is permanently down: reads miss, writes are dropped
#[derive(Default)]
pub struct FailingCache {
    writes: AtomicUsize,
}

impl FailingCache {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceCache for FailingCache {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _pair: &Pair) -> Option<PriceQuote> {
        None
    }

    async fn set(&self, pair: &Pair, _quote: PriceQuote) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        log::warn!("cache write for {} dropped: backend unavailable", pair);
    }

    async fn check_connectivity(&self) -> bool {
        false
    }
}
