//! Redis-backed quote cache
//!
//! Quotes are stored as JSON under `ltp:<pair>` with a PX expiry. Every
//! command is bounded by a short timeout. On failure the connection is
//! dropped and the backend is skipped for a cooldown period; meanwhile an
//! in-process cache takes over so lookups keep working while Redis is down.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::cache::{CacheBackendError, CacheKey, MemoryPriceCache, PriceCache};
use crate::services::quote::{Pair, PriceQuote};

const KEY_NAMESPACE: &str = "ltp";
const OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a failed backend is bypassed before reconnecting
const RECONNECT_COOLDOWN: Duration = Duration::from_secs(5);

pub struct RedisPriceCache {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    down_until: Mutex<Option<Instant>>,
    ttl: Duration,
    fallback: MemoryPriceCache,
}

fn cache_key(pair: &Pair) -> String {
    CacheKey::new(KEY_NAMESPACE).with(pair).build()
}

fn decode_entry(json: &str) -> Result<PriceQuote, CacheBackendError> {
    serde_json::from_str(json).map_err(|e| CacheBackendError::Codec(e.to_string()))
}

/// PX argument for a TTL; Redis rejects `PX 0`
fn expiry_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl RedisPriceCache {
    /// Creates the cache without connecting; the connection is opened lazily
    pub fn new(url: &str, ttl: Duration) -> Result<Self, CacheBackendError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheBackendError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            down_until: Mutex::new(None),
            ttl,
            fallback: MemoryPriceCache::new(ttl),
        })
    }

    /// Returns the shared connection, opening it if needed
    ///
    /// Locks are held only to read or fill the slot, never across the
    /// connect, so concurrent callers are each bounded by one timeout.
    async fn connection(&self) -> Result<MultiplexedConnection, CacheBackendError> {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        if let Some(until) = *self.down_until.lock().await {
            let now = Instant::now();
            if now < until {
                return Err(CacheBackendError::Unavailable(until - now));
            }
        }

        let connected = match tokio::time::timeout(
            OPERATION_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(CacheBackendError::Connect(e.to_string())),
            Err(_) => Err(CacheBackendError::Timeout(OPERATION_TIMEOUT)),
        };

        let conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                self.mark_down().await;
                return Err(e);
            }
        };

        self.down_until.lock().await.take();

        // Another caller may have connected in the meantime; keep the first
        let mut slot = self.connection.lock().await;
        Ok(slot.get_or_insert(conn).clone())
    }

    /// Drop the connection and bypass the backend for the cooldown period
    async fn mark_down(&self) {
        self.connection.lock().await.take();
        *self.down_until.lock().await = Some(Instant::now() + RECONNECT_COOLDOWN);
    }

    /// Absorb a backend failure; `Unavailable` means already in cooldown
    async fn handle_failure(&self, action: &str, pair: &Pair, error: CacheBackendError) {
        match error {
            CacheBackendError::Unavailable(_) => {
                log::debug!("Redis {} for {} skipped: {}", action, pair, error);
            }
            CacheBackendError::Codec(_) => {
                log::warn!("Discarding undecodable cache entry for {}: {}", pair, error);
            }
            _ => {
                log::warn!(
                    "Redis {} for {} failed, using local cache: {}",
                    action,
                    pair,
                    error
                );
                self.mark_down().await;
            }
        }
    }

    async fn read(&self, key: &str) -> Result<Option<PriceQuote>, CacheBackendError> {
        let mut conn = self.connection().await?;

        let raw: Option<String> = tokio::time::timeout(
            OPERATION_TIMEOUT,
            redis::cmd("GET").arg(key).query_async(&mut conn),
        )
        .await
        .map_err(|_| CacheBackendError::Timeout(OPERATION_TIMEOUT))?
        .map_err(|e| CacheBackendError::Command(e.to_string()))?;

        raw.as_deref().map(decode_entry).transpose()
    }

    async fn write(&self, key: &str, quote: &PriceQuote) -> Result<(), CacheBackendError> {
        let json =
            serde_json::to_string(quote).map_err(|e| CacheBackendError::Codec(e.to_string()))?;
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(json);
        if !self.ttl.is_zero() {
            cmd.arg("PX").arg(expiry_millis(self.ttl));
        }

        let _: () = tokio::time::timeout(OPERATION_TIMEOUT, cmd.query_async(&mut conn))
            .await
            .map_err(|_| CacheBackendError::Timeout(OPERATION_TIMEOUT))?
            .map_err(|e| CacheBackendError::Command(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl PriceCache for RedisPriceCache {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, pair: &Pair) -> Option<PriceQuote> {
        match self.read(&cache_key(pair)).await {
            Ok(quote) => quote,
            Err(e @ CacheBackendError::Codec(_)) => {
                self.handle_failure("read", pair, e).await;
                None
            }
            Err(e) => {
                self.handle_failure("read", pair, e).await;
                self.fallback.get(pair).await
            }
        }
    }

    async fn set(&self, pair: &Pair, quote: PriceQuote) {
        let quote = quote.with_default_timestamp();

        if let Err(e) = self.write(&cache_key(pair), &quote).await {
            self.handle_failure("write", pair, e).await;
            self.fallback.set(pair, quote).await;
        }
    }

    async fn check_connectivity(&self) -> bool {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                log::debug!("Redis connectivity check failed: {}", e);
                return false;
            }
        };

        let pong: Result<Result<String, redis::RedisError>, _> = tokio::time::timeout(
            OPERATION_TIMEOUT,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await;

        match pong {
            Ok(Ok(_)) => true,
            _ => {
                self.mark_down().await;
                false
            }
        }
    }

    async fn close(&self) {
        if self.connection.lock().await.take().is_some() {
            log::info!("Redis cache connection closed");
        }
    }
}
