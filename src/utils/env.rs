use std::str::FromStr;

use crate::services::quote::Pair;
use crate::utils::serde::split_pairs;

/// Which store backs the quote cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(format!("Unknown cache backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub port: u16,
    pub ltp_pairs: Vec<Pair>,
    pub cache_ttl_seconds: u64,
    pub kraken_api_base_url: String, // Override for testing
    pub provider_timeout_seconds: u64,
    // 0 disables the background refresher
    pub refresh_interval_seconds: u64,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    // CORS configuration
    pub cors_allowed_origins: Vec<String>,
}

impl Default for EnvVars {
    fn default() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            ltp_pairs: split_pairs(
                &std::env::var("LTP_PAIRS").unwrap_or_else(|_| "BTC/USD,BTC/EUR,BTC/CHF".into()),
            ),
            // Negative or unparsable values become 0, which the lookup service
            // replaces with its default TTL
            cache_ttl_seconds: std::env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(|ttl| ttl.max(0) as u64)
                .unwrap_or(60),
            kraken_api_base_url: std::env::var("KRAKEN_API_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.kraken.com".to_string()),
            provider_timeout_seconds: std::env::var("PROVIDER_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(5),
            refresh_interval_seconds: std::env::var("REFRESH_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            cache_backend: std::env::var("CACHE_BACKEND")
                .ok()
                .and_then(|s| match s.parse() {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        log::warn!("{}, using in-memory cache", e);
                        None
                    }
                })
                .unwrap_or_default(),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}
