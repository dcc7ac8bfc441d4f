use std::{sync::Arc, time::Duration};

use crate::{
    services::{KrakenClient, LtpService},
    utils::{
        cache::{MemoryPriceCache, PriceCache},
        env::{CacheBackend, EnvVars},
        metrics::Metrics,
        redis_cache::RedisPriceCache,
    },
};

pub struct AppState {
    pub env_vars: EnvVars,
    pub metrics: Arc<Metrics>,
    pub ltp_service: Arc<LtpService<KrakenClient>>,
}

impl AppState {
    /// Build the cache backend, the Kraken client and the lookup service
    pub fn new(env_vars: EnvVars) -> Result<AppState, Box<dyn std::error::Error>> {
        let ttl = Duration::from_secs(env_vars.cache_ttl_seconds);

        let cache: Arc<dyn PriceCache> = match env_vars.cache_backend {
            CacheBackend::Memory => Arc::new(MemoryPriceCache::new(ttl)),
            CacheBackend::Redis => Arc::new(RedisPriceCache::new(&env_vars.redis_url, ttl)?),
        };
        log::info!(
            "Using {} price cache (ttl: {:?})",
            cache.backend_name(),
            ttl
        );

        let metrics = Arc::new(Metrics::new()?);

        let http_client = reqwest::Client::builder().build()?;
        let kraken_client =
            KrakenClient::with_base_url(http_client, env_vars.kraken_api_base_url.clone())
                .with_timeout(Duration::from_secs(env_vars.provider_timeout_seconds));

        let ltp_service = Arc::new(
            LtpService::new(cache, kraken_client, ttl, env_vars.ltp_pairs.clone())
                .with_metrics(metrics.clone()),
        );

        log::info!(
            "LTP service ready for {} pairs: {}",
            env_vars.ltp_pairs.len(),
            env_vars
                .ltp_pairs
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(AppState {
            env_vars,
            metrics,
            ltp_service,
        })
    }
}
