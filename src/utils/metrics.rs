//! Prometheus metrics for HTTP traffic and cache efficiency
//!
//! Each `Metrics` owns its registry, so several app instances (or tests) in
//! one process never share counters.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0];

pub struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "Duration of HTTP requests")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "path"],
        )?;
        let cache_hits_total = IntCounter::new("cache_hits_total", "Total number of cache hits")?;
        let cache_misses_total =
            IntCounter::new("cache_misses_total", "Total number of cache misses")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            cache_hits_total,
            cache_misses_total,
        })
    }

    pub fn observe_request(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_all_series() {
        let metrics = Metrics::new().unwrap();

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.observe_request("GET", "/api/v1/ltp", 200, Duration::from_millis(30));

        let text = metrics.render().unwrap();

        assert!(text.contains("cache_hits_total 2"));
        assert!(text.contains("cache_misses_total 1"));
        assert!(
            text.contains(r#"http_requests_total{method="GET",path="/api/v1/ltp",status="200"} 1"#)
        );
        assert!(text.contains(r#"http_request_duration_seconds_bucket{method="GET",path="/api/v1/ltp",le="0.1"} 1"#));
    }

    #[test]
    fn test_instances_do_not_share_counters() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_cache_miss();

        assert!(second.render().unwrap().contains("cache_misses_total 0"));
    }
}
