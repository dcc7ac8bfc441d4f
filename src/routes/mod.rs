use axum::{
    Json, Router,
    extract::{MatchedPath, Request, State},
    http::{StatusCode, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

use crate::{AppState, handlers};

fn reachability(reachable: bool) -> &'static str {
    if reachable { "reachable" } else { "unreachable" }
}

/// Liveness check
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness check
async fn ready() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

/// Dependency health: cache backend and Kraken reachability
async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let (cache_ok, kraken_ok) = tokio::join!(
        state.ltp_service.check_cache_connectivity(),
        state.ltp_service.check_provider_connectivity(),
    );

    let body = |status: &str| {
        json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "cache_backend": state.ltp_service.cache().backend_name(),
            "services": {
                "cache": reachability(cache_ok),
                "kraken": reachability(kraken_ok),
            }
        })
    };

    if !(cache_ok && kraken_ok) {
        log::warn!(
            "Health check degraded: cache {}, kraken {}",
            reachability(cache_ok),
            reachability(kraken_ok)
        );
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(body("degraded"))));
    }

    Ok(Json(body("ok")))
}

/// Prometheus text exposition of request and cache metrics
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            log::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Counts every routed request and records its duration
async fn track_metrics(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    };

    let response = next.run(req).await;

    state.metrics.observe_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics))
        // Last traded prices
        .route("/api/v1/ltp", get(handlers::ltp::get_ltp))
        .route_layer(from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
}
