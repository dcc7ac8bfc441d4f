use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ltp_be::AppState;
use ltp_be::services::Pair;
use ltp_be::utils::env::{CacheBackend, EnvVars};
use std::sync::{Arc, Once};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

/// Install a test logger once; respects RUST_LOG
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Environment pointing at a mock Kraken with the refresher disabled
pub fn test_env(kraken_url: &str, pairs: &[&str]) -> EnvVars {
    EnvVars {
        port: 0,
        ltp_pairs: pairs.iter().map(|p| Pair::from(*p)).collect(),
        cache_ttl_seconds: 60,
        kraken_api_base_url: kraken_url.to_string(),
        provider_timeout_seconds: 2,
        refresh_interval_seconds: 0,
        cache_backend: CacheBackend::Memory,
        redis_url: "redis://127.0.0.1:6379/0".to_string(),
        cors_allowed_origins: vec!["*".to_string()],
    }
}

pub fn create_app(env_vars: EnvVars) -> (Router, Arc<AppState>) {
    init_logging();
    let state = Arc::new(AppState::new(env_vars).expect("Failed to build app state"));
    (ltp_be::routes::create_routes(state.clone()), state)
}

/// Mount a Ticker response for one Kraken symbol
pub async fn mock_ticker(server: &MockServer, symbol: &str, price: &str) {
    Mock::given(method("GET"))
        .and(path("/0/public/Ticker"))
        .and(query_param("pair", symbol))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": [],
            "result": {
                symbol: {
                    "a": ["1", "1", "1.000"],
                    "b": ["1", "1", "1.000"],
                    "c": [price, "0.00100000"]
                }
            }
        })))
        .mount(server)
        .await;
}

pub async fn mock_server_time(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/0/public/Time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": [],
            "result": { "unixtime": 1700000000 }
        })))
        .mount(server)
        .await;
}

/// Send a GET request and return status plus parsed JSON body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    (status, json)
}

/// Send a GET request and return status, content type and raw text body
pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}
