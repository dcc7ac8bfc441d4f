use axum::Router;
use axum::http::HeaderValue;
use ltp_be::AppState;
use ltp_be::services::PriceRefresher;
use ltp_be::utils::env::EnvVars;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    let state = Arc::new(AppState::new(EnvVars::default())?);
    let refresh_interval = Duration::from_secs(state.env_vars.refresh_interval_seconds);

    let refresher = if refresh_interval.is_zero() {
        log::info!("Background price refresh disabled");
        None
    } else {
        Some(PriceRefresher::start(
            state.ltp_service.clone(),
            state.ltp_service.pairs().to_vec(),
            refresh_interval,
        ))
    };

    let app = Router::new()
        .merge(ltp_be::routes::create_routes(state.clone()))
        .layer(cors_layer(&state.env_vars.cors_allowed_origins));

    let addr = format!("0.0.0.0:{}", state.env_vars.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Server running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(refresher) = refresher {
        refresher.shutdown().await;
    }
    state.ltp_service.cache().close().await;

    log::info!("Server stopped");
    Ok(())
}
