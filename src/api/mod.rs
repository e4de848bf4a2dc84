//! SCADA Hub REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! ## Telemetry
//! - `GET /api/v1/telemetry` - Live snapshot of visible devices (alias `GET /data`)
//! - `GET /api/v1/devices` - Configured devices visible to the caller
//!
//! ## Write
//! - `POST /api/v1/write` - Write one tag value (alias `POST /write_value`)
//!
//! ## Health
//! - `GET /health/live` - Liveness check
//! - `GET /health/ready` - Readiness check
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Telemetry subscription
//!
//! # Example
//!
//! ```rust,ignore
//! use scada_hub::api::{serve, AppState};
//! use scada_hub::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let state = AppState::from_config(&config)?;
//!     let scheduler = state.scheduler.clone().start();
//!
//!     serve(state.clone()).await?;
//!
//!     state.shutdown().await;
//!     scheduler.await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/telemetry", get(routes::telemetry::get_telemetry))
        .route("/devices", get(routes::devices::list_devices))
        .route("/write", post(routes::write::write_value));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        // Paths the existing dashboards already call
        .route("/data", get(routes::telemetry::get_telemetry))
        .route("/write_value", post(routes::write::write_value))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
///
/// Returns after a shutdown signal or once the state's cancellation token
/// fires; either way the token is cancelled so subscriber sockets close.
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.addr();
    let cancel = state.cancel.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("SCADA hub API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = cancel.cancelled() => {}
            }
            cancel.cancel();
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("SCADA hub API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
