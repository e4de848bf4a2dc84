//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes health checks.
//!
//! - GET /health/live - Liveness check (process is alive)
//! - GET /health/ready - Readiness check (first tick completed)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;
use crate::device::ConnectionStatus;

/// GET /health/live
///
/// Kubernetes liveness check.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 200 once the scheduler has completed at least one tick.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.scheduler.ticks() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with device and subscriber counts.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let devices_total = state.devices.len();
    let devices_connected = state
        .devices
        .iter()
        .filter(|d| d.status() == ConnectionStatus::Connected)
        .count();

    let status = if devices_connected == devices_total {
        "healthy"
    } else if devices_connected > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        devices_connected,
        devices_total,
        subscribers: state.registry.connection_count().await,
        ticks: state.scheduler.ticks(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
