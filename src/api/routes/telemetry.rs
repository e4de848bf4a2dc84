//! Telemetry Routes
//!
//! Pull-style snapshot query. Devices are read live through the poll
//! executor, not served from the last broadcast.
//!
//! - GET /api/v1/telemetry (also GET /data)

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::poller::read_sweep;
use crate::snapshot::TelemetryPayload;

/// GET /api/v1/telemetry
///
/// Current snapshot of every device the caller may see. Devices outside the
/// caller's grants are never read.
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
) -> ApiResult<Json<TelemetryPayload>> {
    let visibility = state.resolver.visibility(&principal).await;

    let visible: Vec<_> = state
        .devices
        .iter()
        .filter(|device| visibility.allows(&device.descriptor().url))
        .cloned()
        .collect();

    let batch = read_sweep(&state.executor, &visible)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    Ok(Json(TelemetryPayload { plc_clients: batch }))
}
