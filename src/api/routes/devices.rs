//! Device Routes
//!
//! - GET /api/v1/devices - Configured devices visible to the caller

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::dto::{DeviceListResponse, DeviceSummary};
use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// GET /api/v1/devices
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
) -> ApiResult<Json<DeviceListResponse>> {
    let visibility = state.resolver.visibility(&principal).await;

    let devices: Vec<DeviceSummary> = state
        .devices
        .iter()
        .filter(|d| visibility.allows(&d.descriptor().url))
        .map(|d| DeviceSummary::from(d.as_ref()))
        .collect();

    Ok(Json(DeviceListResponse {
        total: devices.len(),
        devices,
    }))
}
