//! Write Routes
//!
//! - POST /api/v1/write (also POST /write_value)

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::dto::{WriteRequest, WriteResponse};
use crate::api::error::{ApiError, ApiResult, PLC_NOT_CONNECTED};
use crate::api::state::AppState;

/// POST /api/v1/write
///
/// Write one value to one tag. Elevated users only.
pub async fn write_value(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Json(req): Json<WriteRequest>,
) -> ApiResult<Json<WriteResponse>> {
    if !principal.elevated {
        return Err(ApiError::Forbidden(
            "writes require an elevated account".to_string(),
        ));
    }

    let device = state
        .device_by_url(&req.plc_url)
        .ok_or_else(|| ApiError::NotFound(PLC_NOT_CONNECTED.to_string()))?;

    let written = device.write_one(&req.node_name, req.value).await?;

    tracing::info!(
        user_id = %principal.user_id,
        device = %device.descriptor().name,
        tag = %req.node_name,
        value = %written,
        "Write command applied"
    );

    Ok(Json(WriteResponse::success()))
}
