//! Request Authentication
//!
//! Bearer credential extraction shared by the HTTP routes and the
//! WebSocket handshake.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::directory::Principal;

/// Subprotocol name a browser offers ahead of its token
pub const BEARER_SUBPROTOCOL: &str = "bearer";

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Token from a `Sec-WebSocket-Protocol: bearer, <token>` offer
pub fn bearer_from_subprotocol(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(SEC_WEBSOCKET_PROTOCOL)?.to_str().ok()?;
    let mut offered = value.split(',').map(str::trim);
    if offered.next()? != BEARER_SUBPROTOCOL {
        return None;
    }
    offered
        .next()
        .filter(|token| !token.is_empty())
        .map(String::from)
}

/// The authenticated caller of an HTTP route
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_from_header(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
        let principal = state.resolver.authenticate(&token).await?;
        Ok(AuthUser(principal))
    }
}
