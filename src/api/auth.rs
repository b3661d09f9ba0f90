use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use uuid::Uuid;

use crate::api::{
    state::AppState,
    types::{error_body, ApiError},
};
use crate::domain::AgentId;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const AGENT_ID_HEADER: &str = "x-agent-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn ensure_api_key(
    keys: &HashSet<Uuid>,
    headers: &HeaderMap,
) -> std::result::Result<(), (StatusCode, String)> {
    let Some(raw) = header_str(headers, API_KEY_HEADER) else {
        return Err((StatusCode::UNAUTHORIZED, "missing X-Api-Key header".to_string()));
    };

    match Uuid::parse_str(raw) {
        Ok(key) if keys.contains(&key) => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, "invalid API key".to_string())),
    }
}

/// Rejects the request before any handler runs unless it carries a known key
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Err((status, message)) = ensure_api_key(&state.api_keys, request.headers()) {
        tracing::debug!("Rejected {} {}: {}", request.method(), request.uri().path(), message);
        return error_body(status, "Unauthorized", message).into_response();
    }
    next.run(request).await
}

/// Agent identity from `X-Agent-Id`. Registration is checked by the controller.
pub fn agent_id(headers: &HeaderMap) -> std::result::Result<AgentId, ApiError> {
    let raw = header_str(headers, AGENT_ID_HEADER).ok_or_else(|| {
        error_body(StatusCode::BAD_REQUEST, "Validation", "missing X-Agent-Id header")
    })?;
    raw.parse()
        .map_err(|_| error_body(StatusCode::BAD_REQUEST, "Validation", format!("malformed X-Agent-Id: {raw}")))
}
