use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::{state::AppState, types::*};
use crate::domain::OperationId;
use crate::signs::{CompileReport, CompiledSignConfig};

/// GET /automation/sign_config
pub async fn get_sign_config(State(state): State<AppState>) -> Json<CompiledSignConfig> {
    let config = state.controller.sign_config().await;
    Json(config.as_ref().clone())
}

/// GET /automation/sign_report
pub async fn get_sign_report(State(state): State<AppState>) -> Json<CompileReport> {
    let report = state.controller.sign_report().await;
    Json(report.as_ref().clone())
}

/// GET /automation/alerts?limit=50
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Json<AlertsResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let alerts = state.controller.recent_alerts(limit).await;
    Json(AlertsResponse { alerts })
}

/// POST /automation/operation
pub async fn enqueue_operation(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EnqueueOperationRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<OperationResponse>), ApiError> {
    let Json(req) =
        payload.map_err(|e| error_body(StatusCode::BAD_REQUEST, "Validation", e.body_text()))?;
    let operation = state
        .controller
        .enqueue_operation(req.kind, req.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(OperationResponse { operation })))
}

/// GET /automation/operation/:id
pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<OperationResponse> {
    let id: OperationId = id.parse().map_err(|_| {
        error_body(StatusCode::BAD_REQUEST, "Validation", format!("malformed operation id: {id}"))
    })?;
    let operation = state.controller.operation(id).await?;
    Ok(Json(OperationResponse { operation }))
}
