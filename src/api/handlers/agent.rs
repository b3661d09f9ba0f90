use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::debug;

use crate::api::{auth::agent_id, state::AppState, types::*};
use crate::dispatch::PollOutcome;
use crate::domain::HoldId;
use crate::holds::HoldOutcome;

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> std::result::Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, "Validation", e.body_text()))
}

/// POST /agent/register
pub async fn register(State(state): State<AppState>) -> Json<RegisterResponse> {
    let agent = state.controller.register().await;
    Json(RegisterResponse { agent })
}

/// POST /agent/heartbeat
pub async fn heartbeat(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Ack> {
    let agent = agent_id(&headers)?;
    state.controller.heartbeat(agent).await?;
    Ok(Json(Ack::ok()))
}

/// POST /agent/alert
pub async fn alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<AlertRequest>, JsonRejection>,
) -> ApiResult<Ack> {
    let agent = agent_id(&headers)?;
    let req = body(payload)?;
    state.controller.alert(agent, &req.description).await?;
    Ok(Json(Ack::ok()))
}

/// POST /agent/poll_operation
pub async fn poll_operation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<PollOperationResponse> {
    let agent = agent_id(&headers)?;
    let response = match state.controller.poll_operation(agent).await? {
        PollOutcome::Available(operation) => PollOperationResponse::OperationAvailable { operation },
        PollOutcome::Unavailable => PollOperationResponse::OperationUnavailable,
    };
    Ok(Json(response))
}

/// POST /agent/operation_complete
pub async fn operation_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<OperationCompleteRequest>, JsonRejection>,
) -> ApiResult<Ack> {
    let agent = agent_id(&headers)?;
    let req = body(payload)?;
    state
        .controller
        .operation_complete(agent, req.operation_id)
        .await?;
    Ok(Json(Ack::ok()))
}

/// POST /agent/inventory_scanned
pub async fn inventory_scanned(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<InventoryScannedRequest>, JsonRejection>,
) -> ApiResult<crate::controller::InventoryScanOutcome> {
    let agent = agent_id(&headers)?;
    let req = body(payload)?;
    let outcome = state
        .controller
        .inventory_scanned(agent, req.location, req.slots)
        .await?;
    Ok(Json(outcome))
}

/// GET /agent/hold/:id
pub async fn get_hold(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<HoldResponse> {
    let agent = agent_id(&headers)?;
    let id: HoldId = id
        .parse()
        .map_err(|_| error_body(StatusCode::BAD_REQUEST, "Validation", format!("malformed hold id: {id}")))?;
    let hold = state.controller.get_hold(agent, id).await?;
    Ok(Json(HoldResponse { hold }))
}

/// POST /agent/hold/free
pub async fn get_free_hold(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<FreeHoldResponse> {
    let agent = agent_id(&headers)?;
    let response = match state.controller.get_free_hold(agent).await? {
        HoldOutcome::Acquired(hold) => FreeHoldResponse::HoldAcquired { hold },
        HoldOutcome::Unavailable => FreeHoldResponse::HoldUnavailable,
    };
    Ok(Json(response))
}

/// POST /agent/pathfinding
pub async fn find_path(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<PathfindingRequest>, JsonRejection>,
) -> ApiResult<PathfindingResponse> {
    let agent = agent_id(&headers)?;
    let req = body(payload)?;
    state.controller.require_agent(agent).await?;

    let response = match state.controller.find_path(req.start_loc, req.end_loc).await {
        Ok(path) => PathfindingResponse::PathFound { path },
        Err(e) => {
            debug!("No path for agent {}: {}", agent, e);
            PathfindingResponse::Error {
                reason: e.to_string(),
            }
        }
    };
    Ok(Json(response))
}

/// POST /agent/sign_scan_data
pub async fn sign_scan_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SignScanRequest>, JsonRejection>,
) -> ApiResult<SignScanResponse> {
    let agent = agent_id(&headers)?;
    let req = body(payload)?;
    let report = state
        .controller
        .submit_sign_scan(agent, req.scan_regions)
        .await?;
    Ok(Json(SignScanResponse {
        report: report.as_ref().clone(),
    }))
}
