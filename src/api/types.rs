use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::dispatch::{Operation, OperationKind, OperationPriority};
use crate::domain::{Item, Location, OperationId, Vec3};
use crate::error::OperatorError;
use crate::holds::Hold;
use crate::registry::{Agent, AgentAlert};
use crate::signs::{CompileReport, ScanRegion};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn error_body(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

impl From<OperatorError> for ApiError {
    fn from(err: OperatorError) -> Self {
        let status = match &err {
            OperatorError::UnknownAgent(_)
            | OperatorError::UnknownOperation(_)
            | OperatorError::HoldNotFound(_) => StatusCode::NOT_FOUND,
            OperatorError::NotOwner { .. } => StatusCode::CONFLICT,
            OperatorError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            OperatorError::Validation(_) | OperatorError::Json(_) => StatusCode::BAD_REQUEST,
            _ => {
                tracing::error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_body(status, err.kind(), err.to_string())
    }
}

// ============================================================================
// Agent requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRequest {
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCompleteRequest {
    pub operation_id: OperationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryScannedRequest {
    pub location: Location,
    pub slots: Vec<Option<Item>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathfindingRequest {
    pub start_loc: Location,
    pub end_loc: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignScanRequest {
    pub scan_regions: Vec<ScanRegion>,
}

// ============================================================================
// Agent responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub agent: Agent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PollOperationResponse {
    OperationAvailable { operation: Operation },
    OperationUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldResponse {
    pub hold: Hold,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum FreeHoldResponse {
    HoldAcquired { hold: Hold },
    HoldUnavailable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PathfindingResponse {
    PathFound { path: Vec<Vec3> },
    Error { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SignScanResponse {
    pub report: CompileReport,
}

// ============================================================================
// Automation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOperationRequest {
    pub kind: OperationKind,
    #[serde(default)]
    pub priority: OperationPriority,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub operation: Operation,
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AgentAlert>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, HoldId};

    #[test]
    fn test_error_statuses() {
        let (status, body) = ApiError::from(OperatorError::UnknownAgent(AgentId::new()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "UnknownAgent");

        let (status, _) = ApiError::from(OperatorError::NotOwner {
            operation: OperationId::new(),
            agent: AgentId::new(),
        });
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = ApiError::from(OperatorError::HoldNotFound(HoldId::new()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "NotFound");

        let (status, _) = ApiError::from(OperatorError::QueueFull(3));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_tagged_responses() {
        let json = serde_json::to_value(PollOperationResponse::OperationUnavailable).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "OperationUnavailable" }));

        let json = serde_json::to_value(PathfindingResponse::PathFound {
            path: vec![Vec3::new(1, 2, 3)],
        })
        .unwrap();
        assert_eq!(json["type"], "PathFound");
        assert_eq!(json["path"][0]["y"], 2);
    }

    #[test]
    fn test_enqueue_priority_defaults_to_normal() {
        let req: EnqueueOperationRequest =
            serde_json::from_str(r#"{ "kind": { "type": "Custom", "payload": null } }"#).unwrap();
        assert_eq!(req.priority, OperationPriority::Normal);
    }
}
