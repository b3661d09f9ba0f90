use axum::{extract::State, Json};

use crate::api::state::AppState;
use crate::controller::HealthSummary;

/// GET /health -- liveness probe with component counts
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthSummary> {
    Json(state.controller.health().await)
}
