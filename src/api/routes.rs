use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{auth::require_api_key, handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let agent_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/alert", post(handlers::alert))
        .route("/poll_operation", post(handlers::poll_operation))
        .route("/operation_complete", post(handlers::operation_complete))
        .route("/inventory_scanned", post(handlers::inventory_scanned))
        .route("/hold/free", post(handlers::get_free_hold))
        .route("/hold/:id", get(handlers::get_hold))
        .route("/pathfinding", post(handlers::find_path))
        .route("/sign_scan_data", post(handlers::sign_scan_data));

    let automation_routes = Router::new()
        .route("/sign_config", get(handlers::get_sign_config))
        .route("/sign_report", get(handlers::get_sign_report))
        .route("/alerts", get(handlers::get_alerts))
        .route("/operation", post(handlers::enqueue_operation))
        .route("/operation/:id", get(handlers::get_operation));

    let protected = Router::new()
        .nest("/agent", agent_routes)
        .nest("/automation", automation_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
