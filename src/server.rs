use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::{create_router, AppState};
use crate::config::AppConfig;
use crate::controller::Controller;
use crate::error::{OperatorError, Result};
use crate::services::MaintenanceService;

/// Serve the API and run background maintenance until Ctrl+C or SIGTERM
pub async fn run_server(config: &AppConfig) -> Result<()> {
    let controller = Arc::new(Controller::new(config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = MaintenanceService::new(controller.clone(), &config.services).spawn(shutdown_rx);

    let app = create_router(AppState::new(controller, config.auth.api_keys.iter().copied()));

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(
        "Operator listening on http://{}:{} ({} API keys)",
        config.server.host,
        config.server.port,
        config.auth.api_keys.len()
    );

    // In-flight requests drain before this returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping background services");
    let _ = shutdown_tx.send(true);
    maintenance
        .await
        .map_err(|e| OperatorError::Internal(format!("maintenance task failed: {e}")))?;

    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
