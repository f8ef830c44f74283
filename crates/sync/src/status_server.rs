//! Status HTTP server
//!
//! Exposes the current sync snapshot via HTTP for monitoring tools.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::metrics::{SharedMetrics, SyncSnapshot};

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /status endpoint
/// Returns the current SyncSnapshot as JSON
async fn get_status(State(metrics): State<SharedMetrics>) -> Json<SyncSnapshot> {
    let snapshot = metrics.read().await.clone();
    Json(snapshot)
}

/// Creates the axum Router with the status endpoint
pub fn create_status_router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(metrics)
}

/// Runs the status HTTP server on 127.0.0.1:7878
pub async fn run_status_server(metrics: SharedMetrics) -> Result<(), ServerError> {
    let app = create_status_router(metrics);
    let addr = SocketAddr::from(([127, 0, 0, 1], 7878));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await.map_err(ServerError::BindError)?;

    Ok(())
}
