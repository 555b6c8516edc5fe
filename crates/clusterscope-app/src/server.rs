//! HTTP surface over the cluster manager.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clusterscope_core::{ClusterManager, ClusterSummary, EngineError, HealthState, RefreshReport};
use tracing::{info, warn};

use crate::websocket::metrics_upgrade;

pub type SharedManager = Arc<ClusterManager>;

pub fn router(manager: SharedManager) -> Router {
    Router::new()
        .route("/api/contexts", get(list_contexts))
        .route("/api/contexts/{context}/health", get(context_health))
        .route("/api/refresh", post(refresh))
        .route("/ws/metrics/{context}", get(metrics_upgrade))
        .with_state(manager)
}

/// Serves until Ctrl-C, then shuts the manager down so open metric streams end.
pub async fn serve(manager: SharedManager, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    let shutdown = Arc::clone(&manager);
    axum::serve(listener, router(manager))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            shutdown.shutdown().await;
        })
        .await?;

    Ok(())
}

async fn list_contexts(State(manager): State<SharedManager>) -> Json<Vec<ClusterSummary>> {
    Json(manager.summaries())
}

async fn context_health(
    State(manager): State<SharedManager>,
    Path(context): Path<String>,
) -> Result<Json<HealthState>, StatusCode> {
    manager.health(&context).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn refresh(State(manager): State<SharedManager>) -> Result<Json<RefreshReport>, (StatusCode, String)> {
    match manager.refresh().await {
        Ok(report) => Ok(Json(report)),
        Err(EngineError::Cancelled) => Err((StatusCode::SERVICE_UNAVAILABLE, "engine is shutting down".into())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[cfg(test)]
mod tests;
