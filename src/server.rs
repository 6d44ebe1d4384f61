//! HTTP surface of `serve` mode: Prometheus metrics and pipeline status.

use crate::automation::SchedulerHandle;
use crate::metrics;
use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tracing::{error, info};

async fn status(State(handle): State<SchedulerHandle>) -> impl IntoResponse {
    match handle.statuses().await {
        Ok(statuses) => Json(statuses).into_response(),
        Err(e) => {
            error!("Failed to collect pipeline statuses: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_app(handle: SchedulerHandle) -> Router {
    Router::new()
        .route("/status", get(status))
        .with_state(handle)
        .merge(metrics::metrics_router())
}

pub async fn run_server(handle: SchedulerHandle, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Metrics available at port {}!", port);
    Ok(axum::serve(listener, make_app(handle)).await?)
}
