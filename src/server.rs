// src/server.rs

//! Liveness and status endpoint for hosting platforms.

use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::error::Result;
use crate::models::ServerConfig;
use crate::state::{BotState, CycleReport, FilterSettings};

/// Response body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub settings: FilterSettings,
    pub seen_count: usize,
    pub last_cycle: Option<CycleReport>,
}

async fn index() -> &'static str {
    "wg-watch is running"
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<Arc<BotState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        settings: state.config.snapshot(),
        seen_count: state.seen_count(),
        last_cycle: state.last_cycle(),
    })
}

/// Build the HTTP routes.
pub fn router(state: Arc<BotState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(config: &ServerConfig, state: Arc<BotState>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Health endpoint listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
