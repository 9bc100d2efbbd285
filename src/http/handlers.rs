//! Axum HTTP handlers for the web server
//!
//! Provides the management WebSocket endpoint and general metadata endpoints.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::AppState;

pub const RPC_ENDPOINT: &str = "/rpc";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub rpc_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        rpc_endpoint: RPC_ENDPOINT,
    })
}

pub async fn rpc_endpoint(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, AppError> {
    if !state.server.is_accepting() {
        return Err(AppError::internal("management server is shutting down"));
    }

    let server = state.server.clone();
    Ok(upgrade.on_upgrade(move |socket| server.serve_socket(socket)))
}
