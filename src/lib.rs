use std::sync::Arc;

use axum::{middleware, routing::get, Router};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod rpc;

use rpc::server::ManagementServer;

#[derive(Clone)]
pub struct AppState {
    pub api_token: Arc<str>,
    pub server: Arc<ManagementServer>,
}

impl AppState {
    pub fn new(api_token: Arc<str>, server: Arc<ManagementServer>) -> Self {
        Self { api_token, server }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(http::handlers::RPC_ENDPOINT, get(http::handlers::rpc_endpoint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_management_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/management", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
