//! HTTP API over the scoring service

pub mod error;
pub mod handlers;

use crate::config::ServerConfig;
use crate::service::ScoringService;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScoringService>,
}

impl AppState {
    pub fn new(service: Arc<ScoringService>) -> Self {
        Self { service }
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::health::check))
        .route("/health", get(handlers::health::check))
        .route("/stats", get(handlers::health::stats))
        .route("/predict", post(handlers::predict::predict))
        .route("/predict_simple", post(handlers::predict::predict))
        .route(
            "/upload",
            post(handlers::upload::upload).layer(DefaultBodyLimit::max(server.max_upload_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
