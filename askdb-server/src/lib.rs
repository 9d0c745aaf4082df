//! HTTP front end: the chat endpoint, stage health and the query gateway
//! tools, served with axum.

mod checkpoint;
mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use askdb_gateway::QueryGateway;
use askdb_pipeline::Coordinator;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use checkpoint::CheckpointBackend;
pub use config::{Config, DEFAULT_MAX_BODY_BYTES};
pub use error::ApiError;

/// Shared handler state. Built once at startup and owned by the router.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub gateway: Arc<QueryGateway>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, gateway: QueryGateway) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            gateway: Arc::new(gateway),
        }
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let tools = Router::new()
        .route("/schema_search", post(handlers::schema_search))
        .route("/list_join_cards", post(handlers::list_join_cards))
        .route("/introspect_db", post(handlers::introspect_db))
        .route("/validate_sql", post(handlers::validate_sql))
        .route("/execute_sql", post(handlers::execute_sql));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/stages", get(handlers::stage_health))
        .route("/chat", post(handlers::chat))
        .route("/threads/:thread_id/history", get(handlers::history))
        .route("/threads/:thread_id/checkpoints", get(handlers::checkpoints))
        .nest("/tools", tools)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
