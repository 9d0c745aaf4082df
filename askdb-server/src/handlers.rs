use std::collections::BTreeMap;

use askdb_core::{CheckpointMetadata, ConversationTurn, ExecutionResult, Scalar};
use askdb_gateway::{SchemaDoc, SqlCheck, TableInfo};
use askdb_pipeline::StageHealth;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

pub const DEFAULT_SEARCH_K: usize = 8;
pub const DEFAULT_JOIN_CARDS_K: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /health/stages`
pub async fn stage_health(State(state): State<AppState>) -> Json<Vec<StageHealth>> {
    Json(state.coordinator.stage_health().await)
}

/// `POST /chat`
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ConversationTurn>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }
    Ok(Json(
        state
            .coordinator
            .chat(&request.content, request.thread_id)
            .await,
    ))
}

/// `GET /threads/:thread_id/history`
pub async fn history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<ConversationTurn>>, ApiError> {
    Ok(Json(state.coordinator.history(&thread_id).await?))
}

/// `GET /threads/:thread_id/checkpoints`
pub async fn checkpoints(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<CheckpointMetadata>>, ApiError> {
    Ok(Json(state.coordinator.checkpoints(&thread_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SchemaSearchRequest {
    pub query: String,
    #[serde(default = "default_search_k")]
    pub k: usize,
    #[serde(default)]
    pub doc_type: Option<String>,
}

fn default_search_k() -> usize {
    DEFAULT_SEARCH_K
}

#[derive(Debug, Serialize)]
pub struct Snippets {
    pub snippets: Vec<SchemaDoc>,
}

/// `POST /tools/schema_search`
pub async fn schema_search(
    State(state): State<AppState>,
    Json(request): Json<SchemaSearchRequest>,
) -> Json<Snippets> {
    let doc_type = request.doc_type.as_deref().filter(|kind| !kind.is_empty());
    Json(Snippets {
        snippets: state.gateway.schema_search(&request.query, request.k, doc_type),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinCardsRequest {
    #[serde(default = "default_join_cards_k")]
    pub k: usize,
}

fn default_join_cards_k() -> usize {
    DEFAULT_JOIN_CARDS_K
}

#[derive(Debug, Serialize)]
pub struct JoinCards {
    pub join_cards: Vec<SchemaDoc>,
}

/// `POST /tools/list_join_cards`
pub async fn list_join_cards(
    State(state): State<AppState>,
    Json(request): Json<JoinCardsRequest>,
) -> Json<JoinCards> {
    Json(JoinCards {
        join_cards: state.gateway.list_join_cards(request.k),
    })
}

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    pub tables: Vec<String>,
}

/// `POST /tools/introspect_db`
pub async fn introspect_db(
    State(state): State<AppState>,
    Json(request): Json<IntrospectRequest>,
) -> Result<Json<BTreeMap<String, TableInfo>>, ApiError> {
    Ok(Json(state.gateway.introspect_db(&request.tables).await?))
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub sql: String,
}

/// `POST /tools/validate_sql`
pub async fn validate_sql(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Json<SqlCheck> {
    Json(state.gateway.validate_sql(&request.sql))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Scalar>,
    #[serde(default)]
    pub max_rows: Option<usize>,
}

/// `POST /tools/execute_sql`
pub async fn execute_sql(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    tracing::debug!(sql = %request.sql, params = request.params.len(), "execute_sql");
    let result = state
        .gateway
        .execute_sql(&request.sql, &request.params, request.max_rows)
        .await?;
    Ok(Json(result))
}
