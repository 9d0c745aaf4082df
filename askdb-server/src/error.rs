//! API error type and its HTTP mapping.

use askdb_core::AskError;
use askdb_gateway::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Pipeline(#[from] AskError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Gateway(err) => match err {
                GatewayError::Rejected(_)
                | GatewayError::UnknownPlaceholder(_)
                | GatewayError::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
                GatewayError::Connection(_) | GatewayError::Config(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                GatewayError::KnowledgeBase(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Gateway(err) => err.code(),
            ApiError::Pipeline(err) => err.code(),
        }
    }

    /// Caller-facing message. Rejections and placeholder errors describe the
    /// caller's own input; store and pipeline failures stay server-side.
    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Gateway(GatewayError::Rejected(rejection)) => rejection.to_string(),
            ApiError::Gateway(err @ GatewayError::UnknownPlaceholder(_)) => err.to_string(),
            ApiError::Gateway(GatewayError::Config(_)) => "no data store configured".to_string(),
            ApiError::Gateway(GatewayError::Execution(_)) => "query execution failed".to_string(),
            ApiError::Gateway(GatewayError::Connection(_)) => "data store unavailable".to_string(),
            ApiError::Gateway(GatewayError::KnowledgeBase(_)) => {
                "schema knowledge unavailable".to_string()
            }
            ApiError::Pipeline(_) => "request failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        (
            status,
            Json(json!({ "error": self.code(), "message": self.message() })),
        )
            .into_response()
    }
}
