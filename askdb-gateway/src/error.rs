use askdb_core::AskError;
use thiserror::Error;

use crate::validator::Rejection;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("query rejected: {0}")]
    Rejected(Rejection),
    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error("data store connection error: {0}")]
    Connection(String),
    #[error("knowledge base error: {0}")]
    KnowledgeBase(String),
    #[error("gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Splits sqlx failures into connectivity loss and per-query errors.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => GatewayError::Connection(err.to_string()),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("57014") => {
                GatewayError::Execution("statement timeout".to_string())
            }
            other => GatewayError::Execution(other.to_string()),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, GatewayError::Connection(_))
    }

    /// Stable code for HTTP responses.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Rejected(_) => "validation_rejected",
            GatewayError::UnknownPlaceholder(_) => "unknown_placeholder",
            GatewayError::Execution(_) => "execution_failed",
            GatewayError::Connection(_) => "store_unavailable",
            GatewayError::KnowledgeBase(_) => "knowledge_base_error",
            GatewayError::Config(_) => "invalid_config",
        }
    }
}

impl From<Rejection> for GatewayError {
    fn from(rejection: Rejection) -> Self {
        GatewayError::Rejected(rejection)
    }
}

impl From<GatewayError> for AskError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(rejection) => AskError::ValidationRejected(rejection.to_string()),
            GatewayError::UnknownPlaceholder(_)
            | GatewayError::Execution(_)
            | GatewayError::Connection(_) => AskError::ExecutionFailed(err.to_string()),
            GatewayError::KnowledgeBase(reason) => AskError::Custom(reason),
            GatewayError::Config(reason) => AskError::InvalidConfig(reason),
        }
    }
}
