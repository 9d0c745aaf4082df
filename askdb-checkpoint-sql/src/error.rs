use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointSqlError {
    #[error("checkpoint SQL connection error: {0}")]
    Connection(String),
    #[error("checkpoint SQL migration error: {0}")]
    Migration(String),
    #[error("checkpoint SQL serialization error: {0}")]
    Serialization(String),
    #[error("checkpoint SQL query error: {0}")]
    Query(String),
    #[error("checkpoint SQL projection error: {0}")]
    Projection(String),
}

impl CheckpointSqlError {
    pub(crate) fn query(error: sqlx::Error) -> Self {
        Self::Query(error.to_string())
    }
}
