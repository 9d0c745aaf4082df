use std::time::Duration;

use askdb_core::AskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("checkpoint failed: {0}")]
    Checkpoint(String),
    #[error("node '{node}' failed: {source}")]
    NodeFailed { node: String, source: AskError },
    #[error("missing node: {node}")]
    MissingNode { node: String },
    #[error("graph has no entry node")]
    MissingEntry,
    #[error("invalid edge from '{from}' to '{to}'")]
    InvalidEdge { from: String, to: String },
    #[error("node '{node}' produced unknown route '{route}'")]
    UnknownRoute { node: String, route: String },
    #[error("Max steps exceeded: reached {reached}, limit {max}")]
    MaxStepsExceeded { max: usize, reached: usize },
    #[error("node '{node}' visited more than {max} times")]
    MaxVisitsExceeded { node: String, max: usize },
    #[error("timed out after {elapsed:?}")]
    Timeout {
        node: Option<String>,
        elapsed: Duration,
    },
}

impl From<GraphError> for AskError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::NodeFailed { source, .. } => source,
            GraphError::Checkpoint(reason) => AskError::CheckpointFailed(reason),
            GraphError::Timeout { elapsed, .. } => AskError::Timeout(elapsed),
            other => AskError::Custom(other.to_string()),
        }
    }
}
