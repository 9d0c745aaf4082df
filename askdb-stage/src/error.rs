use std::time::Duration;

use askdb_core::AskError;
use thiserror::Error;

use crate::StageKind;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage configuration error: {0}")]
    Config(String),
    #[error("stage '{stage}' request failed: {reason}")]
    Transport { stage: StageKind, reason: String },
    #[error("stage '{stage}' timed out after {elapsed:?}")]
    Timeout { stage: StageKind, elapsed: Duration },
    #[error("stage '{stage}' returned HTTP {status}: {body}")]
    Status {
        stage: StageKind,
        status: u16,
        body: String,
    },
    #[error("stage '{stage}' returned a malformed result: {reason}")]
    Malformed { stage: StageKind, reason: String },
}

impl StageError {
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            StageError::Config(_) => None,
            StageError::Transport { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::Status { stage, .. }
            | StageError::Malformed { stage, .. } => Some(*stage),
        }
    }
}

impl From<StageError> for AskError {
    fn from(err: StageError) -> Self {
        match err.stage() {
            Some(stage) => AskError::AdapterUnreachable {
                stage: stage.name().to_string(),
                reason: err.to_string(),
            },
            None => AskError::InvalidConfig(err.to_string()),
        }
    }
}
