use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AskError {
    #[error("Query rejected: {0}")]
    ValidationRejected(String),
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Parameter injection risk: {0}")]
    ParamInjectionRisk(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Stage '{stage}' unreachable: {reason}")]
    AdapterUnreachable { stage: String, reason: String },
    #[error("Rework budget exhausted after {attempts} attempts")]
    BudgetExhausted { attempts: u32 },
    #[error("Checkpoint failed: {0}")]
    CheckpointFailed(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl AskError {
    /// Stable machine-readable code; safe to show to callers because it never
    /// carries store messages, query text or parameters.
    pub fn code(&self) -> &'static str {
        match self {
            AskError::ValidationRejected(_) => "validation_rejected",
            AskError::SchemaMismatch(_) => "schema_mismatch",
            AskError::ParamInjectionRisk(_) => "param_injection_risk",
            AskError::ExecutionFailed(_) => "execution_failed",
            AskError::AdapterUnreachable { .. } => "stage_unreachable",
            AskError::BudgetExhausted { .. } => "rework_budget_exhausted",
            AskError::CheckpointFailed(_) => "checkpoint_failed",
            AskError::Timeout(_) => "timeout",
            AskError::InvalidConfig(_) => "invalid_config",
            AskError::Serde(_) => "serialization_failed",
            AskError::Custom(_) => "internal_error",
        }
    }
}
