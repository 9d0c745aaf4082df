pub mod checkpoint;
mod error;
mod query;
pub mod state;
mod turn;

pub use checkpoint::{
    Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, InMemoryCheckpointer,
    DEFAULT_RETAINED_CHECKPOINTS,
};
pub use error::AskError;
pub use query::{ExecutionResult, IssueKind, Scalar, ValidationIssue};
pub use state::{Append, GraphState, Overwrite, Reducer, StateSchema, StateUpdate};
pub use turn::{ConversationTurn, Payload, Role};

pub type Value = serde_json::Value;
