mod config;
mod error;
mod file_checkpointer;
mod graph;
mod observer;
mod program;

pub use askdb_core::{
    Checkpoint, CheckpointMetadata, Checkpointer, GraphState, HistoryCheckpointer,
    InMemoryCheckpointer, StateSchema, StateUpdate,
};
pub use config::{ExecutionConfig, ExecutionOptions};
pub use error::GraphError;
pub use file_checkpointer::{CheckpointRecord, FileCheckpointer};
pub use graph::{ExecutableGraph, GraphBuilder, GraphContext, GraphNode, Router, END};
pub use observer::{Observer, TracingObserver};
pub use program::{EdgeKind, GraphProgram};
