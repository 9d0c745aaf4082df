//! The askdb conversation pipeline.
//!
//! A [`Coordinator`] drives each user question through the stage graph
//! `intent → schema → sqlgen → validate → execute → final`, with a bounded
//! `validate → sqlgen` rework loop, and keeps per-thread history in a
//! checkpointer.

pub mod answer_guard;
mod coordinator;
pub mod nodes;
pub mod retry_budget;
pub mod routing;
mod state;

pub use answer_guard::AnswerGuard;
pub use coordinator::{Coordinator, CoordinatorBuilder, StageHealth, APOLOGY_ANSWER};
pub use retry_budget::{count_prior_failures, RetryBudget, MAX_ATTEMPTS};
pub use state::{PipelineState, PipelineUpdate};
