//! Remote reasoning stages: where they live, what they return, and the HTTP
//! client that talks to them.

mod client;
mod descriptor;
mod error;
pub mod plans;
mod result;

pub use client::{StageAdapter, StageClient, DEFAULT_STAGE_TIMEOUT};
pub use descriptor::{StageDescriptor, StageEndpoints, StageKind};
pub use error::StageError;
pub use result::{Decision, Route, RoutingView, StageResult};
