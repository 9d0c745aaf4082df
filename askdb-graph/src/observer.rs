use askdb_core::Value;

use crate::GraphError;

#[async_trait::async_trait]
pub trait Observer: Send + Sync {
    async fn on_node_start(&self, _node_id: &str, _input: &Value) {}
    async fn on_node_end(&self, _node_id: &str, _output: &Value, _duration_ms: u128) {}
    async fn on_error(&self, _node_id: &str, _error: &GraphError) {}
    async fn on_checkpoint_saved(&self, _node_id: &str, _step: u64) {}
}

/// Emits node lifecycle events as `tracing` records. Node state is only
/// logged at `trace` since it may carry query text.
#[derive(Clone, Debug, Default)]
pub struct TracingObserver;

#[async_trait::async_trait]
impl Observer for TracingObserver {
    async fn on_node_start(&self, node_id: &str, input: &Value) {
        tracing::debug!(node = node_id, "node started");
        tracing::trace!(node = node_id, %input, "node input");
    }

    async fn on_node_end(&self, node_id: &str, _output: &Value, duration_ms: u128) {
        tracing::debug!(node = node_id, duration_ms, "node finished");
    }

    async fn on_error(&self, node_id: &str, error: &GraphError) {
        tracing::warn!(node = node_id, error = %error, "node failed");
    }

    async fn on_checkpoint_saved(&self, node_id: &str, step: u64) {
        tracing::trace!(node = node_id, step, "checkpoint saved");
    }
}
