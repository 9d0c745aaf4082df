use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::state::{GraphState, StateSchema};
use crate::AskError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound = "S: StateSchema")]
pub struct Checkpoint<S: StateSchema> {
    pub thread_id: String,
    pub state: GraphState<S>,
    pub step: u64,
    pub node: String,
    pub created_at: String,
}

impl<S: StateSchema> Checkpoint<S> {
    pub fn new(thread_id: String, state: GraphState<S>, step: u64, node: String) -> Self {
        Self {
            thread_id,
            state,
            step,
            node,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait::async_trait]
pub trait Checkpointer<S: StateSchema>: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AskError>;
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AskError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointMetadata {
    pub seq: u64,
    pub node: String,
    pub step: u64,
    pub created_at: String,
}

#[async_trait::async_trait]
pub trait HistoryCheckpointer<S: StateSchema>: Send + Sync {
    async fn list_checkpoints(&self, thread_id: &str)
        -> Result<Vec<CheckpointMetadata>, AskError>;
}

pub const DEFAULT_RETAINED_CHECKPOINTS: usize = 8;

#[derive(Debug)]
struct ThreadLineage<S: StateSchema> {
    next_seq: u64,
    entries: VecDeque<(u64, Checkpoint<S>)>,
}

impl<S: StateSchema> Default for ThreadLineage<S> {
    fn default() -> Self {
        Self {
            next_seq: 1,
            entries: VecDeque::new(),
        }
    }
}

/// Process-local store. Each thread keeps only its most recent
/// `retained` checkpoints; sequence numbers keep counting past evictions.
#[derive(Clone)]
pub struct InMemoryCheckpointer<S: StateSchema> {
    inner: Arc<RwLock<HashMap<String, ThreadLineage<S>>>>,
    retained: usize,
}

impl<S: StateSchema> Default for InMemoryCheckpointer<S> {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_CHECKPOINTS)
    }
}

impl<S: StateSchema> InMemoryCheckpointer<S> {
    pub fn with_retention(retained: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            retained: retained.max(1),
        }
    }

    pub fn retained(&self) -> usize {
        self.retained
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for InMemoryCheckpointer<S> {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AskError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| AskError::CheckpointFailed("lock".into()))?;
        let lineage = guard.entry(checkpoint.thread_id.clone()).or_default();
        lineage
            .entries
            .push_back((lineage.next_seq, checkpoint.clone()));
        lineage.next_seq += 1;
        while lineage.entries.len() > self.retained {
            lineage.entries.pop_front();
        }
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AskError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| AskError::CheckpointFailed("lock".into()))?;
        Ok(guard
            .get(thread_id)
            .and_then(|lineage| lineage.entries.back())
            .map(|(_, checkpoint)| checkpoint.clone()))
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for InMemoryCheckpointer<S> {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AskError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| AskError::CheckpointFailed("lock".into()))?;
        let metadata = guard
            .get(thread_id)
            .map(|lineage| {
                lineage
                    .entries
                    .iter()
                    .map(|(seq, cp)| CheckpointMetadata {
                        seq: *seq,
                        node: cp.node.clone(),
                        step: cp.step,
                        created_at: cp.created_at.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(metadata)
    }
}
