use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use askdb_core::AskError;
use serde::{Deserialize, Serialize};

use crate::{Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, StateSchema};

/// One JSON line of a thread file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "S: StateSchema")]
pub struct CheckpointRecord<S: StateSchema> {
    pub seq: u64,
    pub created_at: String,
    pub checkpoint: Checkpoint<S>,
}

/// Append-only JSONL store, one file per thread under `base_dir`.
#[derive(Clone, Debug)]
pub struct FileCheckpointer {
    base_dir: PathBuf,
}

fn io_err(err: impl std::fmt::Display) -> AskError {
    AskError::CheckpointFailed(err.to_string())
}

impl FileCheckpointer {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn file_stem(thread_id: &str) -> String {
        let cleaned: String = thread_id
            .chars()
            .filter(|c| !c.is_control())
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_' || c.is_whitespace());
        if trimmed.is_empty() {
            let mut hasher = DefaultHasher::new();
            thread_id.hash(&mut hasher);
            return format!("thread-{:08x}", hasher.finish());
        }
        trimmed.to_string()
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.jsonl", Self::file_stem(thread_id)))
    }

    fn read_records<S: StateSchema>(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointRecord<S>>, AskError> {
        let path = self.thread_path(thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path).map_err(io_err)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line).map_err(io_err)?);
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AskError> {
        fs::create_dir_all(&self.base_dir).map_err(io_err)?;

        let seq = self
            .read_records::<S>(&checkpoint.thread_id)?
            .last()
            .map(|record| record.seq + 1)
            .unwrap_or(1);
        let record = CheckpointRecord {
            seq,
            created_at: checkpoint.created_at.clone(),
            checkpoint: checkpoint.clone(),
        };
        let line = serde_json::to_string(&record).map_err(io_err)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.thread_path(&checkpoint.thread_id))
            .map_err(io_err)?;
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(io_err)?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AskError> {
        Ok(self
            .read_records::<S>(thread_id)?
            .pop()
            .map(|record| record.checkpoint))
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for FileCheckpointer {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AskError> {
        Ok(self
            .read_records::<S>(thread_id)?
            .into_iter()
            .map(|record| CheckpointMetadata {
                seq: record.seq,
                node: record.checkpoint.node,
                step: record.checkpoint.step,
                created_at: record.created_at,
            })
            .collect())
    }
}
