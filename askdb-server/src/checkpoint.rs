use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use askdb_checkpoint_postgres::PostgresCheckpointer;
use askdb_checkpoint_sqlite::SqliteCheckpointer;
use askdb_core::InMemoryCheckpointer;
use askdb_graph::FileCheckpointer;
use askdb_pipeline::{CoordinatorBuilder, PipelineState};

/// Where conversation checkpoints are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointBackend {
    Memory,
    File(PathBuf),
    Sqlite(String),
    Postgres(String),
}

impl FromStr for CheckpointBackend {
    type Err = String;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let url = url.trim();
        if url.is_empty() || url.eq_ignore_ascii_case("memory") {
            return Ok(Self::Memory);
        }
        if let Some(dir) = url.strip_prefix("file://") {
            if dir.is_empty() {
                return Err("file checkpoint URL needs a directory".to_string());
            }
            return Ok(Self::File(PathBuf::from(dir)));
        }
        if url.starts_with("sqlite:") {
            return Ok(Self::Sqlite(url.to_string()));
        }
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres(url.to_string()));
        }
        Err(format!("unsupported checkpoint URL scheme: {url}"))
    }
}

impl CheckpointBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }

    /// Opens the store, running migrations for the SQL backends, and hands
    /// it to the coordinator being built.
    pub async fn attach(&self, builder: CoordinatorBuilder) -> anyhow::Result<CoordinatorBuilder> {
        let builder = match self {
            Self::Memory => {
                builder.checkpointer(Arc::new(InMemoryCheckpointer::<PipelineState>::default()))
            }
            Self::File(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                builder.checkpointer(Arc::new(FileCheckpointer::new(dir)))
            }
            Self::Sqlite(url) => builder.checkpointer(Arc::new(
                SqliteCheckpointer::builder(url.clone())
                    .enable_projections(true)
                    .build()
                    .await?,
            )),
            Self::Postgres(url) => builder.checkpointer(Arc::new(
                PostgresCheckpointer::builder(url.clone())
                    .enable_projections(true)
                    .build()
                    .await?,
            )),
        };
        tracing::info!(backend = self.name(), "checkpoint store ready");
        Ok(builder)
    }
}
