use std::convert::TryFrom;

use askdb_checkpoint_sql::error::CheckpointSqlError;
use askdb_checkpoint_sql::migrations::run_migrations;
use askdb_checkpoint_sql::ops::{
    list_checkpoints, load_latest_checkpoint, save_checkpoint_with_projections,
};
use askdb_core::{
    AskError, Checkpoint, CheckpointMetadata, Checkpointer, GraphState, HistoryCheckpointer,
    StateSchema,
};

#[derive(Debug, Clone)]
pub struct SqliteCheckpointer {
    pool: sqlx::SqlitePool,
    enable_projections: bool,
}

#[derive(Debug, Clone)]
pub struct SqliteCheckpointerBuilder {
    database_url: String,
    max_connections: u32,
    enable_projections: bool,
}

impl SqliteCheckpointer {
    pub fn builder(database_url: impl Into<String>) -> SqliteCheckpointerBuilder {
        SqliteCheckpointerBuilder {
            database_url: database_url.into(),
            max_connections: 1,
            enable_projections: false,
        }
    }

    pub fn projections_enabled(&self) -> bool {
        self.enable_projections
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

impl SqliteCheckpointerBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn enable_projections(mut self, enable_projections: bool) -> Self {
        self.enable_projections = enable_projections;
        self
    }

    pub async fn build(self) -> Result<SqliteCheckpointer, CheckpointSqlError> {
        let options = self
            .database_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()
            .map_err(|error| CheckpointSqlError::Connection(error.to_string()))?
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .map_err(|error| CheckpointSqlError::Connection(error.to_string()))?;

        run_migrations(&pool).await?;

        Ok(SqliteCheckpointer {
            pool,
            enable_projections: self.enable_projections,
        })
    }
}

fn checkpoint_error(message: impl Into<String>) -> AskError {
    AskError::CheckpointFailed(message.into())
}

fn map_sql_error(error: CheckpointSqlError) -> AskError {
    checkpoint_error(error.to_string())
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), AskError> {
        let step = i64::try_from(checkpoint.step)
            .map_err(|_| checkpoint_error("checkpoint step does not fit into i64"))?;
        let state_json = serde_json::to_value(&checkpoint.state)
            .map_err(|error| checkpoint_error(format!("failed to serialize state: {error}")))?;

        save_checkpoint_with_projections(
            &self.pool,
            &checkpoint.thread_id,
            &checkpoint.node,
            step,
            &checkpoint.created_at,
            &state_json,
            self.enable_projections,
        )
        .await
        .map_err(map_sql_error)?;

        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, AskError> {
        let Some(stored) = load_latest_checkpoint(&self.pool, thread_id)
            .await
            .map_err(map_sql_error)?
        else {
            return Ok(None);
        };

        let step = u64::try_from(stored.step.unwrap_or_default())
            .map_err(|_| checkpoint_error("checkpoint step is negative"))?;
        let state: GraphState<S> = serde_json::from_value(stored.state_json).map_err(|error| {
            checkpoint_error(format!("failed to deserialize checkpoint state: {error}"))
        })?;

        Ok(Some(Checkpoint {
            thread_id: stored.thread_id,
            state,
            step,
            node: stored.node.unwrap_or_default(),
            created_at: stored.created_at,
        }))
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for SqliteCheckpointer {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AskError> {
        list_checkpoints(&self.pool, thread_id)
            .await
            .map_err(map_sql_error)?
            .into_iter()
            .map(|meta| {
                Ok(CheckpointMetadata {
                    seq: u64::try_from(meta.seq)
                        .map_err(|_| checkpoint_error("checkpoint seq is negative"))?,
                    node: meta.node.unwrap_or_default(),
                    step: u64::try_from(meta.step.unwrap_or_default())
                        .map_err(|_| checkpoint_error("checkpoint step is negative"))?,
                    created_at: meta.created_at,
                })
            })
            .collect()
    }
}
