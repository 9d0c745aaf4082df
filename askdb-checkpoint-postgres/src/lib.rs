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
pub struct PostgresCheckpointer {
    pool: sqlx::PgPool,
    enable_projections: bool,
}

#[derive(Debug, Clone)]
pub struct PostgresCheckpointerBuilder {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
    enable_projections: bool,
}

impl PostgresCheckpointer {
    pub fn builder(database_url: impl Into<String>) -> PostgresCheckpointerBuilder {
        PostgresCheckpointerBuilder {
            database_url: database_url.into(),
            max_connections: 5,
            min_connections: 0,
            enable_projections: false,
        }
    }

    pub fn projections_enabled(&self) -> bool {
        self.enable_projections
    }
}

impl PostgresCheckpointerBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    pub fn enable_projections(mut self, enable_projections: bool) -> Self {
        self.enable_projections = enable_projections;
        self
    }

    pub async fn build(self) -> Result<PostgresCheckpointer, CheckpointSqlError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect(&self.database_url)
            .await
            .map_err(|error| CheckpointSqlError::Connection(error.to_string()))?;

        run_migrations(&pool).await?;

        Ok(PostgresCheckpointer {
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
impl<S: StateSchema> Checkpointer<S> for PostgresCheckpointer {
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
impl<S: StateSchema> HistoryCheckpointer<S> for PostgresCheckpointer {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, AskError> {
        let rows = list_checkpoints(&self.pool, thread_id)
            .await
            .map_err(map_sql_error)?;
        let mut history = Vec::with_capacity(rows.len());
        for meta in rows {
            history.push(CheckpointMetadata {
                seq: u64::try_from(meta.seq)
                    .map_err(|_| checkpoint_error("checkpoint seq is negative"))?,
                node: meta.node.unwrap_or_default(),
                step: u64::try_from(meta.step.unwrap_or_default())
                    .map_err(|_| checkpoint_error("checkpoint step is negative"))?,
                created_at: meta.created_at,
            });
        }
        Ok(history)
    }
}
