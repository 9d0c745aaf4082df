use sqlx::{Database, Pool, Row, Transaction};

use crate::error::CheckpointSqlError;
use crate::projection::{history_messages, ProjectedMessage};
use crate::schema::{
    DELETE_MESSAGES_SQL, INSERT_CHECKPOINT_SQL, INSERT_MESSAGE_SQL,
    SELECT_CHECKPOINT_HISTORY_SQL, SELECT_LATEST_CHECKPOINT_SQL, UPSERT_THREAD_SQL,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheckpoint {
    pub thread_id: String,
    pub seq: i64,
    pub created_at: String,
    pub node: Option<String>,
    pub step: Option<i64>,
    pub state_json: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCheckpointMeta {
    pub seq: i64,
    pub created_at: String,
    pub node: Option<String>,
    pub step: Option<i64>,
}

fn encode_state(state_json: &serde_json::Value) -> Result<String, CheckpointSqlError> {
    serde_json::to_string(state_json)
        .map_err(|error| CheckpointSqlError::Serialization(error.to_string()))
}

async fn insert_checkpoint<'c, DB, E>(
    executor: E,
    thread_id: &str,
    node: &str,
    step: i64,
    created_at: &str,
    state_json: &str,
) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    E: sqlx::Executor<'c, Database = DB>,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    usize: sqlx::ColumnIndex<DB::Row>,
{
    let row = sqlx::query::<DB>(INSERT_CHECKPOINT_SQL)
        .bind(thread_id)
        .bind(created_at)
        .bind(node)
        .bind(step)
        .bind(state_json)
        .fetch_one(executor)
        .await
        .map_err(CheckpointSqlError::query)?;
    row.try_get::<i64, _>(0usize)
        .map_err(CheckpointSqlError::query)
}

/// Appends a checkpoint and returns its per-thread sequence number.
pub async fn save_checkpoint<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
    node: &str,
    step: i64,
    created_at: &str,
    state_json: &serde_json::Value,
) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    usize: sqlx::ColumnIndex<DB::Row>,
{
    let encoded = encode_state(state_json)?;
    insert_checkpoint(pool, thread_id, node, step, created_at, &encoded).await
}

pub async fn save_checkpoint_in_transaction<DB>(
    tx: &mut Transaction<'_, DB>,
    thread_id: &str,
    node: &str,
    step: i64,
    created_at: &str,
    state_json: &serde_json::Value,
) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    usize: sqlx::ColumnIndex<DB::Row>,
{
    let encoded = encode_state(state_json)?;
    insert_checkpoint(&mut **tx, thread_id, node, step, created_at, &encoded).await
}

/// Saves the checkpoint and, when enabled, rewrites the thread row and the
/// projected `messages` rows in the same transaction.
pub async fn save_checkpoint_with_projections<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
    node: &str,
    step: i64,
    created_at: &str,
    state_json: &serde_json::Value,
    enable_projections: bool,
) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
    for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    usize: sqlx::ColumnIndex<DB::Row>,
{
    if !enable_projections {
        return save_checkpoint(pool, thread_id, node, step, created_at, state_json).await;
    }

    let messages = history_messages(state_json)?;
    let mut tx = pool
        .begin()
        .await
        .map_err(|error| CheckpointSqlError::Connection(error.to_string()))?;

    let seq =
        save_checkpoint_in_transaction(&mut tx, thread_id, node, step, created_at, state_json)
            .await?;

    sqlx::query::<DB>(UPSERT_THREAD_SQL)
        .bind(thread_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| CheckpointSqlError::Projection(error.to_string()))?;
    write_messages(&mut tx, thread_id, created_at, &messages).await?;

    tx.commit().await.map_err(CheckpointSqlError::query)?;
    tracing::trace!(thread_id, seq, messages = messages.len(), "projected checkpoint");
    Ok(seq)
}

async fn write_messages<DB>(
    tx: &mut Transaction<'_, DB>,
    thread_id: &str,
    created_at: &str,
    messages: &[ProjectedMessage],
) -> Result<(), CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
{
    sqlx::query::<DB>(DELETE_MESSAGES_SQL)
        .bind(thread_id)
        .execute(&mut **tx)
        .await
        .map_err(|error| CheckpointSqlError::Projection(error.to_string()))?;

    for (index, message) in messages.iter().enumerate() {
        sqlx::query::<DB>(INSERT_MESSAGE_SQL)
            .bind(thread_id)
            .bind(index as i64 + 1)
            .bind(message.role.as_str())
            .bind(message.content.as_str())
            .bind(message.name.clone())
            .bind(created_at)
            .execute(&mut **tx)
            .await
            .map_err(|error| CheckpointSqlError::Projection(error.to_string()))?;
    }
    Ok(())
}

pub async fn load_latest_checkpoint<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
) -> Result<Option<StoredCheckpoint>, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
    for<'r> String: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    for<'r> Option<String>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    for<'r> Option<i64>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    &'static str: sqlx::ColumnIndex<DB::Row>,
{
    let Some(row) = sqlx::query::<DB>(SELECT_LATEST_CHECKPOINT_SQL)
        .bind(thread_id)
        .fetch_optional(pool)
        .await
        .map_err(CheckpointSqlError::query)?
    else {
        return Ok(None);
    };

    let raw_state: String = row.try_get("state_json").map_err(CheckpointSqlError::query)?;
    let state_json = serde_json::from_str(&raw_state)
        .map_err(|error| CheckpointSqlError::Serialization(error.to_string()))?;

    Ok(Some(StoredCheckpoint {
        thread_id: row.try_get("thread_id").map_err(CheckpointSqlError::query)?,
        seq: row.try_get("seq").map_err(CheckpointSqlError::query)?,
        created_at: row.try_get("created_at").map_err(CheckpointSqlError::query)?,
        node: row.try_get("node").map_err(CheckpointSqlError::query)?,
        step: row.try_get("step").map_err(CheckpointSqlError::query)?,
        state_json,
    }))
}

pub async fn list_checkpoints<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
) -> Result<Vec<StoredCheckpointMeta>, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: sqlx::Executor<'c, Database = DB>,
    for<'r> String: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    for<'r> Option<String>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    for<'r> Option<i64>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    &'static str: sqlx::ColumnIndex<DB::Row>,
{
    let rows = sqlx::query::<DB>(SELECT_CHECKPOINT_HISTORY_SQL)
        .bind(thread_id)
        .fetch_all(pool)
        .await
        .map_err(CheckpointSqlError::query)?;

    rows.iter()
        .map(|row| {
            Ok(StoredCheckpointMeta {
                seq: row.try_get("seq").map_err(CheckpointSqlError::query)?,
                created_at: row.try_get("created_at").map_err(CheckpointSqlError::query)?,
                node: row.try_get("node").map_err(CheckpointSqlError::query)?,
                step: row.try_get("step").map_err(CheckpointSqlError::query)?,
            })
        })
        .collect()
}
