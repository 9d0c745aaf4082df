use askdb_checkpoint_sql::migrations::{run_migrations, run_migrations_in_transaction};
use askdb_checkpoint_sql::ops::{
    list_checkpoints, load_latest_checkpoint, save_checkpoint, save_checkpoint_in_transaction,
};

#[test]
#[allow(clippy::let_underscore_future)]
fn ops_api_accepts_postgres_pool_type() {
    fn assert_backend_agnostic<DB>(pool: &sqlx::Pool<DB>)
    where
        DB: sqlx::Database,
        for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
        for<'c> &'c sqlx::Pool<DB>: sqlx::Executor<'c, Database = DB>,
        for<'r> String: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        for<'r> Option<String>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        for<'r> Option<i64>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        &'static str: sqlx::ColumnIndex<DB::Row>,
        usize: sqlx::ColumnIndex<DB::Row>,
    {
        let _ = run_migrations(pool);
        let _ = save_checkpoint(
            pool,
            "thread-a",
            "intent",
            1,
            "2026-02-06T00:00:00Z",
            &serde_json::json!({"data": {}}),
        );
        let _ = load_latest_checkpoint(pool, "thread-a");
    }

    let _ = assert_backend_agnostic::<sqlx::Postgres> as fn(&sqlx::Pool<sqlx::Postgres>);
    let _ = assert_backend_agnostic::<sqlx::Sqlite> as fn(&sqlx::Pool<sqlx::Sqlite>);
}

async fn sqlite_pool() -> sqlx::SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("sqlite in-memory pool should connect")
}

const TABLE_COUNT_SQL: &str = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('checkpoints', 'threads', 'messages')";

#[tokio::test]
async fn ops_sqlite_migration_bootstrap_creates_tables() {
    let pool = sqlite_pool().await;

    run_migrations(&pool)
        .await
        .expect("migrations should bootstrap schema");
    run_migrations(&pool)
        .await
        .expect("migrations should be idempotent");

    let table_count: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("table count query should run");
    assert_eq!(table_count, 3);
}

#[tokio::test]
async fn ops_sqlite_migrations_can_run_in_transaction_context() {
    let pool = sqlite_pool().await;
    let mut tx = pool.begin().await.expect("transaction should begin");

    run_migrations_in_transaction(&mut tx)
        .await
        .expect("migrations should run inside transaction");
    let in_tx: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(tx.as_mut())
        .await
        .expect("count should run in transaction");
    assert_eq!(in_tx, 3);

    tx.rollback().await.expect("rollback should succeed");
    let after: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("count should run after rollback");
    assert_eq!(after, 0);
}

#[tokio::test]
async fn ops_sqlite_save_assigns_seq_per_thread() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations");

    let state = serde_json::json!({"data": {"rework_attempts": 0}});
    let first = save_checkpoint(&pool, "thread-a", "intent", 1, "2026-02-06T00:00:00Z", &state)
        .await
        .expect("first save");
    let second = save_checkpoint(&pool, "thread-a", "schema", 2, "2026-02-06T00:00:01Z", &state)
        .await
        .expect("second save");
    let other = save_checkpoint(&pool, "thread-b", "intent", 1, "2026-02-06T00:00:02Z", &state)
        .await
        .expect("other thread save");

    assert_eq!((first, second, other), (1, 2, 1));

    let history = list_checkpoints(&pool, "thread-a").await.expect("history");
    assert_eq!(history.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(history[1].node.as_deref(), Some("schema"));
}

#[tokio::test]
async fn ops_sqlite_save_helper_runs_inside_transaction() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations");

    let mut tx = pool.begin().await.expect("transaction should begin");
    let state = serde_json::json!({"data": {}});
    let first =
        save_checkpoint_in_transaction(&mut tx, "thread-a", "intent", 1, "2026-02-06T00:00:00Z", &state)
            .await
            .expect("first save in transaction");
    let second =
        save_checkpoint_in_transaction(&mut tx, "thread-a", "schema", 2, "2026-02-06T00:00:01Z", &state)
            .await
            .expect("second save in transaction");
    assert_eq!((first, second), (1, 2));

    tx.rollback().await.expect("rollback should succeed");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints")
        .fetch_one(&pool)
        .await
        .expect("count query");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn ops_sqlite_load_returns_latest_checkpoint_only() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations");

    save_checkpoint(&pool, "thread-a", "intent", 1, "2026-02-06T00:00:00Z", &serde_json::json!({"rev": 1}))
        .await
        .expect("first save");
    save_checkpoint(&pool, "thread-a", "final", 6, "2026-02-06T00:00:01Z", &serde_json::json!({"rev": 2}))
        .await
        .expect("second save");

    let latest = load_latest_checkpoint(&pool, "thread-a")
        .await
        .expect("load should succeed")
        .expect("latest checkpoint should exist");
    assert_eq!(latest.thread_id, "thread-a");
    assert_eq!(latest.seq, 2);
    assert_eq!(latest.node.as_deref(), Some("final"));
    assert_eq!(latest.step, Some(6));
    assert_eq!(latest.state_json, serde_json::json!({"rev": 2}));

    assert!(load_latest_checkpoint(&pool, "missing")
        .await
        .expect("load should succeed")
        .is_none());
}
