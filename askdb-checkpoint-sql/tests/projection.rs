use askdb_checkpoint_sql::error::CheckpointSqlError;
use askdb_checkpoint_sql::migrations::run_migrations;
use askdb_checkpoint_sql::ops::save_checkpoint_with_projections;
use askdb_checkpoint_sql::projection::history_messages;
use sqlx::Row;

async fn sqlite_pool() -> sqlx::SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("sqlite in-memory pool should connect")
}

fn state_with_history() -> serde_json::Value {
    serde_json::json!({
        "data": {
            "messages": [],
            "history": [
                {"role": "human", "content": "Top 10 clients by revenue in 2025", "additional_kwargs": {}},
                {"role": "ai", "content": "Acme, Globex", "additional_kwargs": {}, "name": "final"}
            ],
            "rework_attempts": 0
        }
    })
}

#[tokio::test]
async fn projection_disabled_writes_only_canonical_checkpoint() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations");

    save_checkpoint_with_projections(
        &pool,
        "thread-a",
        "final",
        6,
        "2026-02-06T00:00:00Z",
        &state_with_history(),
        false,
    )
    .await
    .expect("checkpoint save should succeed");

    let checkpoints: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints")
        .fetch_one(&pool)
        .await
        .expect("count");
    let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!((checkpoints, messages), (1, 0));
}

#[tokio::test]
async fn projection_enabled_mirrors_history_into_messages() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations");

    for created_at in ["2026-02-06T00:00:00Z", "2026-02-06T00:00:05Z"] {
        save_checkpoint_with_projections(
            &pool,
            "thread-a",
            "final",
            6,
            created_at,
            &state_with_history(),
            true,
        )
        .await
        .expect("checkpoint save should succeed");
    }

    let rows = sqlx::query("SELECT seq, role, content, name FROM messages WHERE thread_id = ? ORDER BY seq")
        .bind("thread-a")
        .fetch_all(&pool)
        .await
        .expect("messages query");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<String, _>("role"), "human");
    assert_eq!(rows[1].get::<String, _>("content"), "Acme, Globex");
    assert_eq!(rows[1].get::<Option<String>, _>("name").as_deref(), Some("final"));
    assert_eq!(rows[0].get::<Option<String>, _>("name"), None);

    let updated_at: String = sqlx::query_scalar("SELECT updated_at FROM threads WHERE thread_id = ?")
        .bind("thread-a")
        .fetch_one(&pool)
        .await
        .expect("threads query");
    assert_eq!(updated_at, "2026-02-06T00:00:05Z");
}

#[tokio::test]
async fn malformed_history_fails_projection_without_writing() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations");

    let err = save_checkpoint_with_projections(
        &pool,
        "thread-a",
        "final",
        1,
        "2026-02-06T00:00:00Z",
        &serde_json::json!({"data": {"history": "oops"}}),
        true,
    )
    .await
    .expect_err("non-array history must fail");
    assert!(matches!(err, CheckpointSqlError::Projection(_)));

    let checkpoints: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(checkpoints, 0);
}

#[test]
fn history_without_role_is_rejected() {
    let err = history_messages(&serde_json::json!({"data": {"history": [{"content": "x"}]}}))
        .unwrap_err();
    assert_eq!(
        err,
        CheckpointSqlError::Projection("history[0] has no role".to_string())
    );
    assert!(history_messages(&serde_json::json!({"data": {}}))
        .unwrap()
        .is_empty());
}
