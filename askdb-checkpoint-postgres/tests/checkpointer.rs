use std::time::{SystemTime, UNIX_EPOCH};

use askdb_checkpoint_postgres::PostgresCheckpointer;
use askdb_core::{Checkpoint, Checkpointer, GraphState, HistoryCheckpointer, StateSchema};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
struct DemoState {
    count: i32,
}

impl StateSchema for DemoState {
    type Update = Self;
    fn apply(_: &Self, update: Self) -> Self {
        update
    }
}

fn postgres_database_url() -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .expect("set DATABASE_URL to run postgres integration tests")
}

fn unique_thread_id(prefix: &str) -> String {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    format!("{prefix}-{nonce}")
}

#[test]
fn checkpointer_builder_accepts_pool_configuration() {
    let _builder = PostgresCheckpointer::builder("postgres://localhost/askdb")
        .max_connections(5)
        .min_connections(1)
        .enable_projections(true);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn checkpointer_trait_round_trip_save_and_load() {
    let checkpointer = PostgresCheckpointer::builder(postgres_database_url())
        .max_connections(5)
        .min_connections(1)
        .enable_projections(true)
        .build()
        .await
        .expect("postgres checkpointer should build");
    let thread_id = unique_thread_id("pg-roundtrip");

    for (step, count) in [(1, 1), (2, 2)] {
        let checkpoint = Checkpoint::new(
            thread_id.clone(),
            GraphState::new(DemoState { count }),
            step,
            "final".to_string(),
        );
        checkpointer.save(&checkpoint).await.expect("save");
    }

    let loaded: Checkpoint<DemoState> = checkpointer
        .load(&thread_id)
        .await
        .expect("load")
        .expect("checkpoint exists");
    assert_eq!(loaded.state.data.count, 2);
    assert_eq!(loaded.step, 2);

    let history = <PostgresCheckpointer as HistoryCheckpointer<DemoState>>::list_checkpoints(
        &checkpointer,
        &thread_id,
    )
    .await
    .expect("history");
    assert_eq!(history.len(), 2);
}
