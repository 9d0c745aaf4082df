use askdb_graph::{
    Checkpoint, Checkpointer, FileCheckpointer, GraphState, HistoryCheckpointer, StateSchema,
};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
struct DemoState {
    count: i32,
}

impl StateSchema for DemoState {
    type Update = Self;
    fn apply(_: &Self, update: Self) -> Self {
        update
    }
}

fn checkpoint(thread_id: &str, count: i32, step: u64) -> Checkpoint<DemoState> {
    Checkpoint::new(
        thread_id.to_string(),
        GraphState::new(DemoState { count }),
        step,
        "final".to_string(),
    )
}

#[tokio::test]
async fn file_checkpointer_appends_and_loads_latest() {
    let dir = tempdir().unwrap();
    let checkpointer = FileCheckpointer::new(dir.path());

    checkpointer.save(&checkpoint("thread/1", 1, 1)).await.unwrap();
    checkpointer.save(&checkpoint("thread/1", 2, 2)).await.unwrap();

    let loaded: Checkpoint<DemoState> = checkpointer.load("thread/1").await.unwrap().unwrap();
    assert_eq!(loaded.state.data.count, 2);
    assert!(dir.path().join("thread_1.jsonl").exists());
}

#[tokio::test]
async fn file_checkpointer_lists_metadata() {
    let dir = tempdir().unwrap();
    let checkpointer = FileCheckpointer::new(dir.path());

    checkpointer.save(&checkpoint("thread-2", 1, 1)).await.unwrap();
    checkpointer.save(&checkpoint("thread-2", 2, 4)).await.unwrap();

    let history = <FileCheckpointer as HistoryCheckpointer<DemoState>>::list_checkpoints(
        &checkpointer,
        "thread-2",
    )
    .await
    .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].seq, 1);
    assert_eq!(history[1].seq, 2);
    assert_eq!(history[1].step, 4);
    assert!(!history[0].created_at.is_empty());
}

#[tokio::test]
async fn unsafe_thread_ids_map_to_a_stable_file() {
    let dir = tempdir().unwrap();
    let checkpointer = FileCheckpointer::new(dir.path());

    checkpointer.save(&checkpoint("///", 7, 1)).await.unwrap();
    let loaded: Checkpoint<DemoState> = checkpointer.load("///").await.unwrap().unwrap();
    assert_eq!(loaded.state.data.count, 7);

    let missing: Option<Checkpoint<DemoState>> = checkpointer.load("other").await.unwrap();
    assert!(missing.is_none());
}
