use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use askdb_core::{
    AskError, CheckpointMetadata, Checkpointer, ConversationTurn, GraphState, HistoryCheckpointer,
    InMemoryCheckpointer, Payload, Value,
};
use askdb_gateway::QueryReviewer;
use askdb_graph::{
    ExecutableGraph, ExecutionConfig, ExecutionOptions, GraphBuilder, Observer, END,
};
use askdb_stage::{StageAdapter, StageEndpoints, StageKind};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::answer_guard::AnswerGuard;
use crate::nodes::{execution_result, FinalNode, StageNode, ValidateNode};
use crate::retry_budget::RetryBudget;
use crate::routing::{self, EXECUTE, FINAL, SCHEMA, SQLGEN};
use crate::PipelineState;

pub const APOLOGY_ANSWER: &str =
    "Sorry, something went wrong while answering your question. Please try again in a moment.";

/// Reachability of one stage.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StageHealth {
    pub stage: StageKind,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct CoordinatorBuilder {
    adapter: Arc<dyn StageAdapter>,
    endpoints: StageEndpoints,
    checkpointer: Option<(
        Arc<dyn Checkpointer<PipelineState>>,
        Arc<dyn HistoryCheckpointer<PipelineState>>,
    )>,
    reviewer: Option<QueryReviewer>,
    observer: Option<Arc<dyn Observer>>,
    config: ExecutionConfig,
    budget: RetryBudget,
}

impl CoordinatorBuilder {
    pub fn new(adapter: Arc<dyn StageAdapter>, endpoints: StageEndpoints) -> Self {
        Self {
            adapter,
            endpoints,
            checkpointer: None,
            reviewer: None,
            observer: None,
            config: ExecutionConfig::default(),
            budget: RetryBudget::default(),
        }
    }

    pub fn checkpointer<C>(mut self, checkpointer: Arc<C>) -> Self
    where
        C: Checkpointer<PipelineState> + HistoryCheckpointer<PipelineState> + 'static,
    {
        let lineage: Arc<dyn HistoryCheckpointer<PipelineState>> = checkpointer.clone();
        let checkpointer: Arc<dyn Checkpointer<PipelineState>> = checkpointer;
        self.checkpointer = Some((checkpointer, lineage));
        self
    }

    /// Re-checks every query the validation stage approves.
    pub fn reviewer(mut self, reviewer: QueryReviewer) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn execution_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_budget(mut self, budget: RetryBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn build(self) -> Result<Coordinator, AskError> {
        let (checkpointer, lineage) = match self.checkpointer {
            Some(stores) => stores,
            None => {
                let store = Arc::new(InMemoryCheckpointer::<PipelineState>::default());
                let lineage: Arc<dyn HistoryCheckpointer<PipelineState>> = store.clone();
                (store as Arc<dyn Checkpointer<PipelineState>>, lineage)
            }
        };
        let stage = |kind: StageKind| StageNode::new(self.adapter.clone(), self.endpoints.get(kind).clone());

        let mut builder = GraphBuilder::<PipelineState>::new()
            .add_node(StageKind::Intent.name(), stage(StageKind::Intent))
            .add_node(SCHEMA, stage(StageKind::Schema))
            .add_node(SQLGEN, stage(StageKind::SqlGen))
            .add_node(
                StageKind::Validate.name(),
                ValidateNode::new(
                    self.adapter.clone(),
                    self.endpoints.get(StageKind::Validate).clone(),
                    self.reviewer,
                    self.budget,
                ),
            )
            .add_node(EXECUTE, stage(StageKind::Execute))
            .add_node(FINAL, FinalNode::new(AnswerGuard::new()?))
            .set_entry(StageKind::Intent.name())
            .add_conditional_edges(
                StageKind::Intent.name(),
                routing::intent_router,
                &[(SCHEMA, SCHEMA), (FINAL, FINAL)],
            )
            .add_edge(SCHEMA, SQLGEN)
            .add_edge(SQLGEN, StageKind::Validate.name())
            .add_conditional_edges(
                StageKind::Validate.name(),
                routing::validation_router,
                &[(EXECUTE, EXECUTE), (SQLGEN, SQLGEN), (FINAL, FINAL)],
            )
            .add_edge(EXECUTE, FINAL)
            .add_edge(FINAL, END)
            .with_default_config(self.config)
            .with_checkpointer(checkpointer.clone());
        if let Some(observer) = self.observer {
            builder = builder.with_observer(observer);
        }
        let graph = builder.build().map_err(AskError::from)?;

        Ok(Coordinator {
            graph,
            checkpointer,
            lineage,
            adapter: self.adapter,
            endpoints: self.endpoints,
            locks: Mutex::new(HashMap::new()),
        })
    }
}

/// Runs one user turn through the stage graph and keeps per-thread history.
pub struct Coordinator {
    graph: ExecutableGraph<PipelineState>,
    checkpointer: Arc<dyn Checkpointer<PipelineState>>,
    lineage: Arc<dyn HistoryCheckpointer<PipelineState>>,
    adapter: Arc<dyn StageAdapter>,
    endpoints: StageEndpoints,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn builder(adapter: Arc<dyn StageAdapter>, endpoints: StageEndpoints) -> CoordinatorBuilder {
        CoordinatorBuilder::new(adapter, endpoints)
    }

    pub fn graph(&self) -> &ExecutableGraph<PipelineState> {
        &self.graph
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|id, lock| id == thread_id || Arc::strong_count(lock) > 1);
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Durable history of a thread, oldest first.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<ConversationTurn>, AskError> {
        Ok(self
            .checkpointer
            .load(thread_id)
            .await?
            .map(|checkpoint| checkpoint.state.data.history)
            .unwrap_or_default())
    }

    /// Checkpoints still retained for a thread, oldest first.
    pub async fn checkpoints(&self, thread_id: &str) -> Result<Vec<CheckpointMetadata>, AskError> {
        self.lineage.list_checkpoints(thread_id).await
    }

    /// Answers `content` within `thread_id`, or a fresh thread when none is
    /// given. Failures come back as an apology turn carrying an error code.
    pub async fn chat(&self, content: &str, thread_id: Option<String>) -> ConversationTurn {
        let thread_id = thread_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let started = Instant::now();

        let lock = self.thread_lock(&thread_id).await;
        let _guard = lock.lock().await;

        match self.run(content, &thread_id).await {
            Ok(state) => {
                tracing::info!(
                    thread_id = %thread_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "chat answered"
                );
                reply(&state, &thread_id)
            }
            Err(err) => {
                tracing::error!(thread_id = %thread_id, code = err.code(), error = %err, "chat failed");
                let mut payload = Payload::new();
                payload.insert("direct_answer".to_string(), Value::from(APOLOGY_ANSWER));
                payload.insert("error".to_string(), Value::from(err.code()));
                payload.insert("thread_id".to_string(), Value::from(thread_id));
                ConversationTurn::assistant(APOLOGY_ANSWER, payload, FINAL)
            }
        }
    }

    async fn run(&self, content: &str, thread_id: &str) -> Result<PipelineState, AskError> {
        let history = self.history(thread_id).await?;
        let state = GraphState::new(PipelineState::new_run(content, history));
        let finished = self
            .graph
            .invoke_graph_with_options(state, ExecutionOptions::for_thread(thread_id))
            .await
            .map_err(AskError::from)?;
        Ok(finished.data)
    }

    pub async fn stage_health(&self) -> Vec<StageHealth> {
        let mut report = Vec::with_capacity(StageKind::ALL.len());
        for stage in self.endpoints.iter() {
            let outcome = self.adapter.health(stage).await;
            report.push(StageHealth {
                stage: stage.kind,
                ok: outcome.is_ok(),
                error: outcome.err().map(|err| err.to_string()),
            });
        }
        report
    }
}

fn reply(state: &PipelineState, thread_id: &str) -> ConversationTurn {
    let answer = state
        .messages
        .last()
        .filter(|turn| turn.is_assistant())
        .map(|turn| turn.text.clone())
        .unwrap_or_default();
    let mut payload = Payload::new();
    payload.insert("direct_answer".to_string(), Value::from(answer.clone()));
    if let Some(result) = execution_result(state) {
        if let Ok(result) = serde_json::to_value(result) {
            payload.insert("result".to_string(), result);
        }
    }
    payload.insert("thread_id".to_string(), Value::from(thread_id));
    ConversationTurn::assistant(answer, payload, FINAL)
}
