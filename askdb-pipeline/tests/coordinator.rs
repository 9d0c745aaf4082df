use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use askdb_core::{ConversationTurn, Value, DEFAULT_RETAINED_CHECKPOINTS};
use askdb_gateway::{LexicalValidator, QueryGateway};
use askdb_pipeline::answer_guard::NEUTRAL_ANSWER;
use askdb_pipeline::nodes::EXHAUSTED_ANSWER;
use askdb_pipeline::{Coordinator, APOLOGY_ANSWER};
use askdb_stage::{StageAdapter, StageDescriptor, StageEndpoints, StageError, StageKind, StageResult};
use serde_json::json;

const QUESTION: &str = "Top 10 clients by revenue in 2025";
const REVENUE_SQL: &str = "SELECT c.name, SUM(o.amount) AS revenue FROM clients c \
JOIN orders o ON o.client_id = c.id \
WHERE o.order_date >= :p1 AND o.order_date < :p2 \
GROUP BY c.name ORDER BY revenue DESC LIMIT 10";

#[derive(Default)]
struct ScriptedAdapter {
    scripts: Mutex<HashMap<StageKind, VecDeque<Value>>>,
    calls: Mutex<Vec<(StageKind, Vec<ConversationTurn>)>>,
}

impl ScriptedAdapter {
    fn script(self, kind: StageKind, body: Value) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(body);
        self
    }

    fn stages_called(&self) -> Vec<StageKind> {
        self.calls.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }

    fn turns_sent(&self, kind: StageKind) -> Vec<Vec<ConversationTurn>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| *called == kind)
            .map(|(_, turns)| turns.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl StageAdapter for ScriptedAdapter {
    async fn call(
        &self,
        stage: &StageDescriptor,
        turns: &[ConversationTurn],
    ) -> Result<StageResult, StageError> {
        self.calls
            .lock()
            .unwrap()
            .push((stage.kind, turns.to_vec()));
        let body = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&stage.kind)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| StageError::Transport {
                stage: stage.kind,
                reason: "connection refused".to_string(),
            })?;
        StageResult::parse(stage.kind, body)
    }
}

fn intent_sql() -> Value {
    json!({
        "route": "sql_pipeline",
        "task_type": "list",
        "metric": {"name": "revenue", "description": "sum of order amounts"},
        "dimensions": ["client"],
        "time": {"grain": "year", "range": {"start": "2025-01-01", "end": "2026-01-01"}},
        "sorting": {"field_hint": "revenue", "direction": "desc"},
        "limit": 10,
        "output_format": "table",
        "needs_clarification": false
    })
}

fn schema_plan() -> Value {
    json!({
        "primary_tables": ["clients", "orders"],
        "required_fields": [
            {"table": "clients", "column": "name", "role": "dimension"},
            {"table": "orders", "column": "amount", "role": "metric"},
            {"table": "orders", "column": "order_date", "role": "time"}
        ],
        "join_path": [{
            "left_table": "orders",
            "right_table": "clients",
            "join_type": "inner",
            "on": [{"left": "orders.client_id", "right": "clients.id"}]
        }],
        "needs_clarification": false
    })
}

fn sqlgen(sql: &str) -> Value {
    json!({
        "dialect": "postgresql",
        "sql": sql,
        "params": {"p1": "2025-01-01", "p2": "2026-01-01"}
    })
}

fn validator_pass(sql: &str) -> Value {
    json!({"decision": "pass", "validated_sql": sql, "issues": []})
}

fn validator_rework() -> Value {
    json!({
        "decision": "rework",
        "route": "sql_pipeline",
        "feedback_for_sql_gen": "join condition is wrong",
        "issues": [{"type": "logic", "message": "join condition is wrong"}]
    })
}

fn execution(answer: &str) -> Value {
    json!({
        "direct_answer": answer,
        "result": {
            "sql": REVENUE_SQL,
            "params": ["2025-01-01", "2026-01-01"],
            "columns": ["name", "revenue"],
            "rows": [["Acme", 1200.5], ["Globex", 980.0], ["Initech", 450.25]],
            "row_count": 3,
            "truncated": false
        }
    })
}

fn endpoints() -> StageEndpoints {
    StageEndpoints::defaults().unwrap()
}

fn coordinator(adapter: Arc<ScriptedAdapter>) -> Coordinator {
    let gateway = QueryGateway::new(Arc::new(LexicalValidator::new(true).unwrap()));
    Coordinator::builder(adapter, endpoints())
        .reviewer(gateway.reviewer().unwrap())
        .build()
        .unwrap()
}

fn assert_no_artifacts(answer: &str) {
    let lowered = answer.to_lowercase();
    for word in ["sql", "query", "column", "table", "param", ":p"] {
        assert!(!lowered.contains(word), "answer leaks '{word}': {answer}");
    }
}

#[tokio::test]
async fn answers_top_clients_through_the_full_pipeline() {
    let adapter = Arc::new(
        ScriptedAdapter::default()
            .script(StageKind::Intent, intent_sql())
            .script(StageKind::Schema, schema_plan())
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::Validate, validator_pass(REVENUE_SQL))
            .script(
                StageKind::Execute,
                execution("Your top clients in 2025 were Acme, Globex and Initech."),
            ),
    );
    let coordinator = coordinator(adapter.clone());

    let reply = coordinator
        .chat(QUESTION, Some("thread-e2e".to_string()))
        .await;

    assert_eq!(
        adapter.stages_called(),
        vec![
            StageKind::Intent,
            StageKind::Schema,
            StageKind::SqlGen,
            StageKind::Validate,
            StageKind::Execute
        ]
    );
    assert!(reply.is_assistant());
    assert!(reply.text.contains("Acme"));
    assert!(reply.text.contains("Globex"));
    assert_no_artifacts(&reply.text);
    assert_eq!(reply.payload_str("direct_answer"), Some(reply.text.as_str()));
    assert_eq!(reply.payload_str("thread_id"), Some("thread-e2e"));
    assert_eq!(reply.payload["result"]["row_count"], 3);
    assert!(reply.payload.get("error").is_none());

    let validated = &adapter.turns_sent(StageKind::Validate)[0];
    let generated = validated.last().unwrap();
    assert_eq!(generated.label.as_deref(), Some("sqlgen"));
    assert!(generated.payload_str("sql").unwrap().ends_with("LIMIT 10"));

    let history = coordinator.history("thread-e2e").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, QUESTION);
    assert_eq!(history[1].text, reply.text);
}

#[tokio::test]
async fn leaky_answers_are_replaced_with_a_summary() {
    let adapter = Arc::new(
        ScriptedAdapter::default()
            .script(StageKind::Intent, intent_sql())
            .script(StageKind::Schema, schema_plan())
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::Validate, validator_pass(REVENUE_SQL))
            .script(
                StageKind::Execute,
                execution("The query on the clients table returned Acme, Globex and Initech."),
            ),
    );
    let reply = coordinator(adapter).chat(QUESTION, None).await;

    assert_eq!(reply.text, "Here is what I found: Acme, Globex, Initech.");
    assert_eq!(reply.payload_str("direct_answer"), Some(reply.text.as_str()));
}

#[tokio::test]
async fn third_failed_validation_ends_with_a_direct_answer() {
    let adapter = Arc::new(
        ScriptedAdapter::default()
            .script(StageKind::Intent, intent_sql())
            .script(StageKind::Schema, schema_plan())
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::Validate, validator_rework())
            .script(StageKind::Validate, validator_rework())
            .script(StageKind::Validate, validator_rework())
            .script(StageKind::Validate, validator_rework()),
    );
    let reply = coordinator(adapter.clone())
        .chat(QUESTION, Some("thread-budget".to_string()))
        .await;

    let called = adapter.stages_called();
    let count = |kind: StageKind| called.iter().filter(|called| **called == kind).count();
    assert_eq!(count(StageKind::SqlGen), 3);
    assert_eq!(count(StageKind::Validate), 3);
    assert_eq!(count(StageKind::Execute), 0);
    assert_eq!(reply.text, EXHAUSTED_ANSWER);
    assert!(reply.payload.get("error").is_none());
}

#[tokio::test]
async fn review_sends_inline_literals_back_for_rework() {
    let inline = "SELECT c.name FROM clients c WHERE c.name = 'Acme' LIMIT 10";
    let adapter = Arc::new(
        ScriptedAdapter::default()
            .script(StageKind::Intent, intent_sql())
            .script(StageKind::Schema, schema_plan())
            .script(StageKind::SqlGen, json!({"sql": inline, "params": {}}))
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::Validate, validator_pass(inline))
            .script(StageKind::Validate, validator_pass(REVENUE_SQL))
            .script(StageKind::Execute, execution("Acme led 2025.")),
    );
    let reply = coordinator(adapter.clone()).chat(QUESTION, None).await;

    assert_eq!(reply.text, "Acme led 2025.");
    let retries = adapter.turns_sent(StageKind::SqlGen);
    assert_eq!(retries.len(), 2);
    let feedback = retries[1].last().unwrap();
    assert_eq!(feedback.label.as_deref(), Some("validate"));
    assert_eq!(feedback.payload_str("decision"), Some("rework"));
    assert_eq!(feedback.payload["issues"][0]["type"], "params");
}

#[tokio::test]
async fn direct_answers_skip_the_pipeline_and_build_history() {
    let greeting = json!({
        "route": "direct_answer",
        "direct_answer": "Hi! Ask me anything about your sales data.",
        "task_type": "other",
        "output_format": "text",
        "needs_clarification": false
    });
    let adapter = Arc::new(
        ScriptedAdapter::default()
            .script(StageKind::Intent, greeting.clone())
            .script(StageKind::Intent, greeting),
    );
    let coordinator = coordinator(adapter.clone());

    let first = coordinator.chat("hello", Some("thread-chat".into())).await;
    assert_eq!(first.text, "Hi! Ask me anything about your sales data.");
    let second = coordinator.chat("hello again", Some("thread-chat".into())).await;
    assert_eq!(second.text, first.text);

    assert_eq!(adapter.stages_called(), vec![StageKind::Intent, StageKind::Intent]);
    let sent = adapter.turns_sent(StageKind::Intent);
    assert_eq!(sent[0].len(), 1);
    assert_eq!(sent[1].len(), 3);
    assert_eq!(sent[1][0].text, "hello");

    let history = coordinator.history("thread-chat").await.unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn unreachable_stage_returns_an_apology_and_keeps_history() {
    let adapter = Arc::new(ScriptedAdapter::default().script(StageKind::Intent, intent_sql()));
    let coordinator = coordinator(adapter);

    let reply = coordinator.chat(QUESTION, Some("thread-down".into())).await;

    assert_eq!(reply.text, APOLOGY_ANSWER);
    assert_eq!(reply.payload_str("error"), Some("stage_unreachable"));
    assert_eq!(reply.payload_str("thread_id"), Some("thread-down"));
    assert!(coordinator.history("thread-down").await.unwrap().is_empty());
}

#[tokio::test]
async fn execute_stage_error_ends_in_an_apology() {
    let adapter = Arc::new(
        ScriptedAdapter::default()
            .script(StageKind::Intent, intent_sql())
            .script(StageKind::Schema, schema_plan())
            .script(StageKind::SqlGen, sqlgen(REVENUE_SQL))
            .script(StageKind::Validate, validator_pass(REVENUE_SQL))
            .script(
                StageKind::Execute,
                json!({
                    "direct_answer": "The query failed: column o.amount does not exist in table orders",
                    "error": "column o.amount does not exist"
                }),
            ),
    );
    let coordinator = coordinator(adapter.clone());

    let reply = coordinator.chat(QUESTION, Some("thread-exec".into())).await;

    assert_eq!(adapter.stages_called().last(), Some(&StageKind::Execute));
    assert_eq!(reply.text, APOLOGY_ANSWER);
    assert_eq!(reply.payload_str("error"), Some("execution_failed"));
    assert_eq!(reply.payload_str("direct_answer"), Some(APOLOGY_ANSWER));
    assert_no_artifacts(&reply.text);
    assert!(coordinator.history("thread-exec").await.unwrap().is_empty());
}

#[tokio::test]
async fn leaky_direct_answers_get_a_neutral_reply() {
    let adapter = Arc::new(ScriptedAdapter::default().script(
        StageKind::Intent,
        json!({
            "route": "direct_answer",
            "direct_answer": "I would run SELECT name FROM clients with :p1 bound to 2025.",
            "task_type": "other",
            "output_format": "text",
            "needs_clarification": false
        }),
    ));
    let reply = coordinator(adapter).chat(QUESTION, None).await;

    assert_eq!(reply.text, NEUTRAL_ANSWER);
    assert_no_artifacts(&reply.text);
}

/// Answers every intent call directly after a pause, recording what it saw.
struct SlowGreeter {
    seen: Mutex<Vec<Vec<ConversationTurn>>>,
}

#[async_trait::async_trait]
impl StageAdapter for SlowGreeter {
    async fn call(
        &self,
        stage: &StageDescriptor,
        turns: &[ConversationTurn],
    ) -> Result<StageResult, StageError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.seen.lock().unwrap().push(turns.to_vec());
        StageResult::parse(
            stage.kind,
            json!({
                "route": "direct_answer",
                "direct_answer": "Hello there.",
                "task_type": "other",
                "output_format": "text",
                "needs_clarification": false
            }),
        )
    }
}

#[tokio::test]
async fn concurrent_chats_on_one_thread_run_in_turn() {
    let adapter = Arc::new(SlowGreeter {
        seen: Mutex::new(Vec::new()),
    });
    let coordinator = Coordinator::builder(adapter.clone(), endpoints())
        .build()
        .unwrap();

    let (first, second) = tokio::join!(
        coordinator.chat("hello", Some("thread-race".into())),
        coordinator.chat("hello again", Some("thread-race".into())),
    );
    assert_eq!(first.text, "Hello there.");
    assert_eq!(second.text, "Hello there.");

    let seen = adapter.seen.lock().unwrap().clone();
    let lengths: Vec<usize> = seen.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![1, 3]);
    assert_eq!(seen[1][0].text, "hello");
    assert_eq!(seen[1][1].text, "Hello there.");

    let history = coordinator.history("thread-race").await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].text, "hello again");

    let checkpoints = coordinator.checkpoints("thread-race").await.unwrap();
    assert!(!checkpoints.is_empty());
    assert!(checkpoints.len() <= DEFAULT_RETAINED_CHECKPOINTS);
    assert_eq!(checkpoints.last().unwrap().node, "final");
}

#[tokio::test]
async fn missing_thread_id_starts_a_new_thread() {
    let adapter = Arc::new(ScriptedAdapter::default().script(
        StageKind::Intent,
        json!({
            "route": "direct_answer",
            "direct_answer": "Hello.",
            "task_type": "other",
            "output_format": "text",
            "needs_clarification": false
        }),
    ));
    let reply = coordinator(adapter).chat("hi", Some("  ".into())).await;
    let thread_id = reply.payload_str("thread_id").unwrap();
    assert_eq!(thread_id.len(), 36);
}

#[test]
fn only_the_rework_loop_is_cyclic() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let coordinator = coordinator(adapter);
    assert_eq!(
        coordinator.graph().program().cycles(),
        vec![vec!["sqlgen".to_string(), "validate".to_string()]]
    );
}
