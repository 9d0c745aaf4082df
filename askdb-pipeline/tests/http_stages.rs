use std::sync::Arc;

use askdb_pipeline::Coordinator;
use askdb_stage::{StageClient, StageEndpoints, StageKind};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoints(server: &MockServer) -> StageEndpoints {
    let base = server.uri();
    StageEndpoints::new(
        &format!("{base}/intent"),
        &format!("{base}/schema"),
        &format!("{base}/sqlgen"),
        &format!("{base}/validate"),
        &format!("{base}/execute"),
    )
    .unwrap()
}

#[tokio::test]
async fn direct_answer_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/intent/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "route": "direct_answer",
            "direct_answer": "I can answer questions about clients and revenue.",
            "task_type": "other",
            "output_format": "text",
            "needs_clarification": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(Arc::new(StageClient::new().unwrap()), endpoints(&server))
        .build()
        .unwrap();
    let reply = coordinator.chat("what can you do?", None).await;

    assert_eq!(reply.text, "I can answer questions about clients and revenue.");
    assert_eq!(reply.label.as_deref(), Some("final"));
}

#[tokio::test]
async fn stage_errors_become_apologies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/intent/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(Arc::new(StageClient::new().unwrap()), endpoints(&server))
        .build()
        .unwrap();
    let reply = coordinator.chat("anything", None).await;

    assert_eq!(reply.payload_str("error"), Some("stage_unreachable"));
    assert!(!reply.text.contains("boom"));
}

#[tokio::test]
async fn stage_health_reports_each_stage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/intent/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let coordinator = Coordinator::builder(Arc::new(StageClient::new().unwrap()), endpoints(&server))
        .build()
        .unwrap();
    let report = coordinator.stage_health().await;

    assert_eq!(report.len(), 5);
    assert_eq!(report[0].stage, StageKind::Intent);
    assert!(report[0].ok);
    assert!(report[1..].iter().all(|stage| !stage.ok && stage.error.is_some()));
}
