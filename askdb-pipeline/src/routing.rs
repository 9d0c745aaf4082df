//! Where the pipeline goes next, decided from the latest assistant turn only.

use askdb_core::{ConversationTurn, GraphState, Payload};
use askdb_stage::{Decision, Route};

use crate::PipelineState;

pub const FINAL: &str = "final";
pub const SCHEMA: &str = "schema";
pub const SQLGEN: &str = "sqlgen";
pub const EXECUTE: &str = "execute";

fn route_of(payload: &Payload) -> Route {
    match payload.get("route").and_then(|value| value.as_str()) {
        Some(route) if route == Route::DirectAnswer.as_str() => Route::DirectAnswer,
        _ => Route::SqlPipeline,
    }
}

fn decision_of(payload: &Payload) -> Decision {
    match payload.get("decision").and_then(|value| value.as_str()) {
        None => Decision::Pass,
        Some(decision) if decision == Decision::Pass.as_str() => Decision::Pass,
        Some(_) => Decision::Rework,
    }
}

fn latest_payload(turns: &[ConversationTurn]) -> Payload {
    turns
        .iter()
        .rev()
        .find(|turn| turn.is_assistant())
        .map(|turn| turn.payload.clone())
        .unwrap_or_default()
}

/// `final` for a direct answer, `schema` otherwise.
pub fn after_intent(turns: &[ConversationTurn]) -> &'static str {
    match route_of(&latest_payload(turns)) {
        Route::DirectAnswer => FINAL,
        Route::SqlPipeline => SCHEMA,
    }
}

/// `execute` on pass, `sqlgen` for rework within the pipeline, `final`
/// when the validator sent the run to a direct answer.
pub fn after_validation(turns: &[ConversationTurn]) -> &'static str {
    let payload = latest_payload(turns);
    match (decision_of(&payload), route_of(&payload)) {
        (Decision::Pass, _) => EXECUTE,
        (Decision::Rework, Route::SqlPipeline) => SQLGEN,
        (Decision::Rework, Route::DirectAnswer) => FINAL,
    }
}

pub(crate) fn intent_router(state: &GraphState<PipelineState>) -> String {
    after_intent(&state.data.messages).to_string()
}

pub(crate) fn validation_router(state: &GraphState<PipelineState>) -> String {
    after_validation(&state.data.messages).to_string()
}
