use std::collections::BTreeMap;
use std::sync::Arc;

use askdb_core::{
    AskError, ConversationTurn, ExecutionResult, GraphState, IssueKind, Scalar, StateUpdate,
    ValidationIssue, Value,
};
use askdb_gateway::QueryReviewer;
use askdb_graph::{GraphContext, GraphNode};
use askdb_stage::plans::{SqlGenPlan, SqlValidatorPlan};
use askdb_stage::{
    Decision, Route, StageAdapter, StageDescriptor, StageError, StageKind, StageResult,
};

use crate::answer_guard::AnswerGuard;
use crate::retry_budget::RetryBudget;
use crate::{PipelineState, PipelineUpdate};

pub const EXHAUSTED_ANSWER: &str =
    "Sorry, I couldn't work out a reliable answer to that question. Could you rephrase it or narrow it down?";

async fn call_stage(
    adapter: &dyn StageAdapter,
    stage: &StageDescriptor,
    state: &PipelineState,
) -> Result<StageResult, AskError> {
    let result = adapter.call(stage, &state.conversation()).await?;
    if result.kind() != stage.kind {
        return Err(StageError::Malformed {
            stage: stage.kind,
            reason: format!("expected a {} result, got {}", stage.kind, result.kind()),
        }
        .into());
    }
    Ok(result)
}

fn stage_turn(result: &StageResult) -> Result<ConversationTurn, AskError> {
    let text = result.routing().direct_answer.unwrap_or_default();
    Ok(ConversationTurn::assistant(
        text,
        result.to_payload()?,
        result.kind().name(),
    ))
}

/// Forwards the conversation to one stage and appends its answer.
pub struct StageNode {
    adapter: Arc<dyn StageAdapter>,
    stage: StageDescriptor,
}

impl StageNode {
    pub fn new(adapter: Arc<dyn StageAdapter>, stage: StageDescriptor) -> Self {
        Self { adapter, stage }
    }
}

#[async_trait::async_trait]
impl GraphNode<PipelineState> for StageNode {
    async fn invoke_with_context(
        &self,
        state: GraphState<PipelineState>,
        context: &GraphContext,
    ) -> Result<StateUpdate<PipelineState>, AskError> {
        tracing::debug!(node = %context.node, step = context.step, "stage node");
        let result = call_stage(self.adapter.as_ref(), &self.stage, &state.data).await?;
        if let StageResult::Execute(plan) = &result {
            if let Some(error) = plan.error.as_deref().filter(|error| !error.trim().is_empty()) {
                tracing::debug!(error, "execution stage reported a failure");
                return Err(AskError::ExecutionFailed(error.to_string()));
            }
        }
        Ok(StateUpdate::new(PipelineUpdate::message(stage_turn(
            &result,
        )?)))
    }
}

/// Validation stage plus the local review and retry budget.
pub struct ValidateNode {
    adapter: Arc<dyn StageAdapter>,
    stage: StageDescriptor,
    reviewer: Option<QueryReviewer>,
    budget: RetryBudget,
}

impl ValidateNode {
    pub fn new(
        adapter: Arc<dyn StageAdapter>,
        stage: StageDescriptor,
        reviewer: Option<QueryReviewer>,
        budget: RetryBudget,
    ) -> Self {
        Self {
            adapter,
            stage,
            reviewer,
            budget,
        }
    }

    fn latest_generation(state: &PipelineState) -> Option<SqlGenPlan> {
        let turn = state.last_from(StageKind::SqlGen.name())?;
        serde_json::from_value(Value::Object(turn.payload.clone())).ok()
    }

    async fn review(&self, plan: &mut SqlValidatorPlan, state: &PipelineState) {
        let Some(reviewer) = &self.reviewer else {
            return;
        };
        let generation = Self::latest_generation(state);
        let sql = plan
            .validated_sql
            .clone()
            .or_else(|| generation.as_ref().and_then(|generated| generated.sql.clone()));
        let params: BTreeMap<String, Scalar> =
            generation.map(|generated| generated.params).unwrap_or_default();

        let issues = match sql {
            Some(sql) => reviewer.review(&sql, &params).await,
            None => vec![ValidationIssue::new(
                IssueKind::Logic,
                "No SQL was generated for the approved plan",
            )],
        };
        if issues.is_empty() {
            return;
        }

        for issue in &issues {
            let err = match issue.kind {
                IssueKind::Schema => AskError::SchemaMismatch(issue.message.clone()),
                IssueKind::Params => AskError::ParamInjectionRisk(issue.message.clone()),
                _ => AskError::ValidationRejected(issue.message.clone()),
            };
            tracing::info!(code = err.code(), "review overruled validation");
            tracing::debug!(error = %err, "review issue");
        }
        let feedback = issues
            .iter()
            .map(|issue| match &issue.hint {
                Some(hint) => format!("{} ({hint})", issue.message),
                None => issue.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        plan.decision = Decision::Rework;
        plan.route = Route::SqlPipeline;
        plan.feedback_for_sql_gen = Some(match plan.feedback_for_sql_gen.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}; {feedback}"),
            _ => feedback,
        });
        plan.issues.extend(issues);
    }
}

#[async_trait::async_trait]
impl GraphNode<PipelineState> for ValidateNode {
    async fn invoke_with_context(
        &self,
        state: GraphState<PipelineState>,
        context: &GraphContext,
    ) -> Result<StateUpdate<PipelineState>, AskError> {
        let state = &state.data;
        let attempt = self.budget.attempt(state.rework_attempts, &state.messages);
        tracing::debug!(node = %context.node, attempt, "validating");

        let mut plan = match call_stage(self.adapter.as_ref(), &self.stage, state).await? {
            StageResult::Validate(plan) => plan,
            other => {
                return Err(StageError::Malformed {
                    stage: self.stage.kind,
                    reason: format!("unexpected {} result", other.kind()),
                }
                .into())
            }
        };
        if plan.decision == Decision::Pass {
            self.review(&mut plan, state).await;
        }

        let mut update = PipelineUpdate::default();
        if plan.decision == Decision::Rework && plan.route == Route::SqlPipeline {
            update.rework_attempts = Some(attempt);
            if self.budget.is_exhausted(attempt) {
                let err = AskError::BudgetExhausted { attempts: attempt };
                tracing::warn!(code = err.code(), "{err}");
                plan.route = Route::DirectAnswer;
                plan.direct_answer = Some(EXHAUSTED_ANSWER.to_string());
            }
        }

        update
            .messages
            .push(stage_turn(&StageResult::Validate(plan))?);
        Ok(StateUpdate::new(update))
    }
}

/// Closes the run: guards the answer and records question and answer in
/// the durable history.
pub struct FinalNode {
    guard: AnswerGuard,
}

impl FinalNode {
    pub fn new(guard: AnswerGuard) -> Self {
        Self { guard }
    }
}

/// Result attached by the execution stage in this run, if any.
pub fn execution_result(state: &PipelineState) -> Option<ExecutionResult> {
    let turn = state.last_from(StageKind::Execute.name())?;
    let result = turn.payload.get("result")?;
    if result.is_null() {
        return None;
    }
    serde_json::from_value(result.clone()).ok()
}

#[async_trait::async_trait]
impl GraphNode<PipelineState> for FinalNode {
    async fn invoke_with_context(
        &self,
        state: GraphState<PipelineState>,
        _context: &GraphContext,
    ) -> Result<StateUpdate<PipelineState>, AskError> {
        let state = &state.data;
        let question = state
            .messages
            .first()
            .cloned()
            .ok_or_else(|| AskError::Custom("run has no question".to_string()))?;
        let mut answer = state
            .messages
            .last()
            .filter(|turn| turn.is_assistant())
            .cloned()
            .ok_or_else(|| AskError::Custom("run has no answer".to_string()))?;

        let mut update = PipelineUpdate::default();
        let result = execution_result(state);
        if let Some(replacement) = self.guard.review(&answer.text, result.as_ref()) {
            tracing::info!(has_result = result.is_some(), "final answer replaced");
            answer = ConversationTurn {
                text: replacement.clone(),
                ..answer
            }
            .with_entry("direct_answer", replacement);
            update.messages.push(answer.clone());
        }
        update.history = vec![question, answer];
        Ok(StateUpdate::new(update))
    }
}
