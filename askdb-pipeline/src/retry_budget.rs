use askdb_core::{ConversationTurn, Value};
use askdb_stage::{Decision, Route};

pub const MAX_ATTEMPTS: u32 = 3;

fn is_validator_failure(turn: &ConversationTurn) -> bool {
    if !turn.is_assistant() {
        return false;
    }
    let decision = turn.payload_str("decision");
    let shaped = matches!(decision, Some("pass") | Some("rework"))
        && turn.payload.get("issues").is_some_and(Value::is_array);
    let route = turn
        .payload_str("route")
        .unwrap_or(Route::SqlPipeline.as_str());
    shaped && decision == Some(Decision::Rework.as_str()) && route == Route::SqlPipeline.as_str()
}

/// Validator turns in `turns` that sent the query back for rework.
pub fn count_prior_failures(turns: &[ConversationTurn]) -> u32 {
    turns.iter().filter(|turn| is_validator_failure(turn)).count() as u32
}

/// Bounds the validate/sqlgen loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Current attempt number. The stored counter and the count read back
    /// from the turns should agree; the larger one wins when they do not.
    pub fn attempt(&self, counter: u32, turns: &[ConversationTurn]) -> u32 {
        let observed = count_prior_failures(turns);
        if observed != counter {
            tracing::warn!(counter, observed, "rework counter disagrees with conversation");
        }
        counter.max(observed) + 1
    }

    /// A failure on this attempt ends the loop instead of reworking.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
