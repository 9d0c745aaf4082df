use askdb_core::{AskError, ExecutionResult, Value};
use regex::Regex;

pub const SUMMARY_LIMIT: usize = 20;
pub const NO_RECORDS_ANSWER: &str = "I found no matching records.";
pub const NEUTRAL_ANSWER: &str =
    "I couldn't put that answer into plain words. Could you rephrase your question?";

const ARTIFACT_PATTERN: &str =
    r"(?i)\b(sql|query|queries|parameters?|params?|columns?|tables?)\b";
const PLACEHOLDER_PATTERN: &str = r":p\d+\b|\$\d+\b";

/// Keeps query internals out of the answer shown to users.
#[derive(Clone, Debug)]
pub struct AnswerGuard {
    artifact: Regex,
    placeholder: Regex,
}

impl AnswerGuard {
    pub fn new() -> Result<Self, AskError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|err| AskError::InvalidConfig(err.to_string()));
        Ok(Self {
            artifact: compile(ARTIFACT_PATTERN)?,
            placeholder: compile(PLACEHOLDER_PATTERN)?,
        })
    }

    pub fn leaks(&self, answer: &str, result: Option<&ExecutionResult>) -> bool {
        let sql = result.map_or("", |result| result.sql.trim());
        (!sql.is_empty() && answer.contains(sql))
            || self.placeholder.is_match(answer)
            || self.artifact.is_match(answer)
    }

    /// Returns a replacement when `answer` exposes query internals: a summary
    /// of `result` when there is one, a neutral reply otherwise.
    pub fn review(&self, answer: &str, result: Option<&ExecutionResult>) -> Option<String> {
        if !self.leaks(answer, result) {
            return None;
        }
        Some(result.map_or_else(|| NEUTRAL_ANSWER.to_string(), summarize))
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "(none)".to_string(),
        other => other.to_string(),
    }
}

/// Neutral answer built only from the first value of each row.
pub fn summarize(result: &ExecutionResult) -> String {
    let values: Vec<String> = result
        .rows
        .iter()
        .filter_map(|row| row.first())
        .map(cell_text)
        .collect();
    if values.is_empty() {
        return NO_RECORDS_ANSWER.to_string();
    }
    let shown = values.len().min(SUMMARY_LIMIT);
    let mut answer = format!("Here is what I found: {}", values[..shown].join(", "));
    let remaining = values.len() - shown;
    if remaining > 0 {
        answer.push_str(&format!(" and {remaining} more"));
    }
    answer.push('.');
    answer
}
