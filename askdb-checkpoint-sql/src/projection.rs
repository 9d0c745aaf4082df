use serde_json::Value;

use crate::error::CheckpointSqlError;

/// One durable conversation turn as written to the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedMessage {
    pub role: String,
    pub content: String,
    pub name: Option<String>,
}

/// Extracts `data.history` from a serialized graph state. States without a
/// history project to nothing.
pub fn history_messages(state_json: &Value) -> Result<Vec<ProjectedMessage>, CheckpointSqlError> {
    let Some(history) = state_json.pointer("/data/history") else {
        return Ok(Vec::new());
    };
    let Some(entries) = history.as_array() else {
        return Err(CheckpointSqlError::Projection(
            "history is not an array".to_string(),
        ));
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let role = entry
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    CheckpointSqlError::Projection(format!("history[{index}] has no role"))
                })?;
            let content = entry
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            Ok(ProjectedMessage {
                role: role.to_string(),
                content: content.to_string(),
                name,
            })
        })
        .collect()
}
