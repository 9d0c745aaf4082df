use serde::{Deserialize, Deserializer, Serialize};

use crate::Value;

pub type Payload = serde_json::Map<String, Value>;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

/// One entry of a conversation, in the shape stages exchange over HTTP
/// (`role`, `content`, `additional_kwargs`, `name`).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(rename = "content", default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(
        rename = "additional_kwargs",
        default,
        deserialize_with = "null_as_default"
    )]
    pub payload: Payload,
    #[serde(
        rename = "name",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub label: Option<String>,
}

impl ConversationTurn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
            payload: Payload::new(),
            label: None,
        }
    }

    pub fn assistant(text: impl Into<String>, payload: Payload, label: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            payload,
            label: Some(label.into()),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|label| !label.is_empty()))
}
