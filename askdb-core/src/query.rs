use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Value;

/// A bindable query parameter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Converts a JSON value; arrays and objects are not bindable.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(flag) => Some(Scalar::Bool(*flag)),
            Value::Number(number) => number
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| number.as_f64().map(Scalar::Float)),
            Value::String(text) => Some(Scalar::Text(text.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(flag) => write!(f, "{flag}"),
            Scalar::Int(number) => write!(f, "{number}"),
            Scalar::Float(number) => write!(f, "{number}"),
            Scalar::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ExecutionResult {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Scalar>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub truncated: bool,
}

impl ExecutionResult {
    /// Builds a result from up to `max_rows + 1` fetched rows. The extra row
    /// only signals truncation and is dropped.
    pub fn from_fetched(
        sql: impl Into<String>,
        params: Vec<Scalar>,
        columns: Vec<String>,
        mut rows: Vec<Vec<Value>>,
        max_rows: usize,
    ) -> Self {
        let truncated = rows.len() > max_rows;
        rows.truncate(max_rows);
        Self {
            sql: sql.into(),
            params,
            columns,
            row_count: rows.len(),
            rows,
            truncated,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Syntax,
    Schema,
    Safety,
    Logic,
    Params,
    Style,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
