use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::StageError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Intent,
    Schema,
    SqlGen,
    Validate,
    Execute,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Intent,
        StageKind::Schema,
        StageKind::SqlGen,
        StageKind::Validate,
        StageKind::Execute,
    ];

    /// Node name in the pipeline graph and the `name` stamped on stage turns.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Intent => "intent",
            StageKind::Schema => "schema",
            StageKind::SqlGen => "sqlgen",
            StageKind::Validate => "validate",
            StageKind::Execute => "execute",
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            StageKind::Intent => "http://intent-agent:8001",
            StageKind::Schema => "http://schema-agent:8002",
            StageKind::SqlGen => "http://sql-gen-agent:8003",
            StageKind::Validate => "http://sql-validator-agent:8004",
            StageKind::Execute => "http://sql-executor-agent:8005",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = StageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|kind| kind.name() == value)
            .ok_or_else(|| StageError::Config(format!("unknown stage '{value}'")))
    }
}

/// A stage and the base URL it is served from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub endpoint: Url,
}

impl StageDescriptor {
    pub fn new(kind: StageKind, endpoint: &str) -> Result<Self, StageError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| StageError::Config(format!("invalid {kind} endpoint '{endpoint}': {err}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StageError::Config(format!(
                "{kind} endpoint must be http(s), got '{}'",
                endpoint.scheme()
            )));
        }
        Ok(Self { kind, endpoint })
    }

    pub fn messages_url(&self) -> String {
        format!("{}/messages", self.endpoint.as_str().trim_end_matches('/'))
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.endpoint.as_str().trim_end_matches('/'))
    }
}

/// One descriptor per stage kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageEndpoints {
    stages: [StageDescriptor; 5],
}

impl StageEndpoints {
    pub fn new(
        intent: &str,
        schema: &str,
        sqlgen: &str,
        validate: &str,
        execute: &str,
    ) -> Result<Self, StageError> {
        Ok(Self {
            stages: [
                StageDescriptor::new(StageKind::Intent, intent)?,
                StageDescriptor::new(StageKind::Schema, schema)?,
                StageDescriptor::new(StageKind::SqlGen, sqlgen)?,
                StageDescriptor::new(StageKind::Validate, validate)?,
                StageDescriptor::new(StageKind::Execute, execute)?,
            ],
        })
    }

    pub fn defaults() -> Result<Self, StageError> {
        Self::new(
            StageKind::Intent.default_endpoint(),
            StageKind::Schema.default_endpoint(),
            StageKind::SqlGen.default_endpoint(),
            StageKind::Validate.default_endpoint(),
            StageKind::Execute.default_endpoint(),
        )
    }

    pub fn get(&self, kind: StageKind) -> &StageDescriptor {
        // stored in `StageKind::ALL` order
        &self.stages[kind as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter()
    }
}
