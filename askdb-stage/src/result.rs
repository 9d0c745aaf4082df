use askdb_core::{Payload, Value};
use serde::{Deserialize, Serialize};

use crate::plans::{ExecutionPlan, IntentSpec, SchemaPlan, SqlGenPlan, SqlValidatorPlan};
use crate::{StageError, StageKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    #[default]
    SqlPipeline,
    DirectAnswer,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::SqlPipeline => "sql_pipeline",
            Route::DirectAnswer => "direct_answer",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Pass,
    Rework,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Pass => "pass",
            Decision::Rework => "rework",
        }
    }
}

/// The fields routing looks at, regardless of which stage produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingView {
    pub route: Option<Route>,
    pub decision: Option<Decision>,
    pub direct_answer: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageResult {
    Intent(IntentSpec),
    Schema(SchemaPlan),
    SqlGen(SqlGenPlan),
    Validate(SqlValidatorPlan),
    Execute(ExecutionPlan),
}

impl StageResult {
    /// Parses a stage response body into the shape `kind` promises.
    pub fn parse(kind: StageKind, body: Value) -> Result<Self, StageError> {
        if !body.is_object() {
            return Err(StageError::Malformed {
                stage: kind,
                reason: "expected a JSON object".to_string(),
            });
        }
        let malformed = |err: serde_json::Error| StageError::Malformed {
            stage: kind,
            reason: err.to_string(),
        };
        Ok(match kind {
            StageKind::Intent => StageResult::Intent(serde_json::from_value(body).map_err(malformed)?),
            StageKind::Schema => StageResult::Schema(serde_json::from_value(body).map_err(malformed)?),
            StageKind::SqlGen => StageResult::SqlGen(serde_json::from_value(body).map_err(malformed)?),
            StageKind::Validate => {
                StageResult::Validate(serde_json::from_value(body).map_err(malformed)?)
            }
            StageKind::Execute => {
                StageResult::Execute(serde_json::from_value(body).map_err(malformed)?)
            }
        })
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageResult::Intent(_) => StageKind::Intent,
            StageResult::Schema(_) => StageKind::Schema,
            StageResult::SqlGen(_) => StageKind::SqlGen,
            StageResult::Validate(_) => StageKind::Validate,
            StageResult::Execute(_) => StageKind::Execute,
        }
    }

    pub fn routing(&self) -> RoutingView {
        match self {
            StageResult::Intent(intent) => RoutingView {
                route: Some(intent.route),
                decision: None,
                direct_answer: intent.direct_answer.clone(),
            },
            StageResult::Validate(plan) => RoutingView {
                route: Some(plan.route),
                decision: Some(plan.decision),
                direct_answer: plan.direct_answer.clone(),
            },
            StageResult::Execute(plan) => RoutingView {
                route: None,
                decision: None,
                direct_answer: Some(plan.direct_answer.clone()),
            },
            StageResult::Schema(_) | StageResult::SqlGen(_) => RoutingView::default(),
        }
    }

    /// Serialized form stored as a turn's `additional_kwargs`.
    pub fn to_payload(&self) -> Result<Payload, StageError> {
        let value = match self {
            StageResult::Intent(intent) => serde_json::to_value(intent),
            StageResult::Schema(plan) => serde_json::to_value(plan),
            StageResult::SqlGen(plan) => serde_json::to_value(plan),
            StageResult::Validate(plan) => serde_json::to_value(plan),
            StageResult::Execute(plan) => serde_json::to_value(plan),
        }
        .map_err(|err| StageError::Malformed {
            stage: self.kind(),
            reason: err.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(StageError::Malformed {
                stage: self.kind(),
                reason: "result did not serialize to an object".to_string(),
            }),
        }
    }
}
