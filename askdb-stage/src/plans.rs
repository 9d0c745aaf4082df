//! Structured results returned by each stage.

use std::collections::BTreeMap;

use askdb_core::{ExecutionResult, Scalar, ValidationIssue, Value};
use serde::{Deserialize, Serialize};

use crate::result::{Decision, Route};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Aggregation,
    List,
    Comparison,
    Trend,
    Distribution,
    ExistenceCheck,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Table,
    SingleValue,
    Chart,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "like")]
    Like,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field_hint: String,
    pub operator: FilterOperator,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrain {
    Day,
    Week,
    Month,
    Quarter,
    Year,
    None,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSpec {
    pub grain: TimeGrain,
    pub range: TimeRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sorting {
    pub field_hint: String,
    pub direction: SortDirection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentSpec {
    #[serde(default)]
    pub route: Route,
    #[serde(default)]
    pub direct_answer: Option<String>,
    pub task_type: TaskType,
    #[serde(default)]
    pub metric: Option<Metric>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub time: Option<TimeSpec>,
    #[serde(default)]
    pub sorting: Option<Sorting>,
    #[serde(default)]
    pub limit: Option<u32>,
    pub output_format: OutputFormat,
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Metric,
    Dimension,
    Filter,
    Time,
    Sort,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub table: String,
    pub column: String,
    pub role: FieldRole,
    #[serde(default)]
    pub semantic_hint: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinEdge {
    pub left_table: String,
    pub right_table: String,
    #[serde(default)]
    pub join_type: JoinType,
    #[serde(default)]
    pub on: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_confidence() -> f64 {
    0.7
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterMapping {
    pub original_field_hint: String,
    #[serde(default)]
    pub mapped_table: Option<String>,
    #[serde(default)]
    pub mapped_column: Option<String>,
    pub operator: FilterOperator,
    pub value: Value,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationPlan {
    pub metric_expression_hint: String,
    #[serde(default)]
    pub group_by_hints: Vec<String>,
    #[serde(default)]
    pub time_bucket_hint: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaPlan {
    #[serde(default)]
    pub primary_tables: Vec<String>,
    #[serde(default)]
    pub required_fields: Vec<FieldRef>,
    #[serde(default)]
    pub join_path: Vec<JoinEdge>,
    #[serde(default)]
    pub filter_mappings: Vec<FilterMapping>,
    #[serde(default)]
    pub aggregation: Option<AggregationPlan>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
}

impl SchemaPlan {
    /// Every table the plan touches, deduplicated and in first-seen order.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        let candidates = self
            .primary_tables
            .iter()
            .chain(self.required_fields.iter().map(|field| &field.table))
            .chain(
                self.join_path
                    .iter()
                    .flat_map(|edge| [&edge.left_table, &edge.right_table]),
            );
        for table in candidates {
            if !table.is_empty() && !tables.contains(table) {
                tables.push(table.clone());
            }
        }
        tables
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgresql,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlGenPlan {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
    #[serde(default)]
    pub raw_model_output: Option<String>,
}

impl SqlGenPlan {
    /// Parameters ordered by placeholder index (`p1`, `p2`, …). Returns the
    /// first key that is not of the `pN` form as an error.
    pub fn positional_params(&self) -> Result<Vec<Scalar>, String> {
        let mut indexed = Vec::with_capacity(self.params.len());
        for (key, value) in &self.params {
            let index = key
                .strip_prefix('p')
                .and_then(|digits| digits.parse::<usize>().ok())
                .filter(|index| *index > 0)
                .ok_or_else(|| key.clone())?;
            indexed.push((index, value.clone()));
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, value)| value).collect())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqlValidatorPlan {
    #[serde(default)]
    pub route: Route,
    #[serde(default)]
    pub direct_answer: Option<String>,
    pub decision: Decision,
    #[serde(default)]
    pub validated_sql: Option<String>,
    #[serde(default)]
    pub feedback_for_sql_gen: Option<String>,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub raw_model_output: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub direct_answer: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<ExecutionResult>,
}
