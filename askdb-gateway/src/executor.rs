use std::time::{Duration, Instant};

use askdb_core::{ExecutionResult, Scalar, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Postgres, Row, TypeInfo, ValueRef};

use crate::params::bind_placeholders;
use crate::{GatewayError, NormalizedSql};

pub const MIN_STATEMENT_TIMEOUT_MS: u64 = 100;
pub const MAX_STATEMENT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 8_000;

pub fn clamp_timeout_ms(ms: u64) -> u64 {
    ms.clamp(MIN_STATEMENT_TIMEOUT_MS, MAX_STATEMENT_TIMEOUT_MS)
}

/// Runs one validated statement and returns at most `max_rows` rows.
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        sql: &NormalizedSql,
        params: &[Scalar],
        max_rows: usize,
    ) -> Result<ExecutionResult, GatewayError>;
}

#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(MAX_STATEMENT_TIMEOUT_MS);
        self.statement_timeout_ms = clamp_timeout_ms(ms);
        self
    }

    pub fn statement_timeout_ms(&self) -> u64 {
        self.statement_timeout_ms
    }
}

#[async_trait::async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(
        &self,
        sql: &NormalizedSql,
        params: &[Scalar],
        max_rows: usize,
    ) -> Result<ExecutionResult, GatewayError> {
        let started = Instant::now();
        let bound = bind_placeholders(sql.as_str(), params)?;
        tracing::debug!(sql = %bound.sql, params = ?bound.params, max_rows, "executing query");

        let mut tx = self.pool.begin().await.map_err(GatewayError::from_sqlx)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(GatewayError::from_sqlx)?;
        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(GatewayError::from_sqlx)?;

        let mut fetched: Vec<PgRow> = Vec::new();
        {
            let query = bound
                .params
                .iter()
                .fold(sqlx::query(&bound.sql), bind_scalar);
            let mut stream = query.fetch(&mut *tx);
            while fetched.len() <= max_rows {
                match stream.try_next().await.map_err(GatewayError::from_sqlx)? {
                    Some(row) => fetched.push(row),
                    None => break,
                }
            }
        }

        let columns = match fetched.first() {
            Some(row) => row
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect(),
            None => (&mut *tx)
                .describe(&bound.sql)
                .await
                .map_err(GatewayError::from_sqlx)?
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect(),
        };

        let rows = fetched
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(GatewayError::from_sqlx)?;

        tx.rollback().await.map_err(GatewayError::from_sqlx)?;

        let result = ExecutionResult::from_fetched(
            sql.as_str(),
            params.to_vec(),
            columns,
            rows,
            max_rows,
        );
        tracing::info!(
            rows = result.row_count,
            truncated = result.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query executed"
        );
        Ok(result)
    }
}

fn bind_scalar<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Scalar,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Scalar::Null => query.bind(Option::<String>::None),
        Scalar::Bool(flag) => query.bind(*flag),
        Scalar::Int(number) => query.bind(*number),
        Scalar::Float(number) => query.bind(*number),
        Scalar::Text(text) => match temporal_param(text) {
            Some(Temporal::Date(date)) => query.bind(date),
            Some(Temporal::DateTime(at)) => query.bind(at),
            Some(Temporal::Timestamp(at)) => query.bind(at),
            None => query.bind(text.clone()),
        },
    }
}

enum Temporal {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Timestamp(NaiveDateTime),
}

/// Postgres will not compare a `text` parameter with a date column, so
/// ISO-8601 looking values are bound with a temporal type instead.
fn temporal_param(text: &str) -> Option<Temporal> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Temporal::Date(date));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(Temporal::DateTime(at.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(Temporal::Timestamp)
}

fn decode_row(row: &PgRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.columns().len())
        .map(|index| decode_cell(row, index))
        .collect()
}

fn decode_cell(row: &PgRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => Value::from(row.try_get::<bool, _>(index)?),
        "INT2" => Value::from(row.try_get::<i16, _>(index)?),
        "INT4" => Value::from(row.try_get::<i32, _>(index)?),
        "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "FLOAT4" => Value::from(row.try_get::<f32, _>(index)?),
        "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
        "NUMERIC" => decimal_value(row.try_get::<Decimal, _>(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" => {
            Value::from(row.try_get::<String, _>(index)?)
        }
        "DATE" => Value::from(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIMESTAMP" => Value::from(
            row.try_get::<NaiveDateTime, _>(index)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        "TIMESTAMPTZ" => Value::from(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "TIME" => Value::from(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "UUID" => Value::from(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => Value::from(row.try_get::<Vec<String>, _>(index)?),
        "INT4[]" => Value::from(row.try_get::<Vec<i32>, _>(index)?),
        "INT8[]" => Value::from(row.try_get::<Vec<i64>, _>(index)?),
        "FLOAT8[]" => Value::from(row.try_get::<Vec<f64>, _>(index)?),
        "NUMERIC[]" => Value::Array(
            row.try_get::<Vec<Decimal>, _>(index)?
                .into_iter()
                .map(decimal_value)
                .collect(),
        ),
        other => {
            tracing::warn!(column = index, type_name = other, "unsupported column type, returning null");
            Value::Null
        }
    };
    Ok(value)
}

fn decimal_value(decimal: Decimal) -> Value {
    if decimal.scale() == 0 {
        if let Some(number) = decimal.to_i64() {
            return Value::from(number);
        }
    }
    decimal
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(decimal.to_string()))
}
