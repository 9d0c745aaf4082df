use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::GatewayError;

pub const DEFAULT_SCHEMA: &str = "public";

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, (is_nullable = 'YES') AS nullable, ordinal_position::int4 \
FROM information_schema.columns \
WHERE table_schema = $1 AND table_name = $2 \
ORDER BY ordinal_position";

const PRIMARY_KEY_SQL: &str = "SELECT kcu.column_name::text \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
  ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
ORDER BY kcu.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "SELECT kcu.column_name::text, ccu.table_schema::text, ccu.table_name::text, ccu.column_name::text \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
  ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
JOIN information_schema.constraint_column_usage ccu \
  ON ccu.constraint_name = tc.constraint_name AND ccu.constraint_schema = tc.table_schema \
WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
ORDER BY kcu.ordinal_position";

const INDEXES_SQL: &str = "SELECT i.relname::text AS index_name, ix.indisunique AS is_unique, \
  array_agg(a.attname::text ORDER BY k.ord) AS columns \
FROM pg_class t \
JOIN pg_namespace n ON n.oid = t.relnamespace \
JOIN pg_index ix ON ix.indrelid = t.oid \
JOIN pg_class i ON i.oid = ix.indexrelid \
JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
WHERE n.nspname = $1 AND t.relname = $2 \
GROUP BY i.relname, ix.indisunique \
ORDER BY i.relname";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub position: i32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    /// `schema.table.column`
    pub references: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
}

/// Splits `schema.table` on the first dot; bare names live in `public`.
pub fn split_table(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (schema, table),
        None => (DEFAULT_SCHEMA, name),
    }
}

#[async_trait::async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Describes the named tables, keyed by `schema.table`. Unknown tables are
    /// left out of the map.
    async fn introspect(
        &self,
        tables: &[String],
    ) -> Result<BTreeMap<String, TableInfo>, GatewayError>;
}

#[derive(Clone)]
pub struct PgIntrospector {
    pool: PgPool,
}

impl PgIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<TableInfo>, GatewayError> {
        let mut conn = self.pool.acquire().await.map_err(GatewayError::from_sqlx)?;

        let columns = sqlx::query(COLUMNS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(GatewayError::from_sqlx)?
            .iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    nullable: row.try_get(2)?,
                    position: row.try_get(3)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(GatewayError::from_sqlx)?;
        if columns.is_empty() {
            return Ok(None);
        }

        let primary_key = sqlx::query(PRIMARY_KEY_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(GatewayError::from_sqlx)?
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(GatewayError::from_sqlx)?;

        let foreign_keys = sqlx::query(FOREIGN_KEYS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(GatewayError::from_sqlx)?
            .iter()
            .map(|row| {
                let ref_schema: String = row.try_get(1)?;
                let ref_table: String = row.try_get(2)?;
                let ref_column: String = row.try_get(3)?;
                Ok(ForeignKey {
                    column: row.try_get(0)?,
                    references: format!("{ref_schema}.{ref_table}.{ref_column}"),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(GatewayError::from_sqlx)?;

        let indexes = sqlx::query(INDEXES_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&mut *conn)
            .await
            .map_err(GatewayError::from_sqlx)?
            .iter()
            .map(|row| {
                Ok(IndexInfo {
                    name: row.try_get(0)?,
                    unique: row.try_get(1)?,
                    columns: row.try_get(2)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(GatewayError::from_sqlx)?;

        Ok(Some(TableInfo {
            columns,
            primary_key,
            foreign_keys,
            indexes,
        }))
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for PgIntrospector {
    async fn introspect(
        &self,
        tables: &[String],
    ) -> Result<BTreeMap<String, TableInfo>, GatewayError> {
        let mut described = BTreeMap::new();
        for name in tables {
            let (schema, table) = split_table(name.trim());
            match self.describe_table(schema, table).await {
                Ok(Some(info)) => {
                    described.insert(format!("{schema}.{table}"), info);
                }
                Ok(None) => tracing::debug!(table = %name, "table not found"),
                Err(err) if err.is_connection() => return Err(err),
                Err(err) => tracing::warn!(table = %name, error = %err, "skipping table"),
            }
        }
        Ok(described)
    }
}
