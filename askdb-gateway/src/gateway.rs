use std::collections::BTreeMap;
use std::sync::Arc;

use askdb_core::{ExecutionResult, Scalar};
use serde::{Deserialize, Serialize};

use crate::{
    GatewayError, InMemoryKnowledgeBase, QueryExecutor, QueryReviewer, QueryValidator,
    SchemaDoc, SchemaIntrospector, TableInfo,
};

pub const DEFAULT_MAX_ROWS: usize = 200;

/// Outcome of `validate_sql` in its wire shape: `{ok, sql}` or `{ok, error}`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SqlCheck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The tool surface stages use to look up schema knowledge and run queries.
#[derive(Clone)]
pub struct QueryGateway {
    validator: Arc<dyn QueryValidator>,
    executor: Option<Arc<dyn QueryExecutor>>,
    introspector: Option<Arc<dyn SchemaIntrospector>>,
    knowledge: InMemoryKnowledgeBase,
    max_rows: usize,
}

impl QueryGateway {
    pub fn new(validator: Arc<dyn QueryValidator>) -> Self {
        Self {
            validator,
            executor: None,
            introspector: None,
            knowledge: InMemoryKnowledgeBase::default(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_introspector(mut self, introspector: Arc<dyn SchemaIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    pub fn with_knowledge_base(mut self, knowledge: InMemoryKnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// A reviewer sharing this gateway's validator and introspector.
    pub fn reviewer(&self) -> Result<QueryReviewer, GatewayError> {
        QueryReviewer::new(self.validator.clone(), self.introspector.clone())
    }

    pub fn schema_search(&self, query: &str, k: usize, doc_type: Option<&str>) -> Vec<SchemaDoc> {
        self.knowledge.search(query, k, doc_type)
    }

    pub fn list_join_cards(&self, k: usize) -> Vec<SchemaDoc> {
        self.knowledge.join_cards(k)
    }

    pub async fn introspect_db(
        &self,
        tables: &[String],
    ) -> Result<BTreeMap<String, TableInfo>, GatewayError> {
        let introspector = self
            .introspector
            .as_ref()
            .ok_or_else(|| GatewayError::Config("no data store configured".to_string()))?;
        introspector.introspect(tables).await
    }

    pub fn validate_sql(&self, sql: &str) -> SqlCheck {
        match self.validator.validate(sql) {
            Ok(normalized) => SqlCheck {
                ok: true,
                sql: Some(normalized.into_inner()),
                error: None,
            },
            Err(rejection) => SqlCheck {
                ok: false,
                sql: None,
                error: Some(rejection.to_string()),
            },
        }
    }

    /// Validates and runs `sql`. `max_rows` is capped at the configured ceiling.
    pub async fn execute_sql(
        &self,
        sql: &str,
        params: &[Scalar],
        max_rows: Option<usize>,
    ) -> Result<ExecutionResult, GatewayError> {
        let normalized = self.validator.validate(sql).map_err(|rejection| {
            tracing::info!(reason = %rejection, "query rejected");
            GatewayError::Rejected(rejection)
        })?;
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| GatewayError::Config("no data store configured".to_string()))?;
        let max_rows = max_rows
            .unwrap_or(self.max_rows)
            .clamp(1, self.max_rows);
        executor.execute(&normalized, params, max_rows).await
    }
}
