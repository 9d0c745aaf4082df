//! Read-only query gateway over PostgreSQL.
//!
//! Every statement passes a [`QueryValidator`] before it can reach a
//! [`QueryExecutor`]; caller values only ever travel as bound parameters.

mod error;
mod executor;
mod gateway;
mod introspect;
mod kb;
pub mod params;
mod review;
mod validator;

pub use error::GatewayError;
pub use executor::{
    clamp_timeout_ms, PgExecutor, QueryExecutor, DEFAULT_STATEMENT_TIMEOUT_MS,
    MAX_STATEMENT_TIMEOUT_MS, MIN_STATEMENT_TIMEOUT_MS,
};
pub use gateway::{QueryGateway, SqlCheck, DEFAULT_MAX_ROWS};
pub use introspect::{
    split_table, ColumnInfo, ForeignKey, IndexInfo, PgIntrospector, SchemaIntrospector,
    TableInfo, DEFAULT_SCHEMA,
};
pub use kb::{InMemoryKnowledgeBase, SchemaDoc, JOIN_CARD};
pub use review::{QueryReviewer, MAX_LIMIT, MAX_OFFSET};
pub use validator::{LexicalValidator, NormalizedSql, QueryValidator, Rejection, MAX_SQL_CHARS};
