use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use askdb_gateway::{clamp_timeout_ms, DEFAULT_MAX_ROWS, DEFAULT_STATEMENT_TIMEOUT_MS};
use askdb_stage::{StageEndpoints, StageError, StageKind};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::CheckpointBackend;

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Server settings, read from flags or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "askdb-server", version, about = "Natural-language analytics over PostgreSQL")]
pub struct Config {
    #[arg(long, env = "ASKDB_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Data store DSN; the query tools are disabled without one.
    #[arg(long, env = "DB_DSN", hide_env_values = true)]
    pub db_dsn: Option<String>,

    /// `memory`, `file://<dir>`, `sqlite:<path>` or `postgres://...`.
    #[arg(long, env = "CHECKPOINT_URL", default_value = "memory", hide_env_values = true)]
    pub checkpoint: CheckpointBackend,

    #[arg(
        long,
        env = "STRICT_PG_FUNCS",
        default_value = "true",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub strict_pg_funcs: bool,

    #[arg(long, env = "QUERY_TIMEOUT_MS", default_value_t = DEFAULT_STATEMENT_TIMEOUT_MS)]
    pub query_timeout_ms: u64,

    /// Row ceiling for `execute_sql`.
    #[arg(long, env = "MAX_ROWS", default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    #[arg(long, env = "INTENT_URL", default_value = "http://intent-agent:8001")]
    pub intent_url: String,

    #[arg(long, env = "SCHEMA_URL", default_value = "http://schema-agent:8002")]
    pub schema_url: String,

    #[arg(long, env = "SQLGEN_URL", default_value = "http://sql-gen-agent:8003")]
    pub sqlgen_url: String,

    #[arg(long, env = "VALIDATOR_URL", default_value = "http://sql-validator-agent:8004")]
    pub validator_url: String,

    #[arg(long, env = "EXECUTOR_URL", default_value = "http://sql-executor-agent:8005")]
    pub executor_url: String,

    /// Bearer token sent to every stage.
    #[arg(long, env = "AGENT_API_TOKEN", hide_env_values = true)]
    pub agent_api_token: Option<String>,

    /// JSON file with schema knowledge documents.
    #[arg(long, env = "SCHEMA_KB_PATH")]
    pub schema_kb_path: Option<PathBuf>,

    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl Config {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(clamp_timeout_ms(self.query_timeout_ms))
    }

    pub fn stage_endpoints(&self) -> Result<StageEndpoints, StageError> {
        StageEndpoints::new(
            &self.intent_url,
            &self.schema_url,
            &self.sqlgen_url,
            &self.validator_url,
            &self.executor_url,
        )
    }

    pub fn stage_url(&self, kind: StageKind) -> &str {
        match kind {
            StageKind::Intent => &self.intent_url,
            StageKind::Schema => &self.schema_url,
            StageKind::SqlGen => &self.sqlgen_url,
            StageKind::Validate => &self.validator_url,
            StageKind::Execute => &self.executor_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::try_parse_from(["askdb-server"]).unwrap();
        assert_eq!(config.bind, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert!(config.strict_pg_funcs);
        assert_eq!(config.query_timeout_ms, 8_000);
        assert_eq!(config.max_rows, 200);
        assert_eq!(config.max_body_bytes, 1_048_576);
        assert_eq!(config.checkpoint, CheckpointBackend::Memory);
        assert_eq!(config.stage_url(StageKind::Execute), "http://sql-executor-agent:8005");
        assert!(config.stage_endpoints().is_ok());
    }

    #[test]
    fn strict_functions_accept_boolish_values() {
        let config =
            Config::try_parse_from(["askdb-server", "--strict-pg-funcs", "0"]).unwrap();
        assert!(!config.strict_pg_funcs);
    }

    #[test]
    fn statement_timeout_is_clamped() {
        let config =
            Config::try_parse_from(["askdb-server", "--query-timeout-ms", "5"]).unwrap();
        assert_eq!(config.statement_timeout(), Duration::from_millis(100));
    }
}
