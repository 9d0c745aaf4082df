use std::fmt;

use regex::Regex;

use crate::GatewayError;

pub const MAX_SQL_CHARS: usize = 20_000;

const FORBIDDEN_PATTERN: &str = r"(?i)\b(insert|update|delete|merge|upsert|replace|drop|alter|truncate|create|grant|revoke|copy|call|do|execute|prepare|deallocate|vacuum|analyze|refresh|cluster|reindex|set|reset|show|listen|notify|pg_sleep|pg_read_file|pg_write_file|pg_ls_dir)\b";
const COMMENT_PATTERN: &str = r"--|/\*|\*/|#";
const READ_ONLY_START_PATTERN: &str = r"(?is)^\s*(?:select\b|with\b[\s\S]+?\bselect\b)";
const WILDCARD_PATTERN: &str = r"(?is)\bselect\s+(?:(?:distinct|all)\s+)?\*|\bselect\*";
const SYSTEM_SCHEMA_PATTERN: &str = r"(?i)\b(pg_catalog|information_schema|pg_toast)\b";
const PG_FUNCTION_PATTERN: &str = r"(?i)\bpg_[a-z0-9_]+\b";

/// Why a query was turned away. Display texts are returned to callers as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    MultipleStatements,
    Comment,
    NotReadOnly,
    ForbiddenKeyword,
    Wildcard,
    SystemSchema,
    PgFunction,
    ControlCharacter,
    TooLong,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Rejection::Empty => "Empty SQL.",
            Rejection::MultipleStatements => "Semicolons are not allowed.",
            Rejection::Comment => "SQL comments are not allowed.",
            Rejection::NotReadOnly => "Only SELECT queries (optionally with CTE/WITH) are allowed.",
            Rejection::ForbiddenKeyword => "Forbidden keyword or dangerous function detected.",
            Rejection::Wildcard => "SELECT * is not allowed.",
            Rejection::SystemSchema => "System schemas are not allowed.",
            Rejection::PgFunction => "pg_* functions are not allowed.",
            Rejection::ControlCharacter => "Control characters are not allowed.",
            Rejection::TooLong => "SQL too long.",
        };
        f.write_str(message)
    }
}

impl std::error::Error for Rejection {}

/// SQL text that passed a [`QueryValidator`]. Only validators in this crate
/// can construct one, so executors never see unchecked input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedSql(String);

impl NormalizedSql {
    pub(crate) fn new(sql: String) -> Self {
        Self(sql)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait QueryValidator: Send + Sync {
    fn validate(&self, raw: &str) -> Result<NormalizedSql, Rejection>;
}

/// Pattern-based gate for single read-only statements.
#[derive(Clone, Debug)]
pub struct LexicalValidator {
    strict_functions: bool,
    forbidden: Regex,
    comment: Regex,
    read_only_start: Regex,
    wildcard: Regex,
    system_schema: Regex,
    pg_function: Regex,
}

impl LexicalValidator {
    pub fn new(strict_functions: bool) -> Result<Self, GatewayError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|err| GatewayError::Config(err.to_string()));
        Ok(Self {
            strict_functions,
            forbidden: compile(FORBIDDEN_PATTERN)?,
            comment: compile(COMMENT_PATTERN)?,
            read_only_start: compile(READ_ONLY_START_PATTERN)?,
            wildcard: compile(WILDCARD_PATTERN)?,
            system_schema: compile(SYSTEM_SCHEMA_PATTERN)?,
            pg_function: compile(PG_FUNCTION_PATTERN)?,
        })
    }

    pub fn strict_functions(&self) -> bool {
        self.strict_functions
    }
}

fn strip_terminator(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(';') {
        Some(rest) => rest.trim_end(),
        None => trimmed,
    }
}

fn has_control_character(sql: &str) -> bool {
    sql.chars()
        .any(|c| (c as u32) < 32 && !matches!(c, '\t' | '\n' | '\r'))
}

impl QueryValidator for LexicalValidator {
    fn validate(&self, raw: &str) -> Result<NormalizedSql, Rejection> {
        if raw.trim().is_empty() {
            return Err(Rejection::Empty);
        }
        let sql = strip_terminator(raw);
        if sql.contains(';') {
            return Err(Rejection::MultipleStatements);
        }
        if self.comment.is_match(sql) {
            return Err(Rejection::Comment);
        }
        if !self.read_only_start.is_match(sql) {
            return Err(Rejection::NotReadOnly);
        }
        if self.forbidden.is_match(sql) {
            return Err(Rejection::ForbiddenKeyword);
        }
        if self.wildcard.is_match(sql) {
            return Err(Rejection::Wildcard);
        }
        if self.system_schema.is_match(sql) {
            return Err(Rejection::SystemSchema);
        }
        if self.strict_functions && self.pg_function.is_match(sql) {
            return Err(Rejection::PgFunction);
        }
        if has_control_character(sql) {
            return Err(Rejection::ControlCharacter);
        }
        if sql.chars().count() > MAX_SQL_CHARS {
            return Err(Rejection::TooLong);
        }
        Ok(NormalizedSql::new(sql.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> LexicalValidator {
        LexicalValidator::new(true).unwrap()
    }

    #[test]
    fn accepts_plain_select_and_strips_one_terminator() {
        let validator = strict();
        assert_eq!(validator.validate("SELECT 1").unwrap().as_str(), "SELECT 1");
        assert_eq!(validator.validate("  SELECT 1 ;  ").unwrap().as_str(), "SELECT 1");
    }

    #[test]
    fn revalidating_normalized_sql_is_stable() {
        let validator = strict();
        for raw in [
            "SELECT 1;",
            "  with t as (select a from x) select a from t  ",
            "SELECT name FROM clients WHERE id = :p1\n",
        ] {
            let first = validator.validate(raw).unwrap();
            let second = validator.validate(first.as_str()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn rejects_in_check_order() {
        let validator = strict();
        let cases = [
            ("   ", Rejection::Empty),
            ("SELECT a FROM t; SELECT b FROM t", Rejection::MultipleStatements),
            ("SELECT 1;;", Rejection::MultipleStatements),
            ("SELECT a FROM t -- hi", Rejection::Comment),
            ("SELECT a /* x */ FROM t", Rejection::Comment),
            ("SELECT a FROM t WHERE b = '#'", Rejection::Comment),
            ("EXPLAIN SELECT a FROM t", Rejection::NotReadOnly),
            ("DROP TABLE t", Rejection::NotReadOnly),
            ("WITH x AS (DELETE FROM t RETURNING a) SELECT a FROM x", Rejection::ForbiddenKeyword),
            ("SELECT pg_sleep(10)", Rejection::ForbiddenKeyword),
            ("SELECT * FROM t", Rejection::Wildcard),
            ("select distinct * from t", Rejection::Wildcard),
            ("SELECT table_name FROM information_schema.tables", Rejection::SystemSchema),
            ("SELECT pg_backend_pid()", Rejection::PgFunction),
            ("SELECT a FROM t WHERE b = 'x\u{7}'", Rejection::ControlCharacter),
        ];
        for (sql, expected) in cases {
            assert_eq!(validator.validate(sql), Err(expected), "{sql}");
        }
    }

    #[test]
    fn forbidden_keywords_match_whole_words_in_any_case() {
        let validator = strict();
        assert_eq!(
            validator.validate("select a from t where x in (select 1) UnIoN select 2 from y\nUPDATE"),
            Err(Rejection::ForbiddenKeyword)
        );
        assert!(validator
            .validate("SELECT updated_at, created_by FROM audit")
            .is_ok());
        assert!(validator.validate("SELECT a FROM t OFFSET 5").is_ok());
    }

    #[test]
    fn qualified_wildcards_are_allowed() {
        assert!(strict().validate("SELECT count(*) FROM t").is_ok());
        assert!(strict().validate("SELECT t.a, COUNT(*) AS n FROM t GROUP BY t.a").is_ok());
    }

    #[test]
    fn strict_mode_controls_pg_functions() {
        let lenient = LexicalValidator::new(false).unwrap();
        assert!(lenient.validate("SELECT pg_backend_pid()").is_ok());
        assert_eq!(
            lenient.validate("SELECT pg_read_file('x')"),
            Err(Rejection::ForbiddenKeyword)
        );
    }

    #[test]
    fn length_limit_counts_characters() {
        let validator = strict();
        let padding = "a".repeat(MAX_SQL_CHARS);
        let sql = format!("SELECT '{padding}'");
        assert_eq!(validator.validate(&sql), Err(Rejection::TooLong));
        let fits = format!("SELECT '{}'", "a".repeat(MAX_SQL_CHARS - 9));
        assert!(validator.validate(&fits).is_ok());
    }

    #[test]
    fn tabs_and_newlines_are_not_control_characters() {
        assert!(strict().validate("SELECT a\tFROM t\r\nWHERE b = 1").is_ok());
    }
}
