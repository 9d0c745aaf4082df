use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use askdb_core::{IssueKind, Scalar, ValidationIssue};
use regex::Regex;

use crate::introspect::split_table;
use crate::params::{placeholders, Placeholder};
use crate::{GatewayError, QueryValidator, SchemaIntrospector};

pub const MAX_LIMIT: u64 = 1_000;
pub const MAX_OFFSET: u64 = 10_000;

const STRING_PREDICATE_PATTERN: &str =
    r"(?i)(?:<>|!=|<=|>=|=|<|>|\blike|\bilike|\bin\s*\()\s*'";
const NUMERIC_EQUALITY_PATTERN: &str = r"(?:<>|!=|=)\s*-?\d+(?:\.\d+)?\b";
const LIMIT_PATTERN: &str = r"(?i)\blimit\s+(\d+)";
const OFFSET_PATTERN: &str = r"(?i)\boffset\s+(\d+)";
const TABLE_REF_PATTERN: &str = concat!(
    r"(?i)\b(?:from|join)\s+(?:(?:lateral|only)\s+)?",
    r"([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)"
);
const CTE_NAME_PATTERN: &str = r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+as\s*\(";

/// Keywords that may follow FROM/JOIN without naming a table.
const FROM_KEYWORDS: [&str; 2] = ["lateral", "only"];

/// Functions whose argument syntax uses `FROM` without naming a table.
const FROM_FUNCTIONS: [&str; 5] = ["extract", "substring", "trim", "overlay", "position"];

const INLINE_LITERAL_MESSAGE: &str =
    "Potential SQL injection risk: inline literal detected; parameterize user values as :pN";

/// Re-checks SQL a validation stage approved before it reaches the executor.
#[derive(Clone)]
pub struct QueryReviewer {
    validator: Arc<dyn QueryValidator>,
    introspector: Option<Arc<dyn SchemaIntrospector>>,
    string_predicate: Regex,
    numeric_equality: Regex,
    limit: Regex,
    offset: Regex,
    table_ref: Regex,
    cte_name: Regex,
}

impl QueryReviewer {
    pub fn new(
        validator: Arc<dyn QueryValidator>,
        introspector: Option<Arc<dyn SchemaIntrospector>>,
    ) -> Result<Self, GatewayError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|err| GatewayError::Config(err.to_string()));
        Ok(Self {
            validator,
            introspector,
            string_predicate: compile(STRING_PREDICATE_PATTERN)?,
            numeric_equality: compile(NUMERIC_EQUALITY_PATTERN)?,
            limit: compile(LIMIT_PATTERN)?,
            offset: compile(OFFSET_PATTERN)?,
            table_ref: compile(TABLE_REF_PATTERN)?,
            cte_name: compile(CTE_NAME_PATTERN)?,
        })
    }

    /// Returns every issue found; an empty list means the query may run.
    pub async fn review(
        &self,
        sql: &str,
        params: &BTreeMap<String, Scalar>,
    ) -> Vec<ValidationIssue> {
        let normalized = match self.validator.validate(sql) {
            Ok(normalized) => normalized,
            Err(rejection) => {
                return vec![ValidationIssue::new(IssueKind::Safety, rejection.to_string())]
            }
        };
        let sql = normalized.as_str();

        let mut issues = self.placeholder_issues(sql, params);
        if let Some(issue) = self.inline_literal_issue(sql) {
            issues.push(issue);
        }
        issues.extend(self.paging_issues(sql));
        issues.extend(self.schema_issues(sql).await);
        issues
    }

    fn placeholder_issues(
        &self,
        sql: &str,
        params: &BTreeMap<String, Scalar>,
    ) -> Vec<ValidationIssue> {
        let mut seen = BTreeSet::new();
        let mut issues = Vec::new();
        for placeholder in placeholders(sql) {
            match placeholder {
                Placeholder::Named(name) => {
                    if !params.contains_key(&name) && seen.insert(name.clone()) {
                        issues.push(
                            ValidationIssue::new(
                                IssueKind::Params,
                                format!("Placeholder :{name} has no bound value"),
                            )
                            .with_hint("Return a value for every placeholder in params"),
                        );
                    }
                }
                Placeholder::Native(token) => {
                    if seen.insert(token.clone()) {
                        issues.push(
                            ValidationIssue::new(
                                IssueKind::Params,
                                format!("Positional placeholder {token} is not supported"),
                            )
                            .with_hint("Use :p1, :p2 placeholders"),
                        );
                    }
                }
            }
        }
        issues
    }

    fn inline_literal_issue(&self, sql: &str) -> Option<ValidationIssue> {
        let stripped = strip_placeholders(sql);
        let suspicious = self.string_predicate.is_match(&stripped)
            || self.numeric_equality.is_match(&stripped);
        suspicious.then(|| {
            ValidationIssue::new(IssueKind::Params, INLINE_LITERAL_MESSAGE)
                .with_hint("Use :p1, :p2 placeholders and return params dict; never inline user values.")
        })
    }

    fn paging_issues(&self, sql: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (pattern, ceiling, keyword) in [
            (&self.limit, MAX_LIMIT, "LIMIT"),
            (&self.offset, MAX_OFFSET, "OFFSET"),
        ] {
            for captures in pattern.captures_iter(sql) {
                let too_large = captures[1].parse::<u64>().map_or(true, |value| value > ceiling);
                if too_large {
                    issues.push(ValidationIssue::new(
                        IssueKind::Logic,
                        format!("{keyword} must be at most {ceiling}"),
                    ));
                }
            }
        }
        issues
    }

    /// Table names referenced after FROM/JOIN, folded to lower case the way
    /// PostgreSQL folds unquoted identifiers. CTE names, function calls such
    /// as `generate_series(...)` and the `FROM` inside `EXTRACT(YEAR FROM ...)`
    /// are left out.
    pub fn referenced_tables(&self, sql: &str) -> Vec<String> {
        let ctes: BTreeSet<String> = self
            .cte_name
            .captures_iter(sql)
            .map(|captures| captures[1].to_ascii_lowercase())
            .collect();
        let mut tables: Vec<String> = Vec::new();
        for captures in self.table_ref.captures_iter(sql) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if inside_from_function(sql, whole.start())
                || sql[name.end()..].trim_start().starts_with('(')
            {
                continue;
            }
            let name = name.as_str().to_ascii_lowercase();
            if FROM_KEYWORDS.contains(&name.as_str()) || ctes.contains(&name) {
                continue;
            }
            if !tables.contains(&name) {
                tables.push(name);
            }
        }
        tables
    }

    async fn schema_issues(&self, sql: &str) -> Vec<ValidationIssue> {
        let Some(introspector) = &self.introspector else {
            return Vec::new();
        };
        let tables = self.referenced_tables(sql);
        if tables.is_empty() {
            return Vec::new();
        }
        let known = match introspector.introspect(&tables).await {
            Ok(known) => known,
            Err(err) => {
                tracing::debug!(error = %err, "schema check skipped");
                return Vec::new();
            }
        };
        tables
            .iter()
            .filter(|name| {
                let (schema, table) = split_table(name);
                !known.contains_key(&format!("{schema}.{table}"))
            })
            .map(|name| {
                ValidationIssue::new(IssueKind::Schema, format!("Unknown table: {name}"))
                    .with_hint("Use only tables from the schema plan")
            })
            .collect()
    }
}

/// Blanks out `:name` placeholders so `= :p1` never looks like a literal.
fn strip_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek().is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') {
            out.push('?');
            while chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphanumeric() || *next == '_')
            {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn inside_from_function(sql: &str, position: usize) -> bool {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = position;
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b')' => depth += 1,
            b'(' if depth > 0 => depth -= 1,
            b'(' => {
                let before = sql[..i].trim_end();
                let word_start = before
                    .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .map_or(0, |idx| idx + 1);
                let word = before[word_start..].to_ascii_lowercase();
                return FROM_FUNCTIONS.contains(&word.as_str());
            }
            _ => {}
        }
    }
    false
}
