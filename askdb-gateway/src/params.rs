use askdb_core::Scalar;

use crate::GatewayError;

/// A placeholder found outside quoted text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// `:name`
    Named(String),
    /// `$n`, which callers are not allowed to use directly.
    Native(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Located {
    placeholder: Placeholder,
    start: usize,
    end: usize,
}

/// SQL rewritten to native `$n` placeholders together with its ordered values.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<Scalar>,
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn scan(sql: &str) -> Vec<Located> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes.get(i + 1).copied().is_some_and(is_ident_start) => {
                let start = i;
                i += 1;
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                found.push(Located {
                    placeholder: Placeholder::Named(sql[start + 1..i].to_string()),
                    start,
                    end: i,
                });
            }
            b'$' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
                && (i == 0 || !is_ident_continue(bytes[i - 1])) =>
            {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                found.push(Located {
                    placeholder: Placeholder::Native(sql[start..i].to_string()),
                    start,
                    end: i,
                });
            }
            _ => i += 1,
        }
    }
    found
}

/// Placeholders in order of appearance, ignoring quoted text and `::` casts.
pub fn placeholders(sql: &str) -> Vec<Placeholder> {
    scan(sql).into_iter().map(|located| located.placeholder).collect()
}

/// Maps `pN` to its zero-based index into the caller's parameter list.
pub fn param_index(name: &str, available: usize) -> Option<usize> {
    let digits = name.strip_prefix('p')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: usize = digits.parse().ok()?;
    (number >= 1 && number <= available).then(|| number - 1)
}

/// Rewrites `:p1, :p2, ...` into `$1, $2, ...` in first-use order. A name used
/// twice binds once.
pub fn bind_placeholders(sql: &str, params: &[Scalar]) -> Result<BoundQuery, GatewayError> {
    let mut rewritten = String::with_capacity(sql.len());
    let mut order: Vec<usize> = Vec::new();
    let mut cursor = 0;

    for located in scan(sql) {
        let index = match &located.placeholder {
            Placeholder::Named(name) => param_index(name, params.len())
                .ok_or_else(|| GatewayError::UnknownPlaceholder(name.clone()))?,
            Placeholder::Native(token) => {
                return Err(GatewayError::UnknownPlaceholder(token.clone()));
            }
        };
        let position = match order.iter().position(|&seen| seen == index) {
            Some(existing) => existing + 1,
            None => {
                order.push(index);
                order.len()
            }
        };
        rewritten.push_str(&sql[cursor..located.start]);
        rewritten.push('$');
        rewritten.push_str(&position.to_string());
        cursor = located.end;
    }
    rewritten.push_str(&sql[cursor..]);

    Ok(BoundQuery {
        sql: rewritten,
        params: order.into_iter().map(|index| params[index].clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_in_first_use_order() {
        let params = vec![Scalar::Int(2025), Scalar::Int(10)];
        let bound = bind_placeholders(
            "SELECT name FROM clients WHERE year = :p1 LIMIT :p2",
            &params,
        )
        .unwrap();
        assert_eq!(bound.sql, "SELECT name FROM clients WHERE year = $1 LIMIT $2");
        assert_eq!(bound.params, params);
    }

    #[test]
    fn repeated_and_out_of_order_names_bind_once() {
        let params = vec![
            Scalar::Text("a".into()),
            Scalar::Text("b".into()),
        ];
        let bound =
            bind_placeholders("SELECT x FROM t WHERE a = :p2 OR b = :p2 OR c = :p1", &params)
                .unwrap();
        assert_eq!(bound.sql, "SELECT x FROM t WHERE a = $1 OR b = $1 OR c = $2");
        assert_eq!(
            bound.params,
            vec![Scalar::Text("b".into()), Scalar::Text("a".into())]
        );
    }

    #[test]
    fn casts_and_quoted_text_are_untouched() {
        let bound = bind_placeholders(
            "SELECT created_at::date, ':p9' AS label, \"odd:col\" FROM t WHERE id = :p1::int",
            &[Scalar::Int(7)],
        )
        .unwrap();
        assert_eq!(
            bound.sql,
            "SELECT created_at::date, ':p9' AS label, \"odd:col\" FROM t WHERE id = $1::int"
        );
    }

    #[test]
    fn unknown_names_are_errors() {
        let err = bind_placeholders("SELECT a FROM t WHERE b = :region", &[Scalar::Int(1)])
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownPlaceholder(name) if name == "region"));

        let err = bind_placeholders("SELECT a FROM t WHERE b = :p2", &[Scalar::Int(1)])
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownPlaceholder(name) if name == "p2"));
    }

    #[test]
    fn native_placeholders_are_refused() {
        let err = bind_placeholders("SELECT a FROM t WHERE b = $1", &[Scalar::Int(1)])
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownPlaceholder(token) if token == "$1"));
    }

    #[test]
    fn lists_placeholders_in_order() {
        assert_eq!(
            placeholders("SELECT a FROM t WHERE b = :p2 AND c = 'x:p3' AND d = :p1"),
            vec![
                Placeholder::Named("p2".into()),
                Placeholder::Named("p1".into())
            ]
        );
    }
}
