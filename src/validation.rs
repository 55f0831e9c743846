use regex::Regex;
use serde::Deserialize;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::RedshiftSqlDialect;
use sqlparser::parser::Parser;
use std::sync::LazyLock;

/// Verbs that may never appear as a standalone word in generated SQL.
pub const BLOCKED_KEYWORDS: [&str; 11] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE",
];

static BLOCKED_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BLOCKED_KEYWORDS
        .iter()
        .map(|kw| {
            let re = Regex::new(&format!(r"\b{}\b", kw)).expect("valid keyword pattern");
            (*kw, re)
        })
        .collect()
});

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a candidate statement is safe to run read-only.
pub trait SqlValidator: Send + Sync {
    fn check(&self, sql: &str) -> ValidationVerdict;
}

/// Which validator the pipeline uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorKind {
    #[default]
    Keyword,
    Parser,
}

impl ValidatorKind {
    pub fn build(self) -> Box<dyn SqlValidator> {
        match self {
            ValidatorKind::Keyword => Box::new(KeywordValidator),
            ValidatorKind::Parser => Box::new(ParserValidator),
        }
    }
}

impl std::str::FromStr for ValidatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" => Ok(ValidatorKind::Keyword),
            "parser" => Ok(ValidatorKind::Parser),
            other => Err(format!(
                "unknown validator '{}' (expected 'keyword' or 'parser')",
                other
            )),
        }
    }
}

/// Textual allowlist-by-verb policy.
///
/// Rules run in order and the first failure wins:
/// 1. no blocked keyword as a standalone word, anywhere;
/// 2. the statement starts with `SELECT`;
/// 3. at most one `;`, and only as the final character.
///
/// Matching is on words, not tokens: `update_time` passes, but an unquoted
/// identifier spelled exactly like a blocked verb (or the verb inside a string
/// literal) is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordValidator;

impl SqlValidator for KeywordValidator {
    fn check(&self, sql: &str) -> ValidationVerdict {
        let upper = sql.to_uppercase();

        for (keyword, pattern) in BLOCKED_PATTERNS.iter() {
            if pattern.is_match(&upper) {
                return ValidationVerdict::reject(format!(
                    "Dangerous SQL keyword detected: {}",
                    keyword
                ));
            }
        }

        if !upper.trim().starts_with("SELECT") {
            return ValidationVerdict::reject("Query must start with SELECT");
        }

        let semicolons = sql.matches(';').count();
        if semicolons > 1 || (semicolons == 1 && !sql.trim_end().ends_with(';')) {
            return ValidationVerdict::reject("Multiple SQL statements not allowed");
        }

        ValidationVerdict::accept()
    }
}

/// Parser-backed policy: exactly one read-only query statement.
///
/// Stricter than [`KeywordValidator`] about structure (`SELECT INTO`, writes in
/// CTEs, row locks) and looser about identifiers that happen to be verbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserValidator;

impl SqlValidator for ParserValidator {
    fn check(&self, sql: &str) -> ValidationVerdict {
        let statements = match Parser::parse_sql(&RedshiftSqlDialect {}, sql) {
            Ok(stmts) => stmts,
            Err(e) => {
                return ValidationVerdict::reject(format!("cannot verify query safety: {}", e));
            }
        };

        match statements.as_slice() {
            [] => ValidationVerdict::reject("Query must start with SELECT"),
            [Statement::Query(query)] => match unsafe_query_reason(query) {
                None => ValidationVerdict::accept(),
                Some(reason) => ValidationVerdict::reject(reason),
            },
            [stmt] => ValidationVerdict::reject(classify_denial(stmt)),
            _ => ValidationVerdict::reject("Multiple SQL statements not allowed"),
        }
    }
}

fn unsafe_query_reason(query: &Query) -> Option<String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            if let Some(reason) = unsafe_query_reason(&cte.query) {
                return Some(reason);
            }
        }
    }
    if !query.locks.is_empty() {
        return Some("row locking clauses are not allowed".to_string());
    }
    unsafe_body_reason(&query.body)
}

fn unsafe_body_reason(body: &SetExpr) -> Option<String> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => {
            Some("SELECT INTO would create a table".to_string())
        }
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => None,
        SetExpr::Query(query) => unsafe_query_reason(query),
        SetExpr::SetOperation { left, right, .. } => {
            unsafe_body_reason(left).or_else(|| unsafe_body_reason(right))
        }
        SetExpr::Insert(_) => Some("CTE-wrapped INSERT is not allowed".to_string()),
        SetExpr::Update(_) => Some("CTE-wrapped UPDATE is not allowed".to_string()),
        #[allow(unreachable_patterns)]
        _ => Some("query contains unsafe operations".to_string()),
    }
}

fn classify_denial(stmt: &Statement) -> String {
    let verb = match stmt {
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::CreateTable { .. } | Statement::CreateView { .. } => "CREATE",
        Statement::AlterTable { .. } => "ALTER",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Execute { .. } => "EXECUTE",
        _ => return "Query must start with SELECT".to_string(),
    };
    format!("Dangerous SQL keyword detected: {}", verb)
}
