//! Safe-query gate for `execute_safe_query`.
//!
//! Decides, from the SQL text alone, whether a statement may run on the
//! restricted path. Only a single `SELECT` (or `WITH ... SELECT`) passes.
//! Anything the gate cannot classify with confidence is rejected.
//!
//! Two passes, both built on [sqlparser](https://docs.rs/sqlparser/):
//! 1. A token scan. Comments, string literals and quoted identifiers are
//!    separate tokens, so keywords hidden inside them never trigger a
//!    rejection, and keywords outside them always do.
//! 2. An AST check that the statement really is one query whose body (and
//!    every CTE body) only reads.
//!
//! The gate is a pure function of its input and dialect; it never touches
//! the database.

use crate::models::DatabaseType;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use thiserror::Error;

/// Unquoted words that can change database state.
const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "MERGE", "UPSERT", "REPLACE", "RENAME", "COPY", "CALL", "EXEC", "EXECUTE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "LOCK",
];

/// Gate decision for one SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(RejectionReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Allowed => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("empty statement")]
    Empty,

    #[error("multiple statements")]
    MultipleStatements,

    #[error("not a read-only statement (starts with {found})")]
    NotReadOnly { found: String },

    #[error("mutating keyword detected: {keyword}")]
    MutatingKeyword { keyword: String },

    #[error("SELECT INTO creates a table")]
    SelectInto,

    #[error("statement could not be classified: {detail}")]
    Unclassifiable { detail: String },
}

/// The gate, bound to the SQL dialect of the configured database.
#[derive(Debug, Clone, Copy)]
pub struct SafeQueryGate {
    db_type: Option<DatabaseType>,
}

impl SafeQueryGate {
    pub fn for_database(db_type: DatabaseType) -> Self {
        Self {
            db_type: Some(db_type),
        }
    }

    /// A gate using the generic dialect, for text not tied to a database.
    pub fn generic() -> Self {
        Self { db_type: None }
    }

    pub fn check(&self, sql: &str) -> Verdict {
        let dialect = self.dialect();
        let checked = check_tokens(dialect.as_ref(), sql, self.runs_executable_comments())
            .and_then(|()| check_ast(dialect.as_ref(), sql));
        match checked {
            Ok(()) => Verdict::Allowed,
            Err(reason) => Verdict::Rejected(reason),
        }
    }

    /// MySQL runs the body of `/*! ... */` comments as SQL. The generic gate
    /// may be fronting MySQL, so it is treated the same way.
    fn runs_executable_comments(&self) -> bool {
        matches!(self.db_type, Some(DatabaseType::MySql) | None)
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.db_type {
            Some(DatabaseType::Postgres) => Box::new(PostgreSqlDialect {}),
            Some(DatabaseType::MySql) => Box::new(MySqlDialect {}),
            Some(DatabaseType::Sqlite) => Box::new(SQLiteDialect {}),
            None => Box::new(GenericDialect {}),
        }
    }
}

/// Classify SQL with the generic dialect.
///
/// ```
/// use sqltools_mcp_server::tools::safe_query::classify;
///
/// assert!(classify("SELECT * FROM users").is_allowed());
/// assert!(!classify("DELETE FROM users").is_allowed());
/// ```
pub fn classify(sql: &str) -> Verdict {
    SafeQueryGate::generic().check(sql)
}

/// Token pass: single statement, leading SELECT/WITH, no mutating words.
fn check_tokens(
    dialect: &dyn Dialect,
    sql: &str,
    executable_comments: bool,
) -> Result<(), RejectionReason> {
    let tokens = Tokenizer::new(dialect, sql)
        .tokenize()
        .map_err(|e| RejectionReason::Unclassifiable {
            detail: e.to_string(),
        })?;

    if executable_comments && tokens.iter().any(is_executable_comment) {
        return Err(RejectionReason::Unclassifiable {
            detail: "MySQL executable comment".to_string(),
        });
    }

    // Comments are whitespace tokens
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
        .collect();

    if significant.is_empty() {
        return Err(RejectionReason::Empty);
    }

    let body = match significant.iter().position(|t| matches!(t, Token::SemiColon)) {
        Some(end) if end + 1 < significant.len() => {
            return Err(RejectionReason::MultipleStatements);
        }
        Some(end) => &significant[..end],
        None => &significant[..],
    };

    let first = body
        .iter()
        .find(|t| !matches!(t, Token::LParen))
        .ok_or(RejectionReason::Empty)?;
    match first {
        Token::Word(w) if w.quote_style.is_none() => {
            let word = w.value.to_ascii_uppercase();
            if word != "SELECT" && word != "WITH" {
                return Err(RejectionReason::NotReadOnly { found: word });
            }
        }
        other => {
            return Err(RejectionReason::NotReadOnly {
                found: other.to_string(),
            });
        }
    }

    for (i, token) in body.iter().enumerate() {
        let Token::Word(w) = token else { continue };
        if w.quote_style.is_some() {
            continue;
        }
        let word = w.value.to_ascii_uppercase();
        if !MUTATING_KEYWORDS.contains(&word.as_str()) {
            continue;
        }
        // REPLACE(str, from, to) is a string function
        if word == "REPLACE" && matches!(body.get(i + 1), Some(Token::LParen)) {
            continue;
        }
        return Err(RejectionReason::MutatingKeyword { keyword: word });
    }

    Ok(())
}

/// `/*! ... */` and `/*!50000 ... */`: hidden from the parser, run by MySQL.
fn is_executable_comment(token: &Token) -> bool {
    matches!(
        token,
        Token::Whitespace(Whitespace::MultiLineComment(body)) if body.starts_with('!')
    )
}

/// AST pass: exactly one query that only reads.
fn check_ast(dialect: &dyn Dialect, sql: &str) -> Result<(), RejectionReason> {
    let statements =
        Parser::parse_sql(dialect, sql).map_err(|e| RejectionReason::Unclassifiable {
            detail: e.to_string(),
        })?;

    match statements.as_slice() {
        [] => Err(RejectionReason::Empty),
        [Statement::Query(query)] => check_query(query),
        [other] => Err(RejectionReason::NotReadOnly {
            found: statement_keyword(other),
        }),
        _ => Err(RejectionReason::MultipleStatements),
    }
}

fn check_query(query: &Query) -> Result<(), RejectionReason> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(body: &SetExpr) -> Result<(), RejectionReason> {
    match body {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                return Err(RejectionReason::SelectInto);
            }
            Ok(())
        }
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        other => Err(RejectionReason::NotReadOnly {
            found: statement_keyword_of(&other.to_string()),
        }),
    }
}

fn statement_keyword(stmt: &Statement) -> String {
    statement_keyword_of(&stmt.to_string())
}

/// First word of the rendered SQL, e.g. `INSERT`.
fn statement_keyword_of(rendered: &str) -> String {
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(sql: &str) -> RejectionReason {
        match classify(sql) {
            Verdict::Rejected(reason) => reason,
            Verdict::Allowed => panic!("expected rejection for {sql:?}"),
        }
    }

    #[test]
    fn test_plain_select_allowed() {
        assert!(classify("SELECT * FROM users").is_allowed());
        assert!(classify("select id, name from users where id = 1").is_allowed());
        assert!(classify("SELECT 1").is_allowed());
    }

    #[test]
    fn test_cte_select_allowed() {
        let sql = "WITH recent AS (SELECT * FROM orders WHERE created_at > '2024-01-01') \
                   SELECT COUNT(*) FROM recent";
        assert!(classify(sql).is_allowed());
    }

    #[test]
    fn test_set_operations_allowed() {
        assert!(classify("SELECT a FROM t1 UNION ALL SELECT b FROM t2").is_allowed());
        assert!(classify("(SELECT 1) UNION (SELECT 2)").is_allowed());
    }

    #[test]
    fn test_leading_comments_and_whitespace_skipped() {
        assert!(classify("-- comment\nSELECT 1").is_allowed());
        assert!(classify("/* block */  \n\t SELECT 1").is_allowed());
        assert!(classify("  (SELECT 1)").is_allowed());
    }

    #[test]
    fn test_trailing_terminator_allowed() {
        assert!(classify("SELECT 1;").is_allowed());
        assert!(classify("SELECT 1;  -- done\n").is_allowed());
    }

    #[test]
    fn test_keywords_in_literals_and_identifiers_ignored() {
        assert!(classify("SELECT 'DROP TABLE users' AS note").is_allowed());
        assert!(classify("SELECT \"delete\" FROM \"update\"").is_allowed());
        assert!(classify("SELECT 1 /* INSERT INTO t */").is_allowed());
        assert!(classify("SELECT 1 -- TRUNCATE t").is_allowed());
    }

    #[test]
    fn test_replace_function_allowed() {
        assert!(classify("SELECT REPLACE(name, 'a', 'b') FROM users").is_allowed());
        assert!(classify("SELECT replace (name, 'a', 'b') FROM users").is_allowed());
    }

    #[test]
    fn test_mutations_rejected() {
        assert_eq!(
            rejected("DELETE FROM users"),
            RejectionReason::NotReadOnly {
                found: "DELETE".into()
            }
        );
        assert!(matches!(
            rejected("INSERT INTO users VALUES (1)"),
            RejectionReason::NotReadOnly { .. }
        ));
        assert!(matches!(
            rejected("UPDATE users SET a = 1"),
            RejectionReason::NotReadOnly { .. }
        ));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_eq!(
            rejected("SELECT * FROM users; DROP TABLE users"),
            RejectionReason::MultipleStatements
        );
        assert_eq!(
            rejected("SELECT 1; SELECT 2"),
            RejectionReason::MultipleStatements
        );
        assert_eq!(rejected("SELECT 1;;"), RejectionReason::MultipleStatements);
    }

    #[test]
    fn test_mutating_cte_rejected() {
        assert_eq!(
            rejected("WITH gone AS (DELETE FROM users RETURNING *) SELECT * FROM gone"),
            RejectionReason::MutatingKeyword {
                keyword: "DELETE".into()
            }
        );
    }

    #[test]
    fn test_mutating_keyword_anywhere_rejected() {
        assert!(matches!(
            rejected("SELECT * FROM users FOR UPDATE"),
            RejectionReason::MutatingKeyword { .. }
        ));
        assert!(matches!(
            rejected("SELECT lock FROM t"),
            RejectionReason::MutatingKeyword { .. }
        ));
    }

    #[test]
    fn test_select_into_rejected() {
        assert_eq!(
            rejected("SELECT * INTO backup FROM users"),
            RejectionReason::SelectInto
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(rejected(""), RejectionReason::Empty);
        assert_eq!(rejected("   \n"), RejectionReason::Empty);
        assert_eq!(rejected("-- only a comment"), RejectionReason::Empty);
        assert_eq!(rejected(";"), RejectionReason::Empty);
    }

    #[test]
    fn test_unclassifiable_rejected() {
        assert!(matches!(
            rejected("SELECT 'unterminated"),
            RejectionReason::Unclassifiable { .. }
        ));
        assert!(matches!(
            rejected("SELECT * FROM"),
            RejectionReason::Unclassifiable { .. }
        ));
    }

    #[test]
    fn test_other_statements_rejected() {
        assert!(matches!(
            rejected("SHOW TABLES"),
            RejectionReason::NotReadOnly { .. }
        ));
        assert!(matches!(
            rejected("EXPLAIN SELECT 1"),
            RejectionReason::NotReadOnly { .. }
        ));
        assert!(matches!(
            rejected("BEGIN"),
            RejectionReason::NotReadOnly { .. }
        ));
    }

    #[test]
    fn test_dialect_specific_syntax() {
        let pg = SafeQueryGate::for_database(DatabaseType::Postgres);
        assert!(pg.check("SELECT $1::int, 'x'::text").is_allowed());
        assert!(pg.check("SELECT $$DROP TABLE t$$").is_allowed());

        let mysql = SafeQueryGate::for_database(DatabaseType::MySql);
        assert!(mysql.check("SELECT `delete` FROM `t` WHERE id = ?").is_allowed());
        assert!(!mysql.check("REPLACE INTO t VALUES (1)").is_allowed());
        assert_eq!(
            mysql.check("SELECT 1 /*! ; COMMIT; DELETE FROM users */"),
            Verdict::Rejected(RejectionReason::Unclassifiable {
                detail: "MySQL executable comment".into()
            })
        );
        assert!(
            !mysql
                .check("SELECT * FROM users /*!50000 INTO OUTFILE '/tmp/x' */")
                .is_allowed()
        );
        assert!(mysql.check("SELECT 1 /* plain comment */").is_allowed());
        assert!(mysql.check("SELECT '/*! not a comment */'").is_allowed());

        let sqlite = SafeQueryGate::for_database(DatabaseType::Sqlite);
        assert!(sqlite.check("SELECT name FROM sqlite_master WHERE type = ?").is_allowed());
        assert!(!sqlite.check("PRAGMA table_info(users)").is_allowed());
        assert!(sqlite.check("SELECT * FROM pragma_table_info('users')").is_allowed());
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(RejectionReason::Empty.to_string(), "empty statement");
        assert_eq!(
            RejectionReason::MutatingKeyword {
                keyword: "DROP".into()
            }
            .to_string(),
            "mutating keyword detected: DROP"
        );
        assert!(classify("DROP TABLE t").rejection().is_some());
        assert!(classify("SELECT 1").rejection().is_none());
    }
}
