//! Token source for the parser.
//!
//! Wraps the `sqlparser` tokenizer. The whole statement is scanned up front
//! (this is where unterminated strings and stray characters surface), then
//! tokens are handed out one at a time with whitespace removed. Comments are
//! dropped from the token stream but counted into the risk record, since
//! comment tricks are a common way to truncate or smuggle SQL.

use crate::error::{FirewallError, FirewallResult};
use crate::risk::QueryRisk;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::collections::VecDeque;
use tracing::trace;

/// SQL dialect used for tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// MySQL / MariaDB (`#` comments, backtick identifiers, `@@globals`)
    #[default]
    Mysql,
    /// Dialect-neutral tokenization
    Generic,
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
}

impl SqlDialect {
    /// Get the `sqlparser` dialect for this setting.
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::Mysql => Box::new(MySqlDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mysql => write!(f, "mysql"),
            Self::Generic => write!(f, "generic"),
            Self::Postgres => write!(f, "postgres"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Comment styles the firewall distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Hash,
    DashDash,
    MultiLine,
    /// `/*! ... */`, executed by MySQL
    MySql,
    /// `/*!50000 ... */`, executed by MySQL from that version on
    MySqlVersioned,
}

impl CommentKind {
    fn classify(whitespace: &Whitespace) -> Option<Self> {
        match whitespace {
            Whitespace::SingleLineComment { prefix, .. } if prefix.starts_with('#') => {
                Some(Self::Hash)
            }
            Whitespace::SingleLineComment { .. } => Some(Self::DashDash),
            Whitespace::MultiLineComment(body) => match body.strip_prefix('!') {
                Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => {
                    Some(Self::MySqlVersioned)
                }
                Some(_) => Some(Self::MySql),
                None => Some(Self::MultiLine),
            },
            _ => None,
        }
    }

    fn record(&self, risk: &mut QueryRisk) {
        match self {
            Self::Hash => risk.hash_comments += 1,
            Self::DashDash => risk.dash_dash_comments += 1,
            Self::MultiLine => risk.multi_line_comments += 1,
            Self::MySql => risk.my_sql_comments += 1,
            Self::MySqlVersioned => risk.my_sql_versioned_comments += 1,
        }
    }
}

/// Scanner over one statement. Dropping it releases the scan buffer.
#[derive(Debug)]
pub struct Lexer {
    tokens: VecDeque<Token>,
}

impl Lexer {
    /// Scan `sql` with the given dialect.
    ///
    /// Fails when the text cannot be tokenized at all (for example an
    /// unterminated quoted string).
    pub fn new(sql: &str, dialect: SqlDialect) -> FirewallResult<Self> {
        let dialect = dialect.dialect();
        let tokens = Tokenizer::new(dialect.as_ref(), sql)
            .tokenize()
            .map_err(|e| FirewallError::lexer(e.to_string()))?;
        trace!(count = tokens.len(), "Tokenized statement");
        Ok(Self {
            tokens: tokens.into(),
        })
    }

    /// Next significant token, counting any comments skipped on the way.
    /// Returns [`Token::EOF`] once the input is exhausted, and keeps doing so.
    pub fn next_token(&mut self, risk: &mut QueryRisk) -> Token {
        while let Some(token) = self.tokens.pop_front() {
            match token {
                Token::Whitespace(ws) => {
                    if let Some(kind) = CommentKind::classify(&ws) {
                        trace!(?kind, "Skipped comment");
                        kind.record(risk);
                    }
                }
                Token::EOF => break,
                other => return other,
            }
        }
        Token::EOF
    }

    /// Drain the remaining significant tokens without recording anything.
    pub fn remaining(self) -> impl Iterator<Item = Token> {
        self.tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sql: &str) -> (Vec<Token>, QueryRisk) {
        let mut lexer = Lexer::new(sql, SqlDialect::Mysql).unwrap();
        let mut risk = QueryRisk::new();
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token(&mut risk);
            if token == Token::EOF {
                break;
            }
            tokens.push(token);
        }
        (tokens, risk)
    }

    #[test]
    fn test_whitespace_is_skipped() {
        let (tokens, _) = drain("SELECT  1\n");
        assert_eq!(tokens.len(), 2);
        assert!(matches!(&tokens[1], Token::Number(n, _) if n == "1"));
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lexer = Lexer::new("1", SqlDialect::Mysql).unwrap();
        let mut risk = QueryRisk::new();
        assert!(matches!(lexer.next_token(&mut risk), Token::Number(..)));
        assert_eq!(lexer.next_token(&mut risk), Token::EOF);
        assert_eq!(lexer.next_token(&mut risk), Token::EOF);
    }

    #[test]
    fn test_comment_kinds_are_counted() {
        let (_, risk) = drain("SELECT 1 -- trailing");
        assert_eq!(risk.dash_dash_comments, 1);

        let (_, risk) = drain("SELECT 1 # trailing");
        assert_eq!(risk.hash_comments, 1);

        let (_, risk) = drain("SELECT /* a */ 1 /* b */");
        assert_eq!(risk.multi_line_comments, 2);

        let (_, risk) = drain("SELECT /*! 1 */ 2");
        assert_eq!(risk.my_sql_comments, 1);

        let (_, risk) = drain("SELECT /*!50000 1 */ 2");
        assert_eq!(risk.my_sql_versioned_comments, 1);
        assert_eq!(risk.multi_line_comments, 0);
    }

    #[test]
    fn test_unterminated_string_fails_to_scan() {
        let err = Lexer::new("SELECT 'abc", SqlDialect::Mysql).unwrap_err();
        assert!(err.is_unparseable());
    }

    #[test]
    fn test_remaining_skips_whitespace() {
        let mut lexer = Lexer::new("SELECT a , b", SqlDialect::Mysql).unwrap();
        let mut risk = QueryRisk::new();
        let _ = lexer.next_token(&mut risk);
        let rest: Vec<String> = lexer.remaining().map(|t| t.to_string()).collect();
        assert_eq!(rest, vec!["a", ",", "b"]);
    }

    #[test]
    fn test_dialect_display() {
        assert_eq!(SqlDialect::Mysql.to_string(), "mysql");
        assert_eq!(SqlDialect::default(), SqlDialect::Mysql);
    }
}
