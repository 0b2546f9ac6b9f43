//! Statement parser: drives tokens from the lexer through the reducer.

use super::diagnostic;
use super::hash::QueryHash;
use super::reducer::{ParseContext, Reducer};
use crate::ast::{Ast, NodeId};
use crate::error::{FirewallError, FirewallResult};
use crate::lexer::{Lexer, SqlDialect};
use crate::risk::QueryRisk;
use crate::sensitive::SensitiveNameChecker;
use sqlparser::tokenizer::Token;
use tracing::debug;

/// Where the driver loop is for the current statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    AwaitingToken,
    Reducing(Token),
    Accepted,
    Failed,
}

/// A statement that parsed, with everything learned about it.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub ast: Ast,
    pub root: NodeId,
    pub risk: QueryRisk,
    pub hash: QueryHash,
}

impl ParsedQuery {
    /// WHERE, HAVING and ON conditions of the statement.
    pub fn conditions(&self) -> Vec<NodeId> {
        self.ast.conditions(self.root)
    }

    pub fn render(&self) -> String {
        self.ast.render(self.root)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FirewallParser<'n> {
    dialect: SqlDialect,
    names: &'n SensitiveNameChecker,
}

impl<'n> FirewallParser<'n> {
    pub fn new(dialect: SqlDialect, names: &'n SensitiveNameChecker) -> Self {
        Self { dialect, names }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Parse one statement and score its risk.
    ///
    /// Returns [`FirewallError::Lexer`] when the text cannot be tokenized and
    /// [`FirewallError::Syntax`] when the grammar rejects it.
    pub fn parse(&self, sql: &str) -> FirewallResult<ParsedQuery> {
        let mut lexer = Lexer::new(sql, self.dialect)?;
        let mut reducer = Reducer::new();
        let mut ctx = ParseContext::new(self.names);
        let mut seen: Vec<Token> = Vec::new();
        let mut state = DriverState::AwaitingToken;

        loop {
            state = match state {
                DriverState::AwaitingToken => {
                    DriverState::Reducing(lexer.next_token(&mut ctx.risk))
                }
                DriverState::Reducing(token) => {
                    let at_end = token == Token::EOF;
                    if !at_end {
                        seen.push(token.clone());
                    }
                    reducer.feed(token, &mut ctx);
                    if !ctx.is_valid() {
                        DriverState::Failed
                    } else if at_end {
                        DriverState::Accepted
                    } else {
                        DriverState::AwaitingToken
                    }
                }
                DriverState::Accepted => {
                    let Some((ast, root)) = ctx.take_accepted() else {
                        return Err(FirewallError::syntax("statement produced no tree", sql));
                    };
                    let hash = QueryHash::of_tokens(&seen);
                    debug!(
                        query_type = %ctx.risk.query_type,
                        hash = %hash,
                        nodes = ast.len(),
                        "Statement accepted"
                    );
                    return Ok(ParsedQuery {
                        ast,
                        root,
                        risk: ctx.risk,
                        hash,
                    });
                }
                DriverState::Failed => {
                    let message = match ctx.failure() {
                        Some(failure) => {
                            let found = seen
                                .get(failure.index)
                                .map(|t| format!("'{t}'"))
                                .unwrap_or_else(|| "end of input".to_string());
                            format!("unexpected {found}, expected {}", failure.expected)
                        }
                        None => "statement rejected".to_string(),
                    };
                    debug!(tokens = reducer.consumed(), %message, "Statement rejected");
                    return Err(FirewallError::syntax(message, sql));
                }
            };
        }
    }

    /// The unparsed remainder of `sql` from the token where parsing fails.
    /// See [`diagnostic::parse_error_location`].
    pub fn error_location(&self, sql: &str) -> String {
        diagnostic::parse_error_location(sql, self.dialect, self.names)
    }
}
