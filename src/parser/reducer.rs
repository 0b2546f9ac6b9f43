//! Token-at-a-time front end to the grammar.
//!
//! Each fed token is appended to a buffer and the buffer is checked for
//! viability. The first token that makes the buffer unparseable clears
//! `valid` in the context. On end-of-input the full parse runs once, and its
//! tree and risk findings are moved into the context.

use super::grammar::{self, GrammarError};
use crate::ast::{Ast, NodeId};
use crate::risk::QueryRisk;
use crate::sensitive::SensitiveNameChecker;
use sqlparser::tokenizer::Token;
use tracing::trace;

/// Where and why the reducer stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Index of the offending token among the significant tokens fed.
    pub index: usize,
    pub expected: &'static str,
}

/// State shared between the lexer, the reducer and the driver for one statement.
#[derive(Debug)]
pub struct ParseContext<'n> {
    pub risk: QueryRisk,
    pub names: &'n SensitiveNameChecker,
    accepted: Option<(Ast, NodeId)>,
    failure: Option<Failure>,
}

impl<'n> ParseContext<'n> {
    pub fn new(names: &'n SensitiveNameChecker) -> Self {
        Self {
            risk: QueryRisk::new(),
            names,
            accepted: None,
            failure: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.risk.valid
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// The finished tree, once end-of-input has been accepted.
    pub fn take_accepted(&mut self) -> Option<(Ast, NodeId)> {
        self.accepted.take()
    }

    fn fail(&mut self, index: usize, expected: &'static str) {
        trace!(index, expected, "Reducer rejected token");
        self.risk.valid = false;
        self.failure = Some(Failure { index, expected });
    }
}

#[derive(Debug, Default)]
pub struct Reducer {
    buffered: Vec<Token>,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of significant tokens fed so far.
    pub fn consumed(&self) -> usize {
        self.buffered.len()
    }

    /// Feed one token. Tokens fed after a failure are ignored.
    pub fn feed(&mut self, token: Token, ctx: &mut ParseContext<'_>) {
        if !ctx.is_valid() {
            return;
        }
        if token == Token::EOF {
            self.finish(ctx);
            return;
        }

        self.buffered.push(token);
        match grammar::parse(&self.buffered, false, ctx.names) {
            Ok(_) | Err(GrammarError::Incomplete) => {}
            Err(GrammarError::Unexpected { index, expected }) => ctx.fail(index, expected),
        }
    }

    fn finish(&mut self, ctx: &mut ParseContext<'_>) {
        match grammar::parse(&self.buffered, true, ctx.names) {
            Ok(statement) => {
                ctx.risk.merge(&statement.risk);
                ctx.accepted = Some((statement.ast, statement.root));
            }
            Err(GrammarError::Unexpected { index, expected }) => ctx.fail(index, expected),
            // A complete parse reads end-of-input instead of running out
            Err(GrammarError::Incomplete) => ctx.fail(self.buffered.len(), "more input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, SqlDialect};
    use crate::risk::QueryType;

    fn run<'n>(sql: &str, names: &'n SensitiveNameChecker) -> (ParseContext<'n>, Reducer) {
        let mut lexer = Lexer::new(sql, SqlDialect::Mysql).unwrap();
        let mut ctx = ParseContext::new(names);
        let mut reducer = Reducer::new();
        loop {
            let token = lexer.next_token(&mut ctx.risk);
            let at_end = token == Token::EOF;
            reducer.feed(token, &mut ctx);
            if at_end || !ctx.is_valid() {
                return (ctx, reducer);
            }
        }
    }

    #[test]
    fn test_accepts_and_merges_findings() {
        let names = SensitiveNameChecker::default();
        let (mut ctx, reducer) = run("SELECT * FROM t -- c\nWHERE 1 = 1", &names);
        assert!(ctx.is_valid());
        assert_eq!(reducer.consumed(), 8);
        assert_eq!(ctx.risk.query_type, QueryType::Select);
        assert_eq!(ctx.risk.dash_dash_comments, 1);
        assert!(ctx.risk.always_true_conditional);
        assert!(ctx.take_accepted().is_some());
        assert!(ctx.take_accepted().is_none());
    }

    #[test]
    fn test_fails_on_first_bad_token() {
        let names = SensitiveNameChecker::default();
        let (ctx, reducer) = run("SELECT a FROM t WHERE WHERE b", &names);
        assert!(!ctx.is_valid());
        // Stopped at the second WHERE without seeing `b`
        assert_eq!(reducer.consumed(), 6);
        assert_eq!(ctx.failure().map(|f| f.index), Some(5));
    }

    #[test]
    fn test_truncated_statement_fails_at_end() {
        let names = SensitiveNameChecker::default();
        let (ctx, reducer) = run("SELECT a FROM", &names);
        assert!(!ctx.is_valid());
        assert_eq!(ctx.failure().map(|f| f.index), Some(reducer.consumed()));
    }

    #[test]
    fn test_grammar_findings_are_dropped_on_failure() {
        let names = SensitiveNameChecker::default();
        let (ctx, _) = run("SELECT * FROM t UNION SELECT FROM", &names);
        assert!(!ctx.is_valid());
        assert_eq!(ctx.risk.union_statements, 0);
    }

    #[test]
    fn test_feed_after_failure_is_ignored() {
        let names = SensitiveNameChecker::default();
        let mut ctx = ParseContext::new(&names);
        let mut reducer = Reducer::new();
        reducer.feed(Token::Comma, &mut ctx);
        assert!(!ctx.is_valid());
        reducer.feed(Token::EOF, &mut ctx);
        assert_eq!(reducer.consumed(), 1);
        assert!(ctx.take_accepted().is_none());
    }
}
