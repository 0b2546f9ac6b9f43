//! Error localisation by replaying a rejected statement.

use super::reducer::{ParseContext, Reducer};
use crate::lexer::{Lexer, SqlDialect};
use crate::sensitive::SensitiveNameChecker;
use sqlparser::tokenizer::Token;
use tracing::debug;

/// Reported when the statement cannot even be scanned.
pub const UNKNOWN_LOCATION: &str = "(unknown)";

/// Replay `sql` through a fresh reducer and return the text from the first
/// rejected token to the end, tokens joined by single spaces.
///
/// Returns the empty string when the replay is accepted or fails only at
/// end-of-input, and [`UNKNOWN_LOCATION`] when the tokenizer rejects the text.
pub fn parse_error_location(sql: &str, dialect: SqlDialect, names: &SensitiveNameChecker) -> String {
    let mut lexer = match Lexer::new(sql, dialect) {
        Ok(lexer) => lexer,
        Err(e) => {
            debug!(error = %e, "Could not rescan statement");
            return UNKNOWN_LOCATION.to_string();
        }
    };
    let mut reducer = Reducer::new();
    let mut ctx = ParseContext::new(names);

    loop {
        let token = lexer.next_token(&mut ctx.risk);
        if token == Token::EOF {
            reducer.feed(token, &mut ctx);
            return String::new();
        }
        let failing = token.to_string();
        reducer.feed(token, &mut ctx);
        if !ctx.is_valid() {
            return std::iter::once(failing)
                .chain(lexer.remaining().map(|t| t.to_string()))
                .collect::<Vec<_>>()
                .join(" ");
        }
    }
}
