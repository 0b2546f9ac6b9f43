//! Error types for the SQL firewall.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Statement-level failures (lexing, grammar) never abort the process: callers
//! receive them per statement and move on to the next one.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirewallError {
    #[error("Lexer error: {message}")]
    Lexer { message: String },

    #[error("Syntax error: {message} (query: {query})")]
    Syntax { message: String, query: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl FirewallError {
    /// Create a lexer error (scanner initialisation failed).
    pub fn lexer(message: impl Into<String>) -> Self {
        Self::Lexer {
            message: message.into(),
        }
    }

    /// Create a syntax error for a statement the grammar rejected.
    pub fn syntax(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            query: query.into(),
        }
    }

    /// Create an I/O error tied to a path.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error means "the statement could not be parsed".
    ///
    /// Such statements are reported to the operator with a best-effort
    /// location and are otherwise treated as suspicious by enforcement.
    pub fn is_unparseable(&self) -> bool {
        matches!(self, Self::Lexer { .. } | Self::Syntax { .. })
    }
}

/// Result type alias for firewall operations.
pub type FirewallResult<T> = Result<T, FirewallError>;
