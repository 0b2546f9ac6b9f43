//! SQL Firewall Library
//!
//! This library parses SQL statements into an expression tree and scores
//! them for injection, authentication bypass and reconnaissance patterns
//! before they reach a database server.

pub mod ast;
pub mod cli;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod risk;
pub mod sensitive;

pub use ast::{Ast, Expr, ExprRef, NodeId, NodeKind};
pub use config::Config;
pub use error::{FirewallError, FirewallResult};
pub use lexer::SqlDialect;
pub use parser::{FirewallParser, ParsedQuery, QueryHash};
pub use risk::{EmptyPassword, QueryRisk, QueryType};
pub use sensitive::SensitiveNameChecker;
