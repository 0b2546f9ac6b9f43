//! Configuration handling for the SQL firewall.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::error::FirewallResult;
use crate::lexer::SqlDialect;
use crate::sensitive::{DEFAULT_PASSWORD_SUBSTRING, DEFAULT_USER_SUBSTRING, SensitiveNameChecker};
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_PROMPT: &str = "parser> ";

/// Configuration for the SQL firewall front end.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sql-firewall",
    about = "Statically classify SQL statements as risky before they reach the database",
    version,
    author
)]
pub struct Config {
    /// File with one statement per line. Reads stdin interactively when omitted.
    #[arg(value_name = "FILE", env = "SQL_FIREWALL_FILE")]
    pub file: Option<PathBuf>,

    /// SQL dialect used to tokenize statements
    #[arg(
        long,
        value_enum,
        default_value_t = SqlDialect::Mysql,
        env = "SQL_FIREWALL_DIALECT"
    )]
    pub dialect: SqlDialect,

    /// Column/table names containing this substring are password fields
    #[arg(
        long,
        default_value = DEFAULT_PASSWORD_SUBSTRING,
        env = "SQL_FIREWALL_PASSWORD_SUBSTRING"
    )]
    pub password_substring: String,

    /// Column/table names containing this substring are user fields
    #[arg(
        long,
        default_value = DEFAULT_USER_SUBSTRING,
        env = "SQL_FIREWALL_USER_SUBSTRING"
    )]
    pub user_substring: String,

    /// Print risk records as JSON instead of the text block
    #[arg(long, env = "SQL_FIREWALL_JSON")]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "SQL_FIREWALL_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQL_FIREWALL_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output on stderr (disabled by default to keep the report clean)
    #[arg(long, env = "SQL_FIREWALL_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            file: None,
            dialect: SqlDialect::Mysql,
            password_substring: DEFAULT_PASSWORD_SUBSTRING.to_string(),
            user_substring: DEFAULT_USER_SUBSTRING.to_string(),
            json: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Build the sensitive-name checker described by this configuration.
    pub fn name_checker(&self) -> FirewallResult<SensitiveNameChecker> {
        SensitiveNameChecker::new(&self.password_substring, &self.user_substring)
    }

    /// Whether statements are read interactively from stdin.
    pub fn is_interactive(&self) -> bool {
        self.file.is_none()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, SqlDialect::Mysql);
        assert_eq!(config.password_substring, DEFAULT_PASSWORD_SUBSTRING);
        assert_eq!(config.user_substring, DEFAULT_USER_SUBSTRING);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.is_interactive());
        assert!(!config.json);
        assert!(!config.enable_logs);
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::try_parse_from([
            "sql-firewall",
            "--dialect",
            "postgres",
            "--password-substring",
            "secret",
            "--json",
            "queries.sql",
        ])
        .unwrap();
        assert_eq!(config.dialect, SqlDialect::Postgres);
        assert_eq!(config.password_substring, "secret");
        assert!(config.json);
        assert_eq!(config.file, Some(PathBuf::from("queries.sql")));
        assert!(!config.is_interactive());
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let result = Config::try_parse_from(["sql-firewall", "--dialect", "oracle"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_name_checker_from_config() {
        let config = Config {
            password_substring: "PassWd".to_string(),
            ..Config::default()
        };
        let names = config.name_checker().unwrap();
        assert!(names.is_password_field("user_passwd"));
        assert!(names.is_user_field("app_users"));
    }

    #[test]
    fn test_empty_substring_rejected() {
        let config = Config {
            user_substring: String::new(),
            ..Config::default()
        };
        assert!(config.name_checker().is_err());
    }
}
