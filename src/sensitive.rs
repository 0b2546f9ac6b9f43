//! Sensitive field-name oracle.
//!
//! Decides whether a column or table name denotes a password field or a
//! user/identity field. Matching is a case-insensitive substring test on the
//! unqualified name, configured once per process.

use crate::error::{FirewallError, FirewallResult};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_PASSWORD_SUBSTRING: &str = "password";
pub const DEFAULT_USER_SUBSTRING: &str = "user";

static GLOBAL: OnceLock<SensitiveNameChecker> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveNameChecker {
    password_substring: String,
    user_substring: String,
}

impl Default for SensitiveNameChecker {
    fn default() -> Self {
        Self {
            password_substring: DEFAULT_PASSWORD_SUBSTRING.to_string(),
            user_substring: DEFAULT_USER_SUBSTRING.to_string(),
        }
    }
}

impl SensitiveNameChecker {
    /// Build a checker from the two substrings. Empty substrings would match
    /// every name and are rejected.
    pub fn new(
        password_substring: impl Into<String>,
        user_substring: impl Into<String>,
    ) -> FirewallResult<Self> {
        let password_substring = password_substring.into().to_lowercase();
        let user_substring = user_substring.into().to_lowercase();
        if password_substring.is_empty() {
            return Err(FirewallError::config("password substring must not be empty"));
        }
        if user_substring.is_empty() {
            return Err(FirewallError::config("user substring must not be empty"));
        }
        Ok(Self {
            password_substring,
            user_substring,
        })
    }

    /// Install the process-wide checker. Returns false if one was already set.
    pub fn initialize(checker: SensitiveNameChecker) -> bool {
        GLOBAL.set(checker).is_ok()
    }

    /// The process-wide checker, falling back to the defaults.
    pub fn global() -> &'static SensitiveNameChecker {
        GLOBAL.get_or_init(SensitiveNameChecker::default)
    }

    pub fn password_substring(&self) -> &str {
        &self.password_substring
    }

    pub fn user_substring(&self) -> &str {
        &self.user_substring
    }

    pub fn is_password_field(&self, name: &str) -> bool {
        unqualified(name)
            .to_lowercase()
            .contains(&self.password_substring)
    }

    pub fn is_user_field(&self, name: &str) -> bool {
        unqualified(name).to_lowercase().contains(&self.user_substring)
    }
}

/// `db.table.column` -> `column`, with backticks stripped.
fn unqualified(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name).trim_matches('`')
}
