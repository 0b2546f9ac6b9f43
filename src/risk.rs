//! Per-statement risk-score record.
//!
//! A `QueryRisk` is created for each statement, filled in by the lexer
//! (comments) and by grammar actions (everything else), and read once by the
//! classifier after parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a password field is compared against something trivially satisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmptyPassword {
    #[default]
    PasswordNotUsed,
    PasswordEmpty,
}

impl EmptyPassword {
    /// The more severe of two findings.
    pub fn max(self, other: Self) -> Self {
        if self == Self::PasswordEmpty || other == Self::PasswordEmpty {
            Self::PasswordEmpty
        } else {
            Self::PasswordNotUsed
        }
    }
}

impl fmt::Display for EmptyPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PasswordNotUsed => write!(f, "PASSWORD_NOT_USED"),
            Self::PasswordEmpty => write!(f, "PASSWORD_EMPTY"),
        }
    }
}

/// Top-level statement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Show,
    Describe,
    Use,
    Transaction,
    Set,
    #[default]
    Unknown,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Use => "USE",
            Self::Transaction => "TRANSACTION",
            Self::Set => "SET",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRisk {
    /// Cleared as soon as the lexer or grammar hits an unrecoverable error.
    pub valid: bool,
    pub query_type: QueryType,
    pub empty_password: EmptyPassword,
    /// A password field was tested with `IN (...)`.
    pub password_in_list: bool,
    /// Some sub-clause of a condition is always true (`... OR 1=1`).
    pub always_true: bool,
    /// The whole condition is always true.
    pub always_true_conditional: bool,
    pub or_statements: u32,
    pub union_statements: u32,
    pub union_all_statements: u32,
    pub join_statements: u32,
    pub cross_join_statements: u32,
    pub multi_line_comments: u32,
    pub hash_comments: u32,
    pub dash_dash_comments: u32,
    /// `/*! ... */`
    pub my_sql_comments: u32,
    /// `/*!50000 ... */`
    pub my_sql_versioned_comments: u32,
    pub hex_strings: u32,
    pub sensitive_tables: u32,
    pub information_schema: bool,
    pub user_table: bool,
    pub benchmark_statements: u32,
    pub user_statements: u32,
    pub fingerprinting_statements: u32,
    pub string_manipulation_statements: u32,
    pub if_statements: u32,
    pub global_variables: u32,
    pub order_by_number: bool,
    pub select_all: bool,
}

impl Default for QueryRisk {
    fn default() -> Self {
        Self {
            valid: true,
            query_type: QueryType::Unknown,
            empty_password: EmptyPassword::PasswordNotUsed,
            password_in_list: false,
            always_true: false,
            always_true_conditional: false,
            or_statements: 0,
            union_statements: 0,
            union_all_statements: 0,
            join_statements: 0,
            cross_join_statements: 0,
            multi_line_comments: 0,
            hash_comments: 0,
            dash_dash_comments: 0,
            my_sql_comments: 0,
            my_sql_versioned_comments: 0,
            hex_strings: 0,
            sensitive_tables: 0,
            information_schema: false,
            user_table: false,
            benchmark_statements: 0,
            user_statements: 0,
            fingerprinting_statements: 0,
            string_manipulation_statements: 0,
            if_statements: 0,
            global_variables: 0,
            order_by_number: false,
            select_all: false,
        }
    }
}

impl QueryRisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the findings of a completed grammar pass into this record.
    ///
    /// Counters add up, flags are or-ed, the statement type is taken from
    /// `other` when it knows one. Validity is and-ed.
    pub fn merge(&mut self, other: &QueryRisk) {
        self.valid &= other.valid;
        if other.query_type != QueryType::Unknown {
            self.query_type = other.query_type;
        }
        self.empty_password = self.empty_password.max(other.empty_password);
        self.password_in_list |= other.password_in_list;
        self.always_true |= other.always_true;
        self.always_true_conditional |= other.always_true_conditional;
        self.or_statements += other.or_statements;
        self.union_statements += other.union_statements;
        self.union_all_statements += other.union_all_statements;
        self.join_statements += other.join_statements;
        self.cross_join_statements += other.cross_join_statements;
        self.multi_line_comments += other.multi_line_comments;
        self.hash_comments += other.hash_comments;
        self.dash_dash_comments += other.dash_dash_comments;
        self.my_sql_comments += other.my_sql_comments;
        self.my_sql_versioned_comments += other.my_sql_versioned_comments;
        self.hex_strings += other.hex_strings;
        self.sensitive_tables += other.sensitive_tables;
        self.information_schema |= other.information_schema;
        self.user_table |= other.user_table;
        self.benchmark_statements += other.benchmark_statements;
        self.user_statements += other.user_statements;
        self.fingerprinting_statements += other.fingerprinting_statements;
        self.string_manipulation_statements += other.string_manipulation_statements;
        self.if_statements += other.if_statements;
        self.global_variables += other.global_variables;
        self.order_by_number |= other.order_by_number;
        self.select_all |= other.select_all;
    }

    /// Total number of comments of any style.
    pub fn comments(&self) -> u32 {
        self.multi_line_comments
            + self.hash_comments
            + self.dash_dash_comments
            + self.my_sql_comments
            + self.my_sql_versioned_comments
    }

    /// True when any authentication-bypass signal fired.
    pub fn is_auth_bypass_suspect(&self) -> bool {
        self.empty_password == EmptyPassword::PasswordEmpty
            || (self.user_table && (self.always_true || self.comments() > 0))
    }
}

impl fmt::Display for QueryRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QueryRisk {{")?;
        writeln!(f, "  valid: {}", self.valid)?;
        writeln!(f, "  queryType: {}", self.query_type)?;
        writeln!(f, "  emptyPassword: {}", self.empty_password)?;
        writeln!(f, "  passwordInList: {}", self.password_in_list)?;
        writeln!(f, "  alwaysTrue: {}", self.always_true)?;
        writeln!(f, "  alwaysTrueConditional: {}", self.always_true_conditional)?;
        writeln!(f, "  orStatements: {}", self.or_statements)?;
        writeln!(f, "  unionStatements: {}", self.union_statements)?;
        writeln!(f, "  unionAllStatements: {}", self.union_all_statements)?;
        writeln!(f, "  joinStatements: {}", self.join_statements)?;
        writeln!(f, "  crossJoinStatements: {}", self.cross_join_statements)?;
        writeln!(f, "  multiLineComments: {}", self.multi_line_comments)?;
        writeln!(f, "  hashComments: {}", self.hash_comments)?;
        writeln!(f, "  dashDashComments: {}", self.dash_dash_comments)?;
        writeln!(f, "  mySqlComments: {}", self.my_sql_comments)?;
        writeln!(f, "  mySqlVersionedComments: {}", self.my_sql_versioned_comments)?;
        writeln!(f, "  hexStrings: {}", self.hex_strings)?;
        writeln!(f, "  sensitiveTables: {}", self.sensitive_tables)?;
        writeln!(f, "  informationSchema: {}", self.information_schema)?;
        writeln!(f, "  userTable: {}", self.user_table)?;
        writeln!(f, "  benchmarkStatements: {}", self.benchmark_statements)?;
        writeln!(f, "  userStatements: {}", self.user_statements)?;
        writeln!(f, "  fingerprintingStatements: {}", self.fingerprinting_statements)?;
        writeln!(
            f,
            "  stringManipulationStatements: {}",
            self.string_manipulation_statements
        )?;
        writeln!(f, "  ifStatements: {}", self.if_statements)?;
        writeln!(f, "  globalVariables: {}", self.global_variables)?;
        writeln!(f, "  orderByNumber: {}", self.order_by_number)?;
        writeln!(f, "  selectAll: {}", self.select_all)?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_valid_and_clean() {
        let risk = QueryRisk::new();
        assert!(risk.valid);
        assert_eq!(risk.query_type, QueryType::Unknown);
        assert_eq!(risk.empty_password, EmptyPassword::PasswordNotUsed);
        assert_eq!(risk.comments(), 0);
        assert!(!risk.is_auth_bypass_suspect());
    }

    #[test]
    fn test_merge_adds_counters_and_ors_flags() {
        let mut base = QueryRisk::new();
        base.hash_comments = 1;

        let mut grammar = QueryRisk::new();
        grammar.query_type = QueryType::Select;
        grammar.or_statements = 2;
        grammar.always_true = true;
        grammar.empty_password = EmptyPassword::PasswordEmpty;

        base.merge(&grammar);
        assert_eq!(base.query_type, QueryType::Select);
        assert_eq!(base.or_statements, 2);
        assert_eq!(base.hash_comments, 1);
        assert!(base.always_true);
        assert_eq!(base.empty_password, EmptyPassword::PasswordEmpty);
        assert!(base.valid);
    }

    #[test]
    fn test_merge_keeps_invalid() {
        let mut base = QueryRisk::new();
        base.valid = false;
        base.merge(&QueryRisk::new());
        assert!(!base.valid);
    }

    #[test]
    fn test_empty_password_max() {
        use EmptyPassword::*;
        assert_eq!(PasswordNotUsed.max(PasswordNotUsed), PasswordNotUsed);
        assert_eq!(PasswordNotUsed.max(PasswordEmpty), PasswordEmpty);
        assert_eq!(PasswordEmpty.max(PasswordNotUsed), PasswordEmpty);
    }

    #[test]
    fn test_auth_bypass_suspect() {
        let mut risk = QueryRisk::new();
        risk.user_table = true;
        assert!(!risk.is_auth_bypass_suspect());
        risk.dash_dash_comments = 1;
        assert!(risk.is_auth_bypass_suspect());
    }

    #[test]
    fn test_json_serialization() {
        let mut risk = QueryRisk::new();
        risk.empty_password = EmptyPassword::PasswordEmpty;
        let json = serde_json::to_value(&risk).unwrap();
        assert_eq!(json["empty_password"], "PASSWORD_EMPTY");
        assert_eq!(json["query_type"], "unknown");
        assert_eq!(json["valid"], true);
    }

    #[test]
    fn test_display_lists_fields() {
        let text = QueryRisk::new().to_string();
        assert!(text.starts_with("QueryRisk {"));
        assert!(text.contains("emptyPassword: PASSWORD_NOT_USED"));
        assert!(text.ends_with('}'));
    }
}
