//! Integration tests for locating parse failures.

use sql_firewall::parser::{UNKNOWN_LOCATION, parse_error_location};
use sql_firewall::{FirewallParser, SensitiveNameChecker, SqlDialect};

fn locate(sql: &str) -> String {
    let names = SensitiveNameChecker::default();
    FirewallParser::new(SqlDialect::Mysql, &names).error_location(sql)
}

/// Invalid mid-statement: the suffix from the failing token, space-joined.
#[test]
fn test_location_is_unreduced_suffix() {
    let sql = "SELECT id FROM users WHERE id = 1 UNION SELECT password FROM users AS WHERE 1 = 1";
    let names = SensitiveNameChecker::default();
    let parser = FirewallParser::new(SqlDialect::Mysql, &names);
    assert!(parser.parse(sql).is_err());
    assert_eq!(parser.error_location(sql), "WHERE 1 = 1");
}

#[test]
fn test_location_normalises_spacing() {
    assert_eq!(locate("SELECT  a\n FROM t  t2  t3   WHERE\tb"), "t3 WHERE b");
}

#[test]
fn test_location_keeps_literal_text() {
    assert_eq!(
        locate("SELECT * FROM t WHERE a = 1 'x' OR \"y\""),
        "'x' OR \"y\""
    );
}

#[test]
fn test_stacked_query_location() {
    assert_eq!(
        locate("SELECT * FROM t; DELETE FROM t"),
        "DELETE FROM t"
    );
}

#[test]
fn test_location_of_first_token() {
    assert_eq!(locate("GRANT ALL ON *.* TO x"), "GRANT ALL ON * . * TO x");
}

#[test]
fn test_no_location_for_valid_or_truncated() {
    assert_eq!(locate("SELECT 1"), "");
    assert_eq!(locate("SELECT * FROM t WHERE"), "");
    assert_eq!(locate(""), "");
}

#[test]
fn test_unknown_location_when_unscannable() {
    assert_eq!(locate("SELECT \"never closed"), UNKNOWN_LOCATION);
    assert_eq!(
        parse_error_location("SELECT 'x", SqlDialect::Generic, &SensitiveNameChecker::default()),
        "(unknown)"
    );
}
