//! Black-box fuzzing of the parser and the error re-scan.
//!
//! This test suite generates random, malicious, and edge-case inputs
//! and checks that nothing panics and that every failure yields a location.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use sql_firewall::{FirewallParser, SensitiveNameChecker, SqlDialect};
use std::time::{Duration, Instant};

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),                          // Empty
        " ".to_string(),                        // Single space
        "\n\r\t".to_string(),                   // Whitespace chars
        "\0".to_string(),                       // Null byte
        "üöÄ".repeat(100),                       // Unicode
        "'OR 1=1--".to_string(),                // SQL injection
        "'; DROP TABLE users--".to_string(),    // Stacked query
        "a".repeat(10000),                      // Very long word
        "(".repeat(5000),                       // Deep nesting
        "SELECT ".to_string() + &"(".repeat(1000) + "1" + &")".repeat(1000),
        "SELECT ".to_string() + &"-".repeat(1000) + "1",
        "SELECT ".to_string() + &"NOT ".repeat(1000) + "1",
        random_string(100),
        random_string(1000),
        "\u{0000}\u{FFFF}".to_string(), // Special unicode
        "';SELECT * FROM information_schema.tables--".to_string(),
        "1' UNION SELECT NULL, NULL--".to_string(),
        "/*!".to_string(),
        "/* unterminated".to_string(),
        "SELECT 0x".to_string(),
        "SELECT X'zz'".to_string(),
        "SELECT @@".to_string(),
        "SELECT 1e999999 * 1e999999 / 0".to_string(),
        "SELECT ~18446744073709551615 << 64".to_string(),
        "\x00\x01\x02".to_string(), // Binary data
    ]
}

/// Statements shaped to stress evaluation and nesting limits
fn adversarial_statements() -> Vec<String> {
    let condition = |body: String| format!("SELECT * FROM users WHERE {body}");
    vec![
        condition(format!("1{} = 41", "+1".repeat(40))),        // Arithmetic chain
        condition(format!("1{}", "=1".repeat(40))),             // Comparison chain
        condition(format!("1{}", "+1".repeat(300))),            // Past the height limit
        condition(format!("id = 1{}", " OR 1 = 1".repeat(100))),
        condition(format!("1 = 1{}", " AND id = 1".repeat(100))),
        condition(format!("{}1 = 1", "NOT ".repeat(120))),      // Near the depth limit
        condition(format!("{}1 = 1", "NOT ".repeat(130))),
        condition(format!("{}1{}", "(".repeat(127), ")".repeat(127))),
        condition(format!("{}1{}", "(".repeat(129), ")".repeat(129))),
        condition(format!("{}1{}", "(1 + ".repeat(100), ")".repeat(100))),
        condition(format!("'{}' LIKE '{}b'", "a".repeat(60), "%a".repeat(10))),
        condition(format!("'{}' LIKE '{}'", "a".repeat(2000), "%_".repeat(500))),
        condition(format!("name NOT LIKE '{}'", "%".repeat(1000))),
        format!("SELECT 1{}", " UNION SELECT 1".repeat(100)),
        format!("SELECT 1{}", " UNION ALL SELECT 1".repeat(300)),
    ]
}

/// Fragments that recombine into plausible and implausible SQL.
const FRAGMENTS: &[&str] = &[
    "SELECT", "*", "FROM", "users", "WHERE", "id", "=", "1", "'a'", "OR", "AND", "NOT", "(",
    ")", ",", "IN", "BETWEEN", "LIKE", "IS", "NULL", "UNION", "ALL", "JOIN", "ON", "ORDER",
    "BY", "LIMIT", ";", "--", "#", "/**/", "@@version", "CONCAT(", "X'41'", "?", "password",
    "''", "CASE", "WHEN", "THEN", "END", "-", "+", "/", "<=>", "||", "&&", "INSERT", "INTO",
    "VALUES", "SET", "UPDATE", "DELETE", "EXISTS",
];

fn random_statement(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(1..40);
    (0..len)
        .filter_map(|_| FRAGMENTS.choose(rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn assert_no_panic(parser: &FirewallParser<'_>, sql: &str) {
    match parser.parse(sql) {
        Ok(parsed) => {
            assert!(parsed.risk.valid, "accepted statement marked invalid: {sql:?}");
            // Every condition answers the contract without panicking
            for cond in parsed.conditions() {
                let e = parsed.ast.expr(cond);
                let _ = e.any_is_always_true();
                let _ = e.is_always_true_or_false() && e.is_always_true();
                if e.results_in_value() {
                    let _ = e.value();
                }
            }
            let _ = parsed.render();
        }
        Err(e) => {
            assert!(e.is_unparseable(), "unexpected error kind for {sql:?}: {e}");
            let _ = parser.error_location(sql);
        }
    }
}

#[test]
fn fuzz_edge_case_strings() {
    let names = SensitiveNameChecker::default();
    for dialect in [SqlDialect::Mysql, SqlDialect::Generic, SqlDialect::Postgres, SqlDialect::Sqlite] {
        let parser = FirewallParser::new(dialect, &names);
        for sql in edge_case_strings() {
            assert_no_panic(&parser, &sql);
        }
    }
}

#[test]
fn fuzz_adversarial_statements_finish() {
    let names = SensitiveNameChecker::default();
    let parser = FirewallParser::new(SqlDialect::Mysql, &names);
    for sql in adversarial_statements() {
        let start = Instant::now();
        assert_no_panic(&parser, &sql);
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_secs(5),
            "took {elapsed:?}: {}",
            &sql[..sql.len().min(80)]
        );
    }
}

#[test]
fn fuzz_random_fragments() {
    let names = SensitiveNameChecker::default();
    let parser = FirewallParser::new(SqlDialect::Mysql, &names);
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let sql = random_statement(&mut rng);
        assert_no_panic(&parser, &sql);
    }
}

#[test]
fn fuzz_random_bytes() {
    let names = SensitiveNameChecker::default();
    let parser = FirewallParser::new(SqlDialect::Mysql, &names);
    let mut rng = rand::thread_rng();
    for _ in 0..300 {
        let len = rng.gen_range(0..64);
        let sql: String = (0..len)
            .map(|_| char::from(rng.gen_range(0x20u8..0x7f)))
            .collect();
        assert_no_panic(&parser, &sql);
    }
}

#[test]
fn fuzz_rejections_point_inside_statement() {
    let names = SensitiveNameChecker::default();
    let parser = FirewallParser::new(SqlDialect::Mysql, &names);
    let mut rng = rand::thread_rng();
    for _ in 0..300 {
        let sql = random_statement(&mut rng);
        if parser.parse(&sql).is_err() {
            let location = parser.error_location(&sql);
            let first = location.split(' ').next().unwrap_or_default();
            assert!(
                location.is_empty() || sql.contains(first) || location == "(unknown)",
                "{location:?} is not part of {sql:?}"
            );
        }
    }
}
