//! Integration tests for the file-driven front end.

use sql_firewall::cli::{self, RunSummary};
use sql_firewall::{Config, SensitiveNameChecker};
use std::io::Write;
use tempfile::NamedTempFile;

fn statements_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    for line in lines {
        writeln!(file, "{line}").expect("Failed to write statement");
    }
    file.flush().expect("Failed to flush");
    file
}

fn run_file(file: &NamedTempFile, config: Config) -> (String, RunSummary) {
    let config = Config {
        file: Some(file.path().to_path_buf()),
        ..config
    };
    let names = config.name_checker().expect("valid substrings");
    let mut out = Vec::new();
    let summary = cli::run(&config, &names, &mut out).expect("run should succeed");
    (String::from_utf8(out).expect("utf-8 report"), summary)
}

#[test]
fn test_file_reports_only_invalid_statements() {
    let file = statements_file(&[
        "SELECT * FROM users WHERE id = 1",
        "",
        "SELECT * FROM users WHERE id = 1 OR 1 = 1",
        "SELECT * FROM users WHERE",
        "SELECT 1; SHUTDOWN",
        "UPDATE t SET a = 1",
    ]);
    let (out, summary) = run_file(&file, Config::default());
    assert_eq!(out, "SELECT * FROM users WHERE\nSELECT 1; SHUTDOWN\n");
    assert_eq!(
        summary,
        RunSummary {
            accepted: 3,
            rejected: 2
        }
    );
}

#[test]
fn test_file_with_crlf_line_endings() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(file, "SELECT 1\r\nSELEC 2\r\n").expect("Failed to write");
    file.flush().expect("Failed to flush");
    let (out, summary) = run_file(&file, Config::default());
    assert_eq!(out, "SELEC 2\n");
    assert_eq!(summary.accepted, 1);
}

#[test]
fn test_empty_file() {
    let file = statements_file(&[]);
    let (out, summary) = run_file(&file, Config::default());
    assert!(out.is_empty());
    assert_eq!(summary, RunSummary::default());
}

#[test]
fn test_missing_file_is_not_fatal() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = Config {
        file: Some(dir.path().join("missing.sql")),
        ..Config::default()
    };
    let mut out = Vec::new();
    let summary = cli::run(&config, &SensitiveNameChecker::default(), &mut out)
        .expect("missing file ends the run without an error");
    assert_eq!(summary, RunSummary::default());
    assert!(out.is_empty());
}
