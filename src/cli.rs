//! Line-oriented front end: one statement per line, from a file or stdin.
//!
//! Interactive sessions print the fingerprint and risk record of every
//! statement. File runs stay quiet for statements that parse and echo the
//! ones that do not, so the output is a list of lines needing attention.

use crate::config::{Config, DEFAULT_PROMPT};
use crate::error::{FirewallError, FirewallResult};
use crate::parser::FirewallParser;
use crate::sensitive::SensitiveNameChecker;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use tracing::{debug, error, info, warn};

/// Counts of statements seen in one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Reporter<'n> {
    parser: FirewallParser<'n>,
    json: bool,
    interactive: bool,
}

impl<'n> Reporter<'n> {
    pub fn new(parser: FirewallParser<'n>, json: bool, interactive: bool) -> Self {
        Self {
            parser,
            json,
            interactive,
        }
    }

    /// Read statements from `input` until end-of-input. Empty lines are skipped.
    pub fn run_stream<R: BufRead, W: Write>(
        &self,
        mut input: R,
        out: &mut W,
    ) -> FirewallResult<RunSummary> {
        let mut summary = RunSummary::default();
        let mut line = String::new();
        loop {
            if self.interactive {
                write!(out, "{DEFAULT_PROMPT}")
                    .and_then(|_| out.flush())
                    .map_err(|e| FirewallError::io("<stdout>", e))?;
            }

            line.clear();
            let read = input
                .read_line(&mut line)
                .map_err(|e| FirewallError::io("<input>", e))?;
            if read == 0 {
                if self.interactive {
                    writeln!(out).map_err(|e| FirewallError::io("<stdout>", e))?;
                }
                return Ok(summary);
            }

            let statement = line.trim();
            if statement.is_empty() {
                continue;
            }
            self.check(statement, out, &mut summary)
                .map_err(|e| FirewallError::io("<stdout>", e))?;
        }
    }

    /// Parse and report one statement.
    pub fn check<W: Write>(
        &self,
        statement: &str,
        out: &mut W,
        summary: &mut RunSummary,
    ) -> io::Result<()> {
        match self.parser.parse(statement) {
            Ok(parsed) => {
                summary.accepted += 1;
                let risk = &parsed.risk;
                debug!(
                    hash = %parsed.hash,
                    query_type = %risk.query_type,
                    always_true = risk.always_true,
                    "Statement parsed"
                );
                if risk.is_auth_bypass_suspect() {
                    warn!(hash = %parsed.hash, "Possible authentication bypass");
                }
                if self.interactive {
                    writeln!(out, "Hash: {}", parsed.hash)?;
                    if self.json {
                        writeln!(out, "{}", serde_json::to_string_pretty(risk)?)?;
                    } else {
                        writeln!(out, "{risk}")?;
                    }
                }
            }
            Err(e) => {
                summary.rejected += 1;
                let location = self.parser.error_location(statement);
                info!(error = %e, %location, "Statement rejected");
                if self.interactive {
                    writeln!(out, "Invalid: \"{statement}\"")?;
                    writeln!(out, "Parsing failed near '{location}'")?;
                } else {
                    writeln!(out, "{statement}")?;
                }
            }
        }
        Ok(())
    }
}

/// Run the front end described by `config`, writing the report to `out`.
///
/// A file that cannot be opened is reported and ends the run early without
/// failing it.
pub fn run<W: Write>(
    config: &Config,
    names: &SensitiveNameChecker,
    out: &mut W,
) -> FirewallResult<RunSummary> {
    let parser = FirewallParser::new(config.dialect, names);
    let summary = match &config.file {
        Some(path) => {
            let file = match File::open(path) {
                Ok(file) => file,
                Err(e) => {
                    let err = FirewallError::io(path.display().to_string(), e);
                    error!(error = %err, "Could not open statement file");
                    eprintln!("{err}");
                    return Ok(RunSummary::default());
                }
            };
            Reporter::new(parser, config.json, false).run_stream(BufReader::new(file), out)?
        }
        None => Reporter::new(parser, config.json, true).run_stream(io::stdin().lock(), out)?,
    };
    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        "Finished reading statements"
    );
    Ok(summary)
}
