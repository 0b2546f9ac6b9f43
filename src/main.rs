//! SQL firewall - Main entry point.
//!
//! Reads SQL statements one per line and reports the ones that look like
//! injection, authentication bypass or reconnaissance attempts.

use sql_firewall::cli;
use sql_firewall::config::Config;
use sql_firewall::sensitive::SensitiveNameChecker;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging. Logs go to stderr so the
/// report on stdout stays clean.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let names = config.name_checker()?;
    if !SensitiveNameChecker::initialize(names) {
        warn!("Sensitive-name checker was already initialized");
    }

    info!(
        dialect = %config.dialect,
        interactive = config.is_interactive(),
        "Starting sql-firewall v{}",
        env!("CARGO_PKG_VERSION")
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = cli::run(&config, SensitiveNameChecker::global(), &mut out) {
        error!(error = %e, "Run failed");
        return Err(e.into());
    }

    Ok(())
}
