//! progmon - live terminal progress display for log files.
//!
//! This is the main entry point for the progmon CLI tool.

use clap::Parser;
use progmon::cli::{handle_result, Cli, CliResult, Commands};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PROGMON_LOG";

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the display on stdout.
    let filter = if cli.global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    let result: CliResult = match &cli.command {
        Commands::Track(c) => c.execute(&cli.global),
        Commands::Monitor(c) => c.execute(&cli.global),
    };

    handle_result(result)
}
