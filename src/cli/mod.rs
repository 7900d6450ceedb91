//! CLI commands and argument handling.
//!
//! This module contains the clap CLI definitions. Command implementations
//! live in [`commands`].

pub mod commands;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use crossterm::tty::IsTty;

use crate::source::WaitStrategy;

/// Result of running a CLI command.
pub type CliResult = anyhow::Result<ExitCode>;

/// Live progress display for log files.
///
/// Tails a progress log (and optionally a latency log) and keeps a compact
/// progress bar up to date in the terminal.
#[derive(Parser, Debug)]
#[command(name = "progmon")]
#[command(author, version = crate::VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Options shared by every command.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands for progmon.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a one-line progress display.
    ///
    /// Each redraw shows the log timestamp, a bar, and the completed, queued
    /// and running counts.
    ///
    /// Examples:
    ///   app | progmon track          # Read progress from stdin
    ///   progmon track -f app.log     # Follow a growing log
    Track(TrackCommand),

    /// Show progress and latency statistics on two lines.
    ///
    /// The first line shows elapsed time and a bar; the second shows the
    /// latest, min, average and max latency from a second log.
    ///
    /// Examples:
    ///   progmon monitor -f app.log --latency-log lat.log
    ///   progmon monitor -f app.log --latency-log lat.log --exit-on-done --done-wait 5
    Monitor(MonitorCommand),
}

/// Options shared by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file (default: .progmon.toml if present).
    #[arg(short = 'c', long, global = true, env = "PROGMON_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Render interval in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Follow-mode poll interval in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub poll_ms: Option<u64>,

    /// How followed files wait for new data.
    #[arg(long, global = true, value_enum)]
    pub wait: Option<WaitStrategy>,

    /// Enable debug logging on stderr.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Arguments describing the progress source and display.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Progress log path, or '-' for stdin.
    #[arg(value_name = "PATH", default_value = "-")]
    pub path: String,

    /// Follow the file like `tail -f`.
    #[arg(short = 'f', long)]
    pub follow: bool,

    /// When following, read the existing contents first instead of starting
    /// at the end.
    #[arg(long)]
    pub from_start: bool,

    /// Progress bar width (default 40).
    #[arg(long, value_name = "N")]
    pub bar_width: Option<usize>,

    /// Regex marking the job as finished (default: 'Billings calculated in').
    #[arg(long, value_name = "REGEX")]
    pub done_pattern: Option<String>,

    /// Exit after completion is detected.
    #[arg(long)]
    pub exit_on_done: bool,
}

/// Arguments for the 'track' command.
#[derive(Args, Debug, Default)]
pub struct TrackCommand {
    /// Source and display options.
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for the 'monitor' command.
#[derive(Args, Debug, Default)]
pub struct MonitorCommand {
    /// Source and display options.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Latency log to follow.
    #[arg(long, value_name = "FILE")]
    pub latency_log: PathBuf,

    /// Seconds to keep updating after completion when --exit-on-done is set
    /// (default 3.0).
    #[arg(long, value_name = "SECS")]
    pub done_wait: Option<f64>,
}

impl TrackCommand {
    /// Execute the track command.
    pub fn execute(&self, global: &GlobalArgs) -> CliResult {
        let outcome = commands::track::track(global, self)?;
        Ok(outcome.exit_code())
    }
}

impl MonitorCommand {
    /// Execute the monitor command.
    pub fn execute(&self, global: &GlobalArgs) -> CliResult {
        let outcome = commands::monitor::monitor(global, self)?;
        Ok(outcome.exit_code())
    }
}

/// Turn a command result into a process exit code, printing any error.
pub fn handle_result(result: CliResult) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(e) => {
            if io::stderr().is_tty() {
                eprintln!("\x1b[31mError:\x1b[0m {e}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}
