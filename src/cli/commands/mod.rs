//! Command implementations for the progmon CLI.
//!
//! This module contains the actual implementations of CLI commands,
//! separated from the argument parsing definitions in cli/mod.rs.

pub mod monitor;
pub mod track;

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use tracing::debug;

use crate::cli::{GlobalArgs, SourceArgs};
use crate::config::{ConfigError, MonitorConfig};
use crate::extract::{PatternError, Patterns};
use crate::render::StdoutTerminal;
use crate::runner::{
    install_interrupt_handler, Controller, RunError, RunOptions, RunResult, StopReason,
};
use crate::source::{FollowOptions, SourceSpec};

/// Error type for the display commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Error loading or validating configuration.
    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),
    /// The completion regex does not compile.
    #[error("{0}")]
    Pattern(#[from] PatternError),
    /// The progress log could not be opened.
    #[error("failed to open progress log {path}: {reason}")]
    OpenProgress {
        /// Path as given on the command line.
        path: String,
        /// Why it could not be opened.
        reason: String,
    },
    /// The monitor could not run.
    #[error("{0}")]
    Run(#[from] RunError),
}

/// Outcome of a display command.
#[derive(Debug)]
pub struct DisplayOutcome {
    /// Why the display stopped.
    pub stop_reason: StopReason,
    /// Number of redraws.
    pub frames: usize,
}

impl DisplayOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::SUCCESS
    }
}

impl From<RunResult> for DisplayOutcome {
    fn from(result: RunResult) -> Self {
        Self {
            stop_reason: result.stop_reason,
            frames: result.frames,
        }
    }
}

/// Load the config file and apply command-line overrides on top.
pub(crate) fn load_config(
    global: &GlobalArgs,
    source: &SourceArgs,
) -> Result<MonitorConfig, ConfigError> {
    let mut config = MonitorConfig::load(global.config.as_deref())?;

    if let Some(width) = source.bar_width {
        config.display.bar_width = width;
    }
    if let Some(ms) = global.tick_ms {
        config.timing.tick_ms = ms;
    }
    if let Some(ms) = global.poll_ms {
        config.timing.poll_ms = ms;
    }
    if let Some(wait) = global.wait {
        config.timing.wait = wait;
    }
    if let Some(pattern) = &source.done_pattern {
        config.patterns.done_pattern = pattern.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Base run options shared by both layouts.
pub(crate) fn base_options(
    config: &MonitorConfig,
    source: &SourceArgs,
    options: RunOptions,
    grace: Duration,
) -> RunOptions {
    options
        .with_bar_width(config.display.bar_width)
        .with_tick(config.timing.tick())
        .with_exit_on_done(source.exit_on_done, grace)
        .with_follow(FollowOptions {
            poll_interval: config.timing.poll_interval(),
            wait: config.timing.wait,
        })
}

/// Open the progress source and run the display on stdout until it stops.
pub(crate) fn run_display(
    source: &SourceArgs,
    patterns: Patterns,
    options: RunOptions,
) -> Result<DisplayOutcome, CommandError> {
    let spec = SourceSpec::from_arg(&source.path, source.follow, source.from_start);
    let progress = spec
        .open(&options.follow)
        .map_err(|e| CommandError::OpenProgress {
            path: spec.to_string(),
            reason: e.cause(),
        })?;
    debug!(source = %spec, layout = ?options.layout, "starting display");

    let mut controller = Controller::new(options, patterns, StdoutTerminal::new(), io::stderr());
    install_interrupt_handler(controller.interrupt_flag());

    let result = controller.run(progress)?;
    debug!(
        reason = %result.stop_reason,
        frames = result.frames,
        duration_ms = result.duration.as_millis() as u64,
        "display stopped"
    );
    Ok(result.into())
}

/// Compile the completion pattern from configuration.
pub(crate) fn patterns(config: &MonitorConfig) -> Result<Patterns, PatternError> {
    Patterns::with_done_pattern(&config.patterns.done_pattern)
}
