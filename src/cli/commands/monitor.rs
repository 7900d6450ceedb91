//! Monitor command implementation.
//!
//! This module implements the `progmon monitor` command: elapsed time and a
//! bar on the first line, latency statistics from a second log below it.

use crate::cli::{GlobalArgs, MonitorCommand};
use crate::config::{ConfigError, MonitorConfig};
use crate::render::Layout;
use crate::runner::RunOptions;

use super::{base_options, load_config, patterns, run_display, CommandError, DisplayOutcome};

/// Result type for monitor command operations.
pub type MonitorCommandResult = Result<DisplayOutcome, CommandError>;

/// Execute the monitor command.
pub fn monitor(global: &GlobalArgs, cmd: &MonitorCommand) -> MonitorCommandResult {
    let mut config = load_config(global, &cmd.source)?;
    if let Some(secs) = cmd.done_wait {
        config.timing.done_wait_secs = secs;
        config.validate().map_err(|e| match e {
            ConfigError::InvalidValue { reason, .. } => ConfigError::InvalidValue {
                key: "--done-wait",
                reason,
            },
            other => other,
        })?;
    }
    let patterns = patterns(&config)?;
    run_display(&cmd.source, patterns, monitor_options(&config, cmd))
}

fn monitor_options(config: &MonitorConfig, cmd: &MonitorCommand) -> RunOptions {
    base_options(
        config,
        &cmd.source,
        RunOptions::new(Layout::TwoLine),
        config.timing.done_wait(),
    )
    .with_latency_log(Some(cmd.latency_log.clone()))
}
