//! Track command implementation.
//!
//! This module implements the `progmon track` command: a one-line display
//! with the log timestamp, bar and counters.

use std::time::Duration;

use crate::cli::{GlobalArgs, TrackCommand};
use crate::config::MonitorConfig;
use crate::render::Layout;
use crate::runner::RunOptions;

use super::{base_options, load_config, patterns, run_display, CommandError, DisplayOutcome};

/// Result type for track command operations.
pub type TrackCommandResult = Result<DisplayOutcome, CommandError>;

/// Execute the track command.
pub fn track(global: &GlobalArgs, cmd: &TrackCommand) -> TrackCommandResult {
    let config = load_config(global, &cmd.source)?;
    let patterns = patterns(&config)?;
    run_display(&cmd.source, patterns, track_options(&config, cmd))
}

// No grace period: with --exit-on-done the one-line display stops as soon as
// completion is seen.
fn track_options(config: &MonitorConfig, cmd: &TrackCommand) -> RunOptions {
    base_options(
        config,
        &cmd.source,
        RunOptions::new(Layout::SingleLine),
        Duration::ZERO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SourceArgs;

    #[test]
    fn test_track_options() {
        let cmd = TrackCommand {
            source: SourceArgs {
                exit_on_done: true,
                ..Default::default()
            },
        };
        let options = track_options(&MonitorConfig::default(), &cmd);
        assert_eq!(options.layout, Layout::SingleLine);
        assert_eq!(options.grace, Duration::ZERO);
        assert!(options.exit_on_done);
        assert!(options.latency_log.is_none());
    }

    #[test]
    fn test_track_missing_file_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = temp.path().join("empty.toml");
        std::fs::write(&config, "").unwrap();
        let global = GlobalArgs {
            config: Some(config),
            ..Default::default()
        };
        let cmd = TrackCommand {
            source: SourceArgs {
                path: temp.path().join("nope.log").to_string_lossy().into_owned(),
                ..Default::default()
            },
        };
        let err = track(&global, &cmd).unwrap_err();
        assert!(matches!(err, CommandError::OpenProgress { .. }));
    }
}
