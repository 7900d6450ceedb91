//! Monitor runner.
//!
//! Wires line sources, the shared state and the renderer together. Reader
//! threads feed [`SharedState`](crate::state::SharedState); the
//! [`Controller`] ticks on the calling thread, repaints when something
//! changed and decides when to stop.

use std::path::PathBuf;
use std::time::Duration;

mod controller;
mod reader;

pub use controller::{install_interrupt_handler, Controller};
pub use reader::{
    spawn_latency_reader, spawn_progress_reader, ReaderError, ReaderHandle, ReaderRole,
    ReaderSummary,
};

use crate::render::{Layout, DEFAULT_BAR_WIDTH};
use crate::source::FollowOptions;
use crate::state::Snapshot;

/// Default render tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Options for one monitoring run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Which lines each redraw shows.
    pub layout: Layout,
    /// Progress bar width in cells.
    pub bar_width: usize,
    /// Render loop interval.
    pub tick: Duration,
    /// Stop once the producer signals completion.
    pub exit_on_done: bool,
    /// How long to keep rendering after completion before stopping.
    pub grace: Duration,
    /// Follow-mode settings for tailed files.
    pub follow: FollowOptions,
    /// Latency log to tail alongside the progress source.
    pub latency_log: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            layout: Layout::SingleLine,
            bar_width: DEFAULT_BAR_WIDTH,
            tick: DEFAULT_TICK,
            exit_on_done: false,
            grace: Duration::ZERO,
            follow: FollowOptions::default(),
            latency_log: None,
        }
    }
}

impl RunOptions {
    /// Options for the given layout with everything else at defaults.
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            ..Default::default()
        }
    }

    /// Set the bar width.
    pub fn with_bar_width(mut self, width: usize) -> Self {
        self.bar_width = width;
        self
    }

    /// Set the render tick.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Set exit-on-completion and its grace period.
    pub fn with_exit_on_done(mut self, exit_on_done: bool, grace: Duration) -> Self {
        self.exit_on_done = exit_on_done;
        self.grace = grace;
        self
    }

    /// Set follow-mode settings.
    pub fn with_follow(mut self, follow: FollowOptions) -> Self {
        self.follow = follow;
        self
    }

    /// Tail a latency log.
    pub fn with_latency_log(mut self, path: Option<PathBuf>) -> Self {
        self.latency_log = path;
        self
    }
}

/// Lifecycle of a [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Building state and spawning readers.
    Starting,
    /// Ticking: render, collect readers, check exit.
    Running,
    /// Cancelling readers and flushing the display.
    Draining,
    /// Done.
    Stopped,
}

/// Reasons for stopping the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The progress source ran out of input.
    InputExhausted,
    /// The producer signalled completion and the grace period passed.
    Completed,
    /// User interrupted (Ctrl+C).
    Interrupted,
    /// Writing to the display failed.
    OutputClosed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::InputExhausted => write!(f, "Progress input exhausted"),
            StopReason::Completed => write!(f, "Producer completed"),
            StopReason::Interrupted => write!(f, "User interrupted"),
            StopReason::OutputClosed => write!(f, "Output closed"),
        }
    }
}

/// Result of a monitoring run.
#[derive(Debug)]
pub struct RunResult {
    /// Why the run stopped.
    pub stop_reason: StopReason,
    /// Number of redraws.
    pub frames: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// State as of shutdown.
    pub final_state: Snapshot,
}

/// Error that prevented a run from completing.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A reader thread could not be started.
    #[error("Failed to spawn {role} reader: {source}")]
    Spawn {
        /// Which reader.
        role: ReaderRole,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The controller was asked to run a second time.
    #[error("Controller has already run")]
    AlreadyRun,
}
