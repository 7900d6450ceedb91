//! progmon - live terminal progress display for log files.
//!
//! This library tails a progress log (and optionally a latency log), extracts
//! progress records and latency samples, and keeps a one- or two-line display
//! up to date in place.
//!
//! The pieces, in data-flow order:
//!
//! - [`source`]: line sources over stdin, finite files and followed files.
//! - [`extract`]: regex extraction of progress records, completion markers
//!   and latency samples.
//! - [`state`]: the state shared between reader threads and the renderer.
//! - [`render`]: line formatting and in-place terminal repaints.
//! - [`runner`]: reader threads and the render loop controller.

#![deny(missing_docs)]

/// Version string from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cancel;
pub mod cli;
pub mod config;
pub mod extract;
pub mod render;
pub mod runner;
pub mod source;
pub mod state;

// Re-export key types for convenience
pub use extract::Patterns;
pub use runner::{Controller, RunOptions, RunResult, StopReason};
