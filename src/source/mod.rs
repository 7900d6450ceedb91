//! Line sources.
//!
//! A [`LineSource`] yields complete lines one at a time, either from a finite
//! stream that ends at EOF or from a file that keeps growing (follow mode).
//!
//! ## Follow mode
//!
//! Followed files are re-read on a short interval once the current end is
//! reached. With [`WaitStrategy::Notify`] a file watcher wakes the reader as
//! soon as the file changes; the interval still bounds every wait so the
//! cancellation flag is observed promptly.

mod follow;
mod stream;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelFlag;

pub use follow::{FollowSource, StartAt};
pub use stream::StreamSource;

/// Default interval between follow-mode polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Error reading from a line source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The file exists but could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading from an open source failed.
    #[error("read failed: {0}")]
    Read(#[from] io::Error),
}

impl SourceError {
    /// Map an open error for `path`, separating missing files from other failures.
    pub fn open(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            SourceError::NotFound(path.to_path_buf())
        } else {
            SourceError::Open {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// The failure without the path, for messages that already name the file.
    pub fn cause(&self) -> String {
        match self {
            SourceError::NotFound(_) => "no such file".to_string(),
            SourceError::Open { source, .. } => source.to_string(),
            SourceError::Read(e) => e.to_string(),
        }
    }
}

/// How a follow-mode reader waits for appended data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    /// Sleep for the poll interval, then re-read.
    #[default]
    Poll,
    /// Wake on file-change notifications, bounded by the poll interval.
    Notify,
}

/// Follow-mode tuning shared by every followed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowOptions {
    /// Longest time to wait before re-reading.
    pub poll_interval: Duration,
    /// How to wait for new data.
    pub wait: WaitStrategy,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait: WaitStrategy::Poll,
        }
    }
}

/// Something that yields lines.
pub trait LineSource: Send {
    /// Return the next complete line without its terminator.
    ///
    /// `Ok(None)` means the source is exhausted, or that `cancel` was set
    /// while waiting for more data.
    fn next_line(&mut self, cancel: &CancelFlag) -> Result<Option<String>, SourceError>;
}

/// Where the progress log comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Standard input, read once to EOF.
    Stdin,
    /// A named file.
    File {
        /// Path to the log file.
        path: PathBuf,
        /// Keep reading as the file grows.
        follow: bool,
        /// Where following starts.
        start: StartAt,
    },
}

impl SourceSpec {
    /// Interpret a positional path argument, where `-` means stdin.
    pub fn from_arg(path: &str, follow: bool, from_start: bool) -> Self {
        if path == "-" {
            return SourceSpec::Stdin;
        }
        SourceSpec::File {
            path: PathBuf::from(path),
            follow,
            start: if from_start {
                StartAt::Beginning
            } else {
                StartAt::End
            },
        }
    }

    /// Open the source.
    pub fn open(&self, options: &FollowOptions) -> Result<Box<dyn LineSource>, SourceError> {
        match self {
            SourceSpec::Stdin => Ok(Box::new(StreamSource::new(BufReader::new(io::stdin())))),
            SourceSpec::File {
                path,
                follow: true,
                start,
            } => Ok(Box::new(FollowSource::open(path, *start, options)?)),
            SourceSpec::File {
                path,
                follow: false,
                ..
            } => {
                let file = File::open(path).map_err(|e| SourceError::open(path, e))?;
                Ok(Box::new(StreamSource::new(BufReader::new(file))))
            }
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Stdin => write!(f, "<stdin>"),
            SourceSpec::File { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

/// Decode raw line bytes, replacing invalid UTF-8 and dropping the terminator.
pub(crate) fn decode_line(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    if end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && bytes[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
