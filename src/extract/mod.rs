//! Line extraction.
//!
//! This module turns raw log lines into typed records. All matching goes
//! through a [`Patterns`] value that is compiled once at startup and shared
//! by reference, so extraction itself is stateless.
//!
//! ## Line grammar
//!
//! - **Progress**: `HH:MM:SS.fff ... total size = N, in queue = N, running = N`
//! - **Latency**: `... took Nus` (first occurrence on the line wins)
//! - **Completion**: `HH:MM:SS.fff ... <done pattern>`

use regex::Regex;

/// Default phrase that marks the monitored job as finished.
pub const DEFAULT_DONE_PATTERN: &str = "Billings calculated in";

// `[0-9]` rather than `\d`: the timestamp is echoed to the display and must
// stay ASCII.
const PROGRESS_PATTERN: &str = r"(?P<time>[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]+).*total size = (?P<total>[0-9]+), in queue = (?P<queue>[0-9]+), running = (?P<running>[0-9]+)";
const LATENCY_PATTERN: &str = r"took\s+(?P<latency>[0-9]+)us";

/// Error building the pattern set.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// The user-supplied completion pattern is not a valid regex.
    #[error("Invalid done pattern '{pattern}': {source}")]
    InvalidDonePattern {
        /// The pattern as given.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// One progress line as it appeared in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    /// Timestamp text from the start of the line (`HH:MM:SS.fff`).
    pub time: String,
    /// Total number of work items.
    pub total: u64,
    /// Items still waiting in the queue.
    pub queue: u64,
    /// Items currently being processed.
    pub running: u64,
}

impl ProgressRecord {
    /// Items finished so far, `total - queue - running` clamped at zero.
    pub fn completed(&self) -> u64 {
        self.total
            .saturating_sub(self.queue)
            .saturating_sub(self.running)
    }

    /// Completion percentage, or `0.0` when the total is zero.
    pub fn percent(&self) -> f64 {
        percent_of(self.completed(), self.total)
    }
}

/// Compute `completed / total * 100`, returning `0.0` for an empty total.
pub fn percent_of(completed: u64, total: u64) -> f64 {
    if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// A completion marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMarker {
    /// Timestamp text of the marker line.
    pub time: String,
}

/// Compiled matchers for every line shape the monitor understands.
#[derive(Debug, Clone)]
pub struct Patterns {
    progress: Regex,
    latency: Regex,
    done: Regex,
}

impl Patterns {
    /// Build the pattern set with the default completion phrase.
    pub fn new() -> Self {
        Self::with_done_pattern(&regex::escape(DEFAULT_DONE_PATTERN))
            .expect("DEFAULT_DONE_PATTERN regex is valid")
    }

    /// Build the pattern set with a custom completion regex.
    ///
    /// The pattern is matched anywhere after a line timestamp.
    pub fn with_done_pattern(pattern: &str) -> Result<Self, PatternError> {
        let done = Regex::new(&format!(
            r"(?P<time>[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}\.[0-9]+).*(?:{pattern})"
        ))
        .map_err(|source| PatternError::InvalidDonePattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            progress: Regex::new(PROGRESS_PATTERN).expect("PROGRESS_PATTERN regex is valid"),
            latency: Regex::new(LATENCY_PATTERN).expect("LATENCY_PATTERN regex is valid"),
            done,
        })
    }

    /// Extract a progress record from a line.
    ///
    /// Returns `None` for lines without the full timestamp and counter triple,
    /// and for counters that do not fit in a `u64`.
    pub fn progress(&self, line: &str) -> Option<ProgressRecord> {
        let caps = self.progress.captures(line)?;
        Some(ProgressRecord {
            time: caps.name("time")?.as_str().to_string(),
            total: caps.name("total")?.as_str().parse().ok()?,
            queue: caps.name("queue")?.as_str().parse().ok()?,
            running: caps.name("running")?.as_str().parse().ok()?,
        })
    }

    /// Extract the first latency sample (in microseconds) from a line.
    pub fn latency(&self, line: &str) -> Option<u64> {
        self.latency
            .captures(line)?
            .name("latency")?
            .as_str()
            .parse()
            .ok()
    }

    /// Detect a completion marker.
    pub fn completion(&self, line: &str) -> Option<CompletionMarker> {
        let caps = self.done.captures(line)?;
        Some(CompletionMarker {
            time: caps.name("time")?.as_str().to_string(),
        })
    }

    /// Classify a progress-log line.
    ///
    /// Completion markers win over progress records on the same line.
    pub fn classify(&self, line: &str) -> Option<LineEvent> {
        if let Some(marker) = self.completion(line) {
            return Some(LineEvent::Completion(marker));
        }
        self.progress(line).map(LineEvent::Progress)
    }
}

impl Default for Patterns {
    fn default() -> Self {
        Self::new()
    }
}

/// What a progress-log line told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A progress counter update.
    Progress(ProgressRecord),
    /// The monitored job reported completion.
    Completion(CompletionMarker),
}
