//! Reader threads.
//!
//! Each source gets its own thread that pulls lines, extracts records and
//! merges them into the shared state. Readers never wait on each other; a
//! reader that fails only ends itself.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::cancel::CancelFlag;
use crate::extract::{LineEvent, Patterns};
use crate::source::{FollowOptions, FollowSource, LineSource, SourceError, StartAt};
use crate::state::SharedState;

/// Which stream a reader consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderRole {
    /// The progress log.
    Progress,
    /// The latency log.
    Latency,
}

impl std::fmt::Display for ReaderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderRole::Progress => write!(f, "progress"),
            ReaderRole::Latency => write!(f, "latency"),
        }
    }
}

/// Error that ended a reader thread.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The latency log did not exist at startup.
    #[error("latency log not found: {}", .0.display())]
    LatencyLogMissing(PathBuf),
    /// Reading the source failed.
    #[error("{role} log: {source}")]
    Source {
        /// Which reader failed.
        role: ReaderRole,
        /// Underlying source error.
        #[source]
        source: SourceError,
    },
}

/// What a reader did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    /// Lines read.
    pub lines: u64,
    /// Lines that produced a record.
    pub records: u64,
}

/// Handle to a running reader thread.
pub type ReaderHandle = JoinHandle<Result<ReaderSummary, ReaderError>>;

/// Start the progress reader.
///
/// When the source runs dry without cancellation, the end of input is merged
/// into the state as completion.
pub fn spawn_progress_reader(
    mut source: Box<dyn LineSource>,
    patterns: Arc<Patterns>,
    state: Arc<SharedState>,
    cancel: CancelFlag,
) -> io::Result<ReaderHandle> {
    thread::Builder::new()
        .name("progress-reader".to_string())
        .spawn(move || {
            let mut summary = ReaderSummary::default();
            while let Some(line) = source.next_line(&cancel).map_err(|err| ReaderError::Source {
                role: ReaderRole::Progress,
                source: err,
            })? {
                summary.lines += 1;
                match patterns.classify(&line) {
                    Some(LineEvent::Progress(record)) => {
                        summary.records += 1;
                        state.record_progress(&record);
                    }
                    Some(LineEvent::Completion(marker)) => {
                        summary.records += 1;
                        debug!(time = %marker.time, "completion marker");
                        state.record_completion(&marker);
                    }
                    None => trace!(line = %line, "ignored progress line"),
                }
            }

            if !cancel.is_cancelled() {
                debug!(lines = summary.lines, "progress input exhausted");
                state.finish_progress();
            }
            Ok(summary)
        })
}

/// Start the latency reader, following `path` from its current end.
///
/// A missing file ends the reader with [`ReaderError::LatencyLogMissing`].
pub fn spawn_latency_reader(
    path: &Path,
    options: FollowOptions,
    patterns: Arc<Patterns>,
    state: Arc<SharedState>,
    cancel: CancelFlag,
) -> io::Result<ReaderHandle> {
    let path = path.to_path_buf();
    thread::Builder::new()
        .name("latency-reader".to_string())
        .spawn(move || {
            let mut source = match FollowSource::open(&path, StartAt::End, &options) {
                Ok(source) => source,
                Err(SourceError::NotFound(_)) => return Err(ReaderError::LatencyLogMissing(path)),
                Err(err) => {
                    return Err(ReaderError::Source {
                        role: ReaderRole::Latency,
                        source: err,
                    })
                }
            };

            let mut summary = ReaderSummary::default();
            while let Some(line) = source.next_line(&cancel).map_err(|err| ReaderError::Source {
                role: ReaderRole::Latency,
                source: err,
            })? {
                summary.lines += 1;
                if let Some(micros) = patterns.latency(&line) {
                    summary.records += 1;
                    state.record_latency(micros);
                }
            }
            Ok(summary)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StreamSource;
    use std::fs::{self, OpenOptions};
    use std::io::{Cursor, Write};
    use std::time::Duration;
    use tempfile::TempDir;

    fn stream(text: &str) -> Box<dyn LineSource> {
        Box::new(StreamSource::new(Cursor::new(text.as_bytes().to_vec())))
    }

    #[test]
    fn test_progress_reader_merges_and_finishes() {
        let state = Arc::new(SharedState::new());
        let input = "\
00:00:01.000 INFO total size = 10, in queue = 3, running = 2
00:00:01.500 INFO unrelated line
00:00:02.000 INFO total size = 10, in queue = 1, running = 1
";
        let handle = spawn_progress_reader(
            stream(input),
            Arc::new(Patterns::new()),
            Arc::clone(&state),
            CancelFlag::new(),
        )
        .unwrap();
        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary, ReaderSummary { lines: 3, records: 2 });

        let snap = state.snapshot();
        let progress = snap.progress.unwrap();
        assert_eq!(progress.completed, 10);
        assert_eq!(progress.percent, 100.0);
        assert!(snap.completion.is_some());
    }

    #[test]
    fn test_progress_reader_cancelled_does_not_finish() {
        let state = Arc::new(SharedState::new());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let handle = spawn_progress_reader(
            stream("00:00:01.000 total size = 10, in queue = 3, running = 2\n"),
            Arc::new(Patterns::new()),
            Arc::clone(&state),
            cancel,
        )
        .unwrap();
        handle.join().unwrap().unwrap();
        assert!(state.completed_at().is_none());
    }

    #[test]
    fn test_latency_reader_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("latency.log");
        let handle = spawn_latency_reader(
            &path,
            FollowOptions::default(),
            Arc::new(Patterns::new()),
            Arc::new(SharedState::new()),
            CancelFlag::new(),
        )
        .unwrap();
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, ReaderError::LatencyLogMissing(_)));
        assert!(err.to_string().starts_with("latency log not found:"));
    }

    #[test]
    fn test_latency_reader_follows_appended_samples() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("latency.log");
        fs::write(&path, "old took 1000us\n").unwrap();

        let state = Arc::new(SharedState::new());
        let cancel = CancelFlag::new();
        let options = FollowOptions {
            poll_interval: Duration::from_millis(20),
            ..FollowOptions::default()
        };
        let handle = spawn_latency_reader(
            &path,
            options,
            Arc::new(Patterns::new()),
            Arc::clone(&state),
            cancel.clone(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "a took 5us").unwrap();
        writeln!(f, "b took 3us").unwrap();
        writeln!(f, "c took 9us").unwrap();
        f.flush().unwrap();

        let mut waited = Duration::ZERO;
        while state.snapshot().latency.count < 3 && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
            waited += Duration::from_millis(20);
        }
        cancel.cancel();
        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.records, 3);

        let latency = state.snapshot().latency;
        assert_eq!((latency.min, latency.max, latency.latest), (3, 9, 9));
        assert_eq!(latency.count, 3);
    }
}
