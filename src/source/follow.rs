//! Append-follow file sources (tail -f).

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use super::{decode_line, FollowOptions, LineSource, SourceError, WaitStrategy};
use crate::cancel::CancelFlag;

/// Where a followed file starts being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartAt {
    /// Replay existing content, then follow.
    Beginning,
    /// Skip existing content and only yield appended lines.
    #[default]
    End,
}

/// Blocks a follow-mode reader until more data may be available.
enum Waiter {
    Poll {
        interval: Duration,
    },
    Notify {
        interval: Duration,
        events: Receiver<()>,
        // Dropping the watcher stops notifications.
        _watcher: RecommendedWatcher,
    },
}

impl Waiter {
    fn new(path: &Path, options: &FollowOptions) -> Self {
        let interval = options.poll_interval;
        match options.wait {
            WaitStrategy::Poll => Waiter::Poll { interval },
            WaitStrategy::Notify => match watch(path) {
                Ok((watcher, events)) => Waiter::Notify {
                    interval,
                    events,
                    _watcher: watcher,
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "file watcher unavailable, polling instead");
                    Waiter::Poll { interval }
                }
            },
        }
    }

    fn wait(&self) {
        match self {
            Waiter::Poll { interval } => thread::sleep(*interval),
            Waiter::Notify {
                interval, events, ..
            } => {
                let _ = events.recv_timeout(*interval);
                // Coalesce bursts into a single wake-up.
                while events.try_recv().is_ok() {}
            }
        }
    }
}

fn watch(path: &Path) -> Result<(RecommendedWatcher, Receiver<()>), notify::Error> {
    let (tx, rx) = sync_channel(16);
    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if result.is_ok() {
                // Drop the wake-up if one is already queued.
                let _ = tx.try_send(());
            }
        },
        Config::default(),
    )?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok((watcher, rx))
}

/// Follows a growing file, yielding only newline-terminated lines.
///
/// Bytes after the last newline are held back until the rest of the line
/// arrives.
pub struct FollowSource {
    path: PathBuf,
    reader: BufReader<File>,
    pending: Vec<u8>,
    waiter: Waiter,
}

impl FollowSource {
    /// Open `path` for following.
    pub fn open(path: &Path, start: StartAt, options: &FollowOptions) -> Result<Self, SourceError> {
        let mut file = File::open(path).map_err(|e| SourceError::open(path, e))?;
        if start == StartAt::End {
            let offset = file.seek(SeekFrom::End(0))?;
            debug!(path = %path.display(), offset, "following from end of file");
        }
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            pending: Vec::new(),
            waiter: Waiter::new(path, options),
        })
    }

    /// Path being followed.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSource for FollowSource {
    fn next_line(&mut self, cancel: &CancelFlag) -> Result<Option<String>, SourceError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            self.reader.read_until(b'\n', &mut self.pending)?;
            if self.pending.last() == Some(&b'\n') {
                let line = decode_line(&self.pending);
                self.pending.clear();
                return Ok(Some(line));
            }
            self.waiter.wait();
        }
    }
}
