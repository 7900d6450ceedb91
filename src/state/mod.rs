//! Shared monitor state.
//!
//! Reader threads merge extracted records into a single [`SharedState`];
//! the render loop takes [`Snapshot`]s of it. Every merge holds the lock
//! for a handful of field updates only, never across a read.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::extract::{CompletionMarker, ProgressRecord};

/// Latest known progress figures.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    /// Timestamp text of the log line the sample came from.
    pub log_time: String,
    /// Total number of work items.
    pub total: u64,
    /// Items waiting in the queue.
    pub queue: u64,
    /// Items being processed.
    pub running: u64,
    /// Items finished (`0 <= completed <= total`).
    pub completed: u64,
    /// `completed / total * 100`, or `0.0` for an empty total.
    pub percent: f64,
}

impl ProgressSample {
    /// Build a sample from an extracted record.
    pub fn from_record(record: &ProgressRecord) -> Self {
        Self {
            log_time: record.time.clone(),
            total: record.total,
            queue: record.queue,
            running: record.running,
            completed: record.completed(),
            percent: record.percent(),
        }
    }

    /// Whether the sample already shows every item completed.
    pub fn is_finished(&self) -> bool {
        self.completed == self.total && self.queue == 0 && self.running == 0
    }

    /// The same sample snapped to 100%.
    ///
    /// `log_time` replaces the timestamp when the completion came from a
    /// marker line.
    pub fn finished(&self, log_time: Option<&str>) -> Self {
        Self {
            log_time: log_time.map_or_else(|| self.log_time.clone(), str::to_string),
            total: self.total,
            queue: 0,
            running: 0,
            completed: self.total,
            percent: if self.total > 0 { 100.0 } else { 0.0 },
        }
    }
}

/// Running latency aggregate in microseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    /// Most recent sample.
    pub latest: u64,
    /// Number of samples seen.
    pub count: u64,
    /// Sum of all samples (saturating).
    pub sum: u64,
    /// Smallest sample.
    pub min: u64,
    /// Largest sample.
    pub max: u64,
}

impl LatencyStats {
    /// Fold one sample into the aggregate.
    pub fn record(&mut self, micros: u64) {
        if self.count == 0 {
            self.min = micros;
            self.max = micros;
        } else {
            self.min = self.min.min(micros);
            self.max = self.max.max(micros);
        }
        self.latest = micros;
        self.count += 1;
        self.sum = self.sum.saturating_add(micros);
    }

    /// Mean latency, if any samples were recorded.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }

    /// Whether no samples have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// When and how the progress producer finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Monotonic time the completion was observed.
    pub at: Instant,
    /// Timestamp text of the marker line, when completion came from a marker.
    pub log_time: Option<String>,
}

/// A consistent copy of the monitor state for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Latest progress sample.
    pub progress: Option<ProgressSample>,
    /// Latency aggregate.
    pub latency: LatencyStats,
    /// When the first progress record arrived.
    pub first_seen: Option<Instant>,
    /// Producer completion, if observed.
    pub completion: Option<Completion>,
}

impl Snapshot {
    /// Whether there is anything progress-related to display.
    pub fn has_progress_signal(&self) -> bool {
        self.progress.is_some() || self.completion.is_some()
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: Snapshot,
    dirty: bool,
}

/// Monitor state shared between reader threads and the render loop.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    // Every merge leaves the state consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merge a progress record.
    pub fn record_progress(&self, record: &ProgressRecord) {
        let sample = ProgressSample::from_record(record);
        let mut inner = self.lock();
        if inner.snapshot.first_seen.is_none() {
            inner.snapshot.first_seen = Some(Instant::now());
        }
        inner.snapshot.progress = Some(sample);
        inner.dirty = true;
    }

    /// Merge a completion marker line.
    pub fn record_completion(&self, marker: &CompletionMarker) {
        let mut inner = self.lock();
        let snap = &mut inner.snapshot;
        if snap.completion.is_none() {
            snap.completion = Some(Completion {
                at: Instant::now(),
                log_time: Some(marker.time.clone()),
            });
        }
        if let Some(progress) = snap.progress.take() {
            snap.progress = Some(progress.finished(Some(&marker.time)));
        }
        inner.dirty = true;
    }

    /// Record end of input on the progress source.
    ///
    /// Only the first completion timestamp counts. The latest sample is
    /// snapped to 100% even if a marker already completed the run, since
    /// progress lines may follow the marker.
    pub fn finish_progress(&self) {
        let mut inner = self.lock();
        let mut changed = false;
        let snap = &mut inner.snapshot;
        if snap.completion.is_none() {
            snap.completion = Some(Completion {
                at: Instant::now(),
                log_time: None,
            });
            changed = true;
        }
        if let Some(progress) = snap.progress.as_mut() {
            if !progress.is_finished() {
                *progress = progress.finished(None);
                changed = true;
            }
        }
        if changed {
            inner.dirty = true;
        }
    }

    /// Merge one latency sample.
    pub fn record_latency(&self, micros: u64) {
        let mut inner = self.lock();
        inner.snapshot.latency.record(micros);
        inner.dirty = true;
    }

    /// Take a snapshot if anything changed since the last one.
    ///
    /// Clears the dirty flag.
    pub fn take_snapshot(&self) -> Option<Snapshot> {
        let mut inner = self.lock();
        if !inner.dirty {
            return None;
        }
        inner.dirty = false;
        Some(inner.snapshot.clone())
    }

    /// Copy the current state without touching the dirty flag.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    /// Whether there are unrendered updates.
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// When the producer finished, if it has.
    pub fn completed_at(&self) -> Option<Instant> {
        self.lock().snapshot.completion.as_ref().map(|c| c.at)
    }
}
