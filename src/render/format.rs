//! Text formatting for the progress and latency lines.

use std::time::Duration;

use crate::state::{LatencyStats, ProgressSample};

/// Glyph for filled bar cells.
pub const FILLED_GLYPH: char = '#';
/// Glyph for empty bar cells.
pub const EMPTY_GLYPH: char = '.';
/// Placeholder shown when a completion marker carried no timestamp.
pub const UNKNOWN_TIME: &str = "--:--:--.---";

/// Number of filled cells for `percent` in a bar `width` cells wide.
///
/// Always within `0..=width`; NaN counts as empty.
pub fn filled_cells(percent: f64, width: usize) -> usize {
    let pct = if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    };
    let filled = (pct / 100.0 * width as f64).round() as usize;
    filled.min(width)
}

/// Render a progress bar of exactly `width` cells.
pub fn make_bar(percent: f64, width: usize) -> String {
    let filled = filled_cells(percent, width);
    let mut bar = String::with_capacity(width);
    bar.extend(std::iter::repeat(FILLED_GLYPH).take(filled));
    bar.extend(std::iter::repeat(EMPTY_GLYPH).take(width - filled));
    bar
}

/// Elapsed time as `+  12.3s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("+{:6.1}s", elapsed.as_secs_f64())
}

/// First line of the two-line layout.
///
/// Without a sample the line shows a full bar with unknown counts, which
/// only happens after a completion with no prior progress line.
pub fn format_progress_line(
    elapsed: Duration,
    progress: Option<&ProgressSample>,
    bar_width: usize,
) -> String {
    let elapsed = format_elapsed(elapsed);
    match progress {
        Some(p) => format!(
            "{elapsed}  [{}] {:6.2}%  completed={}/{}",
            make_bar(p.percent, bar_width),
            p.percent,
            p.completed,
            p.total
        ),
        None => format!(
            "{elapsed}  [{}] {:6.2}%  completed=?/?",
            make_bar(100.0, bar_width),
            100.0
        ),
    }
}

/// Second line of the two-line layout.
pub fn format_latency_line(stats: &LatencyStats) -> String {
    match stats.average() {
        None => "latency (microseconds): count=0".to_string(),
        Some(avg) => format!(
            "latency (microseconds): latest={}  min={}  avg={avg:.1}  max={}  count={}",
            stats.latest, stats.min, stats.max, stats.count
        ),
    }
}

/// The single line of the one-line layout.
///
/// `fallback_time` is used when no sample exists (completion seen before
/// any progress line).
pub fn format_track_line(
    progress: Option<&ProgressSample>,
    fallback_time: Option<&str>,
    bar_width: usize,
) -> String {
    match progress {
        Some(p) => format!(
            "{}  [{}] {:6.2}%  completed={}/{}  queue={}  running={}",
            p.log_time,
            make_bar(p.percent, bar_width),
            p.percent,
            p.completed,
            p.total,
            p.queue,
            p.running
        ),
        None => format!(
            "{}  [{}] {:6.2}%  completed=?/?  queue=0  running=0",
            fallback_time.unwrap_or(UNKNOWN_TIME),
            make_bar(100.0, bar_width),
            100.0
        ),
    }
}
