//! In-place terminal rendering.
//!
//! The [`Renderer`] repaints a fixed-height block of lines. On an interactive
//! terminal it rewrites the block in place using relative cursor movement;
//! anywhere else it appends every redraw so captured output stays a readable
//! transcript.
//!
//! Lines are cut to `width - 1` columns before painting. A line that filled
//! the terminal exactly would auto-wrap and throw off the relative cursor
//! movement on the next redraw.

mod format;
mod terminal;

use std::io::{self, Write};
use std::time::Instant;

use crossterm::cursor::MoveUp;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

use crate::state::Snapshot;

pub use format::{
    filled_cells, format_elapsed, format_latency_line, format_progress_line, format_track_line,
    make_bar, EMPTY_GLYPH, FILLED_GLYPH, UNKNOWN_TIME,
};
pub use terminal::{BufferTerminal, StdoutTerminal, Terminal, FALLBACK_WIDTH};

/// Default progress bar width in cells.
pub const DEFAULT_BAR_WIDTH: usize = 40;
/// Widest bar a configuration may ask for.
pub const MAX_BAR_WIDTH: usize = 1000;

/// Which lines a redraw contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One line: log timestamp, bar, counters.
    SingleLine,
    /// Elapsed time and bar, then latency statistics.
    TwoLine,
}

impl Layout {
    /// Number of rows the layout occupies.
    pub fn rows(self) -> usize {
        match self {
            Layout::SingleLine => 1,
            Layout::TwoLine => 2,
        }
    }

    /// Format a snapshot, or `None` if it has nothing to show yet.
    pub fn lines(self, snapshot: &Snapshot, bar_width: usize, now: Instant) -> Option<Vec<String>> {
        if !snapshot.has_progress_signal() {
            return None;
        }
        let progress = snapshot.progress.as_ref();
        let lines = match self {
            Layout::SingleLine => {
                let marker_time = snapshot
                    .completion
                    .as_ref()
                    .and_then(|c| c.log_time.as_deref());
                vec![format_track_line(progress, marker_time, bar_width)]
            }
            Layout::TwoLine => {
                let elapsed = snapshot
                    .first_seen
                    .map(|first| now.saturating_duration_since(first))
                    .unwrap_or_default();
                vec![
                    format_progress_line(elapsed, progress, bar_width),
                    format_latency_line(&snapshot.latency),
                ]
            }
        };
        Some(lines)
    }
}

/// Cut `line` to at most `max` characters.
pub fn truncate(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Repaints a block of lines on a [`Terminal`].
pub struct Renderer<T: Terminal> {
    term: T,
    /// Rows of the block currently on screen (interactive mode only).
    painted_rows: usize,
    frames: usize,
}

impl<T: Terminal> Renderer<T> {
    /// Create a renderer that owns `term`.
    pub fn new(term: T) -> Self {
        Self {
            term,
            painted_rows: 0,
            frames: 0,
        }
    }

    /// Number of redraws performed.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The underlying terminal.
    pub fn terminal(&self) -> &T {
        &self.term
    }

    /// Paint `lines`, replacing the previous redraw on interactive terminals.
    pub fn draw(&mut self, lines: &[String]) -> io::Result<()> {
        if self.term.is_tty() {
            self.draw_in_place(lines)?;
        } else {
            for line in lines {
                writeln!(self.term, "{line}")?;
            }
        }
        self.term.flush()?;
        self.frames += 1;
        Ok(())
    }

    fn draw_in_place(&mut self, lines: &[String]) -> io::Result<()> {
        let max = usize::from(self.term.width()).saturating_sub(1).max(1);

        if self.painted_rows > 0 {
            // Back to the first row of the block.
            self.term.write_all(b"\r")?;
            if self.painted_rows > 1 {
                let up = u16::try_from(self.painted_rows - 1).unwrap_or(u16::MAX);
                queue!(self.term, MoveUp(up))?;
            }
        }

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.term.write_all(b"\n")?;
            }
            if self.painted_rows > 0 {
                queue!(self.term, Clear(ClearType::CurrentLine))?;
            }
            self.term.write_all(truncate(line, max).as_bytes())?;
        }

        self.painted_rows = lines.len();
        Ok(())
    }

    /// Leave the display: move past the block so the prompt starts on a
    /// fresh row.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.term.is_tty() && self.painted_rows > 0 {
            self.term.write_all(b"\n")?;
            self.term.flush()?;
        }
        self.painted_rows = 0;
        Ok(())
    }
}
