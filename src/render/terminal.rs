//! Terminal backends.
//!
//! The renderer only talks to a [`Terminal`]: a writer that can also report
//! whether it is interactive and how wide it is. Cursor movement and line
//! clearing are emitted as crossterm commands on top of that writer.

use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use crossterm::tty::IsTty;

/// Width assumed when the terminal size cannot be queried.
pub const FALLBACK_WIDTH: u16 = 80;

/// An output target for the renderer.
pub trait Terminal: Write {
    /// Whether output goes to an interactive terminal.
    fn is_tty(&self) -> bool;

    /// Current width in columns. Queried before every redraw.
    fn width(&self) -> u16;
}

/// Standard output.
pub struct StdoutTerminal {
    out: Stdout,
    tty: bool,
}

impl StdoutTerminal {
    /// Wrap the process's standard output.
    pub fn new() -> Self {
        let out = io::stdout();
        let tty = out.is_tty();
        Self { out, tty }
    }
}

impl Default for StdoutTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for StdoutTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Terminal for StdoutTerminal {
    fn is_tty(&self) -> bool {
        self.tty
    }

    fn width(&self) -> u16 {
        match crossterm::terminal::size() {
            Ok((cols, _)) if cols > 0 => cols,
            _ => FALLBACK_WIDTH,
        }
    }
}

/// In-memory terminal that records everything written to it.
///
/// Clones share the same buffer and width, so a caller can keep a handle
/// while the renderer owns another.
#[derive(Debug, Clone)]
pub struct BufferTerminal {
    buf: Arc<Mutex<Vec<u8>>>,
    tty: bool,
    width: Arc<AtomicU16>,
}

impl BufferTerminal {
    /// A non-interactive buffer (like a pipe or redirected file).
    pub fn piped() -> Self {
        Self::new(false, FALLBACK_WIDTH)
    }

    /// An interactive buffer with the given width.
    pub fn tty(width: u16) -> Self {
        Self::new(true, width)
    }

    fn new(tty: bool, width: u16) -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
            tty,
            width: Arc::new(AtomicU16::new(width)),
        }
    }

    /// Simulate a terminal resize.
    pub fn set_width(&self, width: u16) {
        self.width.store(width, Ordering::SeqCst);
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for BufferTerminal {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Terminal for BufferTerminal {
    fn is_tty(&self) -> bool {
        self.tty
    }

    fn width(&self) -> u16 {
        self.width.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_terminal_shares_contents() {
        let term = BufferTerminal::piped();
        let mut writer = term.clone();
        write!(writer, "hello").unwrap();
        assert_eq!(term.contents(), "hello");
        assert!(!term.is_tty());
    }

    #[test]
    fn test_buffer_terminal_resize() {
        let term = BufferTerminal::tty(100);
        assert_eq!(term.width(), 100);
        term.clone().set_width(30);
        assert_eq!(term.width(), 30);
    }
}
