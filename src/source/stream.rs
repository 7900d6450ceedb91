//! Finite line streams.

use std::io::BufRead;

use super::{decode_line, LineSource, SourceError};
use crate::cancel::CancelFlag;

/// Reads a stream once, ending at EOF.
///
/// A final line without a terminator is still yielded.
pub struct StreamSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead + Send> StreamSource<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> LineSource for StreamSource<R> {
    fn next_line(&mut self, cancel: &CancelFlag) -> Result<Option<String>, SourceError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(decode_line(&self.buf)))
    }
}
