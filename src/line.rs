//! Byte stream framing.
//!
//! Transports hand the protocol arbitrary chunks of bytes. [`LineBuffer`]
//! accumulates them and yields complete CR LF terminated lines, keeping any
//! partial line buffered until the next chunk arrives.

use bytes::{Buf, BytesMut};
use tracing::warn;

/// Default upper bound on buffered bytes without a terminator, used before
/// the negotiated inbound limit is known.
pub const MAX_BUFFERED_LEN: usize = 512 + 8191 + 1024;

/// Accumulating CR LF line splitter.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: BytesMut,
    /// Offset from which the next terminator search starts.
    next_index: usize,
    max_len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create an empty buffer with the default length cap.
    pub fn new() -> Self {
        Self::with_max_len(MAX_BUFFERED_LEN)
    }

    /// Create an empty buffer that discards partial lines longer than `max_len`.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            next_index: 0,
            max_len,
        }
    }

    /// Longest partial line kept while waiting for a terminator.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Change the partial line cap. Takes effect on the next search.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    /// Append a chunk of received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Empty lines (a terminator directly following another) are skipped.
    /// Returns `None` once no terminator remains in the buffer.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(offset) = find_crlf(&self.buffer[self.next_index..]) else {
                // The byte before the unsearched tail may be a lone CR whose
                // LF has not arrived yet.
                self.next_index = self.buffer.len().saturating_sub(1);
                if self.buffer.len() > self.max_len {
                    warn!(
                        buffered = self.buffer.len(),
                        limit = self.max_len,
                        "discarding oversized partial line"
                    );
                    self.buffer.clear();
                    self.next_index = 0;
                }
                return None;
            };

            let end = self.next_index + offset;
            let line = self.buffer.split_to(end);
            self.buffer.advance(2);
            self.next_index = 0;

            if line.is_empty() {
                continue;
            }
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Feed a chunk and collect every line it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.extend(data);
        std::iter::from_fn(|| self.next_line()).collect()
    }
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    haystack.windows(2).position(|w| w == b"\r\n")
}
