//! Line framing for the telemetry byte stream
//!
//! The HC-05 forwards whatever the sensor board prints, so frames are text
//! lines terminated by `\n` or `\r`. Either byte ends a line on its own, which
//! means a `\r\n` pair yields an extra empty line; consumers skip lines that
//! are empty after trimming.

use bytes::{Buf, BytesMut};

/// Returns true for the bytes that terminate a line
fn is_separator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

/// Decode one completed line, trimming surrounding whitespace
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

/// Streaming line assembler
///
/// Bytes that are not yet terminated stay buffered across calls to
/// [`FrameAssembler::feed`]. Without a limit the buffer grows for as long as
/// the peer keeps sending without a terminator.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// Unterminated tail of the stream
    buffer: BytesMut,
    /// Maximum size of the unterminated tail, if any
    limit: Option<usize>,
    /// Number of times the tail was discarded for exceeding `limit`
    overflow_count: u64,
}

impl FrameAssembler {
    /// Create an assembler with an unbounded line buffer
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            limit: None,
            overflow_count: 0,
        }
    }

    /// Create an assembler that discards the unterminated tail once it
    /// exceeds `max_pending` bytes
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            limit: Some(max_pending),
            ..Self::new()
        }
    }

    /// Append a chunk and return every line it completes, trimmed
    ///
    /// Empty lines are returned as empty strings.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        // The previous tail holds no separator, only the new bytes need scanning
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        while let Some(offset) = self.buffer[search_from..]
            .iter()
            .position(|b| is_separator(*b))
        {
            let segment = self.buffer.split_to(search_from + offset);
            self.buffer.advance(1);
            lines.push(decode_line(&segment));
            search_from = 0;
        }

        // A chunk ending on a separator flushes whatever is left
        if chunk.last().copied().is_some_and(is_separator) {
            let tail = self.buffer.split();
            let line = decode_line(&tail);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if let Some(limit) = self.limit {
            if self.buffer.len() > limit {
                self.buffer.clear();
                self.overflow_count += 1;
            }
        }

        lines
    }

    /// Bytes received since the last line terminator
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// How many times the unterminated tail was discarded
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Drop any buffered partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
