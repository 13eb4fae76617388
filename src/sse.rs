//! Incremental server-sent-event framing.
//!
//! [`FrameDecoder`] accumulates raw upstream bytes and hands back complete
//! frames. A frame ends at a blank line; `\n` and `\r\n` line endings are both
//! accepted. After [`FrameDecoder::next_frame`] returns `None` the buffer holds
//! at most one partial frame.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Upper bound on a single partial frame held in the buffer.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("event frame exceeds {} bytes ({buffered} buffered without a delimiter)", MAX_FRAME_BYTES)]
    TooLarge { buffered: usize },
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    cursor: BytesMut,
    // Everything before this offset is known to contain no delimiter.
    scanned: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment as received from the transport.
    pub fn push(&mut self, fragment: &[u8]) {
        self.cursor.extend_from_slice(fragment);
    }

    /// Pop the next complete frame's payload. Frames without `data:` lines
    /// (comments, keep-alives) are consumed and skipped.
    pub fn next_frame(&mut self) -> Result<Option<String>, FrameError> {
        loop {
            let Some((end, delimiter_len)) = find_delimiter(&self.cursor, self.scanned) else {
                // Back off so a delimiter split across fragments is still found.
                self.scanned = self.cursor.len().saturating_sub(3);
                if self.cursor.len() > MAX_FRAME_BYTES {
                    return Err(FrameError::TooLarge {
                        buffered: self.cursor.len(),
                    });
                }
                return Ok(None);
            };

            let frame = self.cursor.split_to(end);
            self.cursor.advance(delimiter_len);
            self.scanned = 0;

            if let Some(payload) = frame_payload(&frame) {
                return Ok(Some(payload));
            }
        }
    }

    /// Drain a trailing frame left without a delimiter when the stream ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.cursor.split();
        self.scanned = 0;
        frame_payload(&rest)
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.cursor.len()
    }
}

/// Find the first blank line at or after `from`. Returns the frame end and the
/// delimiter length.
fn find_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(b'\n'), _) => return Some((i, 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((i, 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Join the frame's `data:` lines with `\n`. `None` when there are none.
fn frame_payload(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut data: Option<String> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        // event, id and retry carry nothing the relay forwards.
        if field == "data" {
            match data {
                Some(ref mut d) => {
                    d.push('\n');
                    d.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    data
}
