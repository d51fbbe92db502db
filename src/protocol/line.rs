//! Line decoding for the AT command channel.
//!
//! Modems answer with CR/LF terminated lines:
//! ```text
//! \r\n+CSQ: 17,99\r\n\r\nOK\r\n
//! ```
//! The SMS compose prompt is the exception: it arrives as `\r\n> ` with no
//! line terminator, so the decoder surfaces a dangling `>` as a line of its
//! own.

use bytes::{Buf, BytesMut};

/// Maximum buffered bytes before the decoder discards input.
pub const MAX_LINE_BUFFER: usize = 16 * 1024;

/// Line decoder that handles partial data.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    /// Creates a new line decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        if self.buffer.len() + data.len() > MAX_LINE_BUFFER {
            tracing::warn!(
                "line buffer overflow, dropping {} buffered bytes",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete, non-empty line with surrounding whitespace
    /// trimmed, or `None` if more data is needed.
    pub fn decode(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                return self.take_prompt();
            };

            let raw = self.buffer.split_to(pos);
            // Skip the terminator itself
            self.buffer.advance(1);

            let line = String::from_utf8_lossy(&raw).trim().to_owned();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Surfaces an un-terminated compose prompt.
    fn take_prompt(&mut self) -> Option<String> {
        let pending = String::from_utf8_lossy(&self.buffer);
        if pending.trim() == ">" {
            self.buffer.clear();
            return Some(">".to_owned());
        }
        None
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
