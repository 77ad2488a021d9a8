//! Line framing for the Marlin serial protocol.
//!
//! Marlin speaks plain text in both directions:
//! ```text
//! ┌──────────────────────────┬──────┐
//! │  UTF-8 text (no '\n')    │ '\n' │
//! └──────────────────────────┴──────┘
//! ```
//! A `'\r'` directly before the terminator is tolerated and stripped.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::LineError;

/// Line terminator byte.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest line buffered while waiting for a terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Encodes a line of text, appending the terminator.
#[must_use]
pub fn encode(line: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(LINE_TERMINATOR);
    buf.freeze()
}

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
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete line.
    ///
    /// Returns `Ok(Some(line))` with the terminator stripped, `Ok(None)` if
    /// more data is needed, or an error if the line had to be discarded.
    /// Empty lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns a `LineError` if:
    /// - The line is not valid UTF-8 (the line is consumed)
    /// - No terminator arrived within `MAX_LINE_LENGTH` bytes (the buffer is cleared)
    pub fn decode(&mut self) -> Result<Option<String>, LineError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == LINE_TERMINATOR) else {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    let size = self.buffer.len();
                    self.buffer.clear();
                    return Err(LineError::TooLong {
                        size,
                        max: MAX_LINE_LENGTH,
                    });
                }
                return Ok(None);
            };

            let mut raw = self.buffer.split_to(pos + 1);
            raw.truncate(pos);
            if raw.last() == Some(&b'\r') {
                raw.truncate(raw.len() - 1);
            }
            if raw.is_empty() {
                continue;
            }

            return match std::str::from_utf8(&raw) {
                Ok(line) => Ok(Some(line.to_owned())),
                Err(_) => Err(LineError::InvalidUtf8 { len: raw.len() }),
            };
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(encode("G28"), Bytes::from_static(b"G28\n"));
    }

    #[test]
    fn test_decode_complete_line() {
        let mut decoder = LineDecoder::new();
        decoder.feed(b"ok\n");
        assert_eq!(decoder.decode().unwrap(), Some("ok".to_string()));
        assert_eq!(decoder.decode().unwrap(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decode_partial_line() {
        let mut decoder = LineDecoder::new();

        decoder.feed(b"echo:busy: pro");
        assert_eq!(decoder.decode().unwrap(), None);

        decoder.feed(b"cessing\n");
        assert_eq!(
            decoder.decode().unwrap(),
            Some("echo:busy: processing".to_string())
        );
    }

    #[test]
    fn test_decode_strips_carriage_return() {
        let mut decoder = LineDecoder::new();
        decoder.feed(b"ok\r\n");
        assert_eq!(decoder.decode().unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_decode_multiple_lines_and_blank_lines() {
        let mut decoder = LineDecoder::new();
        decoder.feed(b"\n\r\nNum X,Y: 3,3\nZ search height: 0.35\n");

        assert_eq!(decoder.decode().unwrap(), Some("Num X,Y: 3,3".to_string()));
        assert_eq!(
            decoder.decode().unwrap(),
            Some("Z search height: 0.35".to_string())
        );
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_decode_invalid_utf8_is_consumed() {
        let mut decoder = LineDecoder::new();
        decoder.feed(&[0xff, 0xfe, b'\n']);
        decoder.feed(b"ok\n");

        assert!(matches!(
            decoder.decode(),
            Err(LineError::InvalidUtf8 { len: 2 })
        ));
        assert_eq!(decoder.decode().unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_decode_overlong_line_is_discarded() {
        let mut decoder = LineDecoder::new();
        decoder.feed(&vec![b'x'; MAX_LINE_LENGTH + 1]);

        assert!(matches!(decoder.decode(), Err(LineError::TooLong { .. })));
        assert_eq!(decoder.buffered(), 0);

        decoder.feed(b"ok\n");
        assert_eq!(decoder.decode().unwrap(), Some("ok".to_string()));
    }
}
