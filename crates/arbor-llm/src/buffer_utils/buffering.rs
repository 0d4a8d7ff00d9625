use std::collections::VecDeque;

/// Longest pending line kept while waiting for its `\n`
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A line that could not be decoded as UTF-8, or one that outgrew
/// `MAX_LINE_BYTES`. The bytes are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub len: usize,
    pub reason: String,
}

/// Byte buffer that hands out complete `\n`-terminated lines
///
/// Network deliveries can split a frame anywhere, including inside a
/// multi-byte character; only whole lines are ever decoded.
pub struct CircularLineBuffer {
    buffer: VecDeque<u8>,
    max_line: usize,
    /// Set while discarding the rest of an oversized line
    skipping: bool,
}

impl CircularLineBuffer {
    /// Create a new buffer with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            max_line: MAX_LINE_BYTES,
            skipping: false,
        }
    }

    /// Lower or raise the pending line limit
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Extract next line (up to \n), trimmed of surrounding whitespace
    /// (which also strips a trailing \r).
    /// Returns None if no complete line is available.
    ///
    /// A line longer than the limit is reported once as an error and the
    /// rest of it, up to its `\n`, is discarded.
    pub fn next_line(&mut self) -> Option<Result<String, LineError>> {
        loop {
            let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                return self.overflow();
            };

            if self.skipping {
                self.buffer.drain(..=newline_pos);
                self.skipping = false;
                continue;
            }
            if newline_pos > self.max_line {
                let len = newline_pos + 1;
                self.buffer.drain(..len);
                return Some(Err(too_long(len, self.max_line)));
            }

            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            return Some(decode(line_bytes));
        }
    }

    fn overflow(&mut self) -> Option<Result<String, LineError>> {
        if self.buffer.len() <= self.max_line {
            return None;
        }

        let len = self.buffer.len();
        self.buffer.clear();
        if std::mem::replace(&mut self.skipping, true) {
            None
        } else {
            Some(Err(too_long(len, self.max_line)))
        }
    }

    /// Drain whatever is left once the source has closed
    /// (a final frame without a trailing newline)
    pub fn finish(&mut self) -> Option<Result<String, LineError>> {
        if std::mem::take(&mut self.skipping) {
            self.buffer.clear();
        }
        if self.buffer.is_empty() {
            return None;
        }
        let rest: Vec<u8> = self.buffer.drain(..).collect();
        Some(decode(rest))
    }

    /// Current buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn too_long(len: usize, max_line: usize) -> LineError {
    LineError {
        len,
        reason: format!("line exceeds {} bytes", max_line),
    }
}

fn decode(bytes: Vec<u8>) -> Result<String, LineError> {
    let len = bytes.len();
    String::from_utf8(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|e| LineError {
            len,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_buffer_basic() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"line1\nline2\r\n");

        assert_eq!(buffer.next_line().unwrap().unwrap(), "line1");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "line2");
        assert!(buffer.next_line().is_none());
    }

    #[test]
    fn test_partial_line() {
        let mut buffer = CircularLineBuffer::with_capacity(64);

        buffer.extend(b"partial");
        assert!(buffer.next_line().is_none());

        buffer.extend(b" line\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "partial line");
    }

    #[test]
    fn test_multibyte_char_split_across_deliveries() {
        let mut buffer = CircularLineBuffer::with_capacity(64);
        let text = "olá\n".as_bytes();

        // split inside the two-byte 'á'
        buffer.extend(&text[..3]);
        assert!(buffer.next_line().is_none());
        buffer.extend(&text[3..]);
        assert_eq!(buffer.next_line().unwrap().unwrap(), "olá");
    }

    #[test]
    fn test_invalid_utf8_line_is_reported_and_dropped() {
        let mut buffer = CircularLineBuffer::with_capacity(64);
        buffer.extend(&[0xff, 0xfe, b'\n']);
        buffer.extend(b"ok\n");

        assert!(buffer.next_line().unwrap().is_err());
        assert_eq!(buffer.next_line().unwrap().unwrap(), "ok");
    }

    #[test]
    fn test_finish_returns_unterminated_tail() {
        let mut buffer = CircularLineBuffer::with_capacity(64);
        buffer.extend(b"data: tail");
        assert!(buffer.next_line().is_none());
        assert_eq!(buffer.finish().unwrap().unwrap(), "data: tail");
        assert!(buffer.finish().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_line_without_newline_is_capped() {
        let mut buffer = CircularLineBuffer::with_capacity(16).with_max_line(8);

        buffer.extend(b"0123456789");
        let err = buffer.next_line().unwrap().unwrap_err();
        assert_eq!(err.len, 10);
        assert!(buffer.is_empty());

        // the rest of the same line is dropped silently
        buffer.extend(b"abcdefghijkl");
        assert!(buffer.next_line().is_none());
        assert!(buffer.is_empty());

        buffer.extend(b"xyz\nok\n");
        assert_eq!(buffer.next_line().unwrap().unwrap(), "ok");
        assert!(buffer.next_line().is_none());
    }

    #[test]
    fn test_oversized_complete_line_is_reported() {
        let mut buffer = CircularLineBuffer::with_capacity(16).with_max_line(4);
        buffer.extend(b"too long line\nfine\n");

        assert!(buffer.next_line().unwrap().is_err());
        assert_eq!(buffer.next_line().unwrap().unwrap(), "fine");
    }
}
