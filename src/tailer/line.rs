//! Line records and incremental line assembly.

use serde::{Deserialize, Serialize};

/// A complete line read from a log source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Name the source was opened with.
    pub source: String,
    /// Line content without the trailing newline.
    pub text: String,
}

impl LogLine {
    /// Create a new line record.
    #[must_use]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Accumulates bytes into newline-terminated lines.
///
/// Holds at most one incomplete line, plus the leading bytes of a UTF-8
/// codepoint cut off at the end of the previous chunk.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, in order.
    ///
    /// Invalid UTF-8 decodes to U+FFFD.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let carried;
        let mut input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            self.pending.extend_from_slice(chunk);
            carried = std::mem::take(&mut self.pending);
            &carried
        };

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.push_text(text, &mut lines);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.push_text(text, &mut lines);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.partial.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Codepoint continues in the next chunk.
                            self.pending.extend_from_slice(rest);
                            break;
                        }
                    }
                }
            }
        }
        lines
    }

    /// Take the incomplete line, if any.
    ///
    /// Bytes of an unfinished codepoint are kept as U+FFFD.
    pub fn take_partial(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.partial.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }

    /// True if no bytes are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partial.is_empty() && self.pending.is_empty()
    }

    fn push_text(&mut self, text: &str, lines: &mut Vec<String>) {
        let mut segments = text.split('\n');
        if let Some(first) = segments.next() {
            self.partial.push_str(first);
        }
        for segment in segments {
            lines.push(std::mem::take(&mut self.partial));
            self.partial.push_str(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.feed(b"one\ntwo\n"), vec!["one", "two"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_line_spans_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.feed(b"hel").is_empty());
        assert_eq!(buffer.feed(b"lo\nworld"), vec!["hello"]);
        assert_eq!(buffer.take_partial().as_deref(), Some("world"));
        assert_eq!(buffer.take_partial(), None);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.feed(b"\n\na\n"), vec!["", "", "a"]);
    }

    #[test]
    fn test_codepoint_split_across_chunks() {
        let text = "naïve → ünïcode\n";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut buffer = LineBuffer::new();
            let mut lines = buffer.feed(&bytes[..split]);
            lines.extend(buffer.feed(&bytes[split..]));
            assert_eq!(lines, vec!["naïve → ünïcode"], "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let text = "日本語\nλ";
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for byte in text.as_bytes() {
            lines.extend(buffer.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["日本語"]);
        assert_eq!(buffer.take_partial().as_deref(), Some("λ"));
    }

    #[test]
    fn test_invalid_bytes_become_replacement() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.feed(b"a\xffb\n"), vec!["a\u{FFFD}b"]);
    }

    #[test]
    fn test_unfinished_codepoint_flushed_as_replacement() {
        let mut buffer = LineBuffer::new();
        // First two bytes of a three-byte sequence.
        assert!(buffer.feed(b"x\xe2\x86").is_empty());
        assert!(!buffer.is_empty());
        assert_eq!(buffer.take_partial().as_deref(), Some("x\u{FFFD}"));
        assert!(buffer.is_empty());
    }
}
