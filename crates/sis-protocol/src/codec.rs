//! Streaming line codec for switcher feedback
//!
//! Bytes arrive in arbitrary chunks; lines are terminated by `\n` and usually
//! carry a trailing `\r` as well. Blank lines are skipped.

use crate::dialect::Dialect;
use crate::feedback::{classify, Feedback};
use crate::ProtocolCodec;

/// Receive line terminator
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest line we are willing to buffer
const MAX_LINE_LEN: usize = 512;

/// Splits a byte stream into lines and classifies each one
#[derive(Debug, Clone)]
pub struct FeedbackCodec {
    dialect: Dialect,
    buffer: Vec<u8>,
}

impl FeedbackCodec {
    /// Create a codec for the given dialect
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            buffer: Vec::with_capacity(128),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Extract the next complete non-blank line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == LINE_TERMINATOR)?;
            let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            let line = line.trim_end_matches('\r');
            if !line.trim().is_empty() {
                return Some(line.to_string());
            }
        }
    }
}

impl ProtocolCodec for FeedbackCodec {
    type Command = Feedback;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A device that never sends a terminator must not grow the buffer forever
        if self.buffer.len() > MAX_LINE_LEN * 4 && !self.buffer.contains(&LINE_TERMINATOR) {
            let start = self.buffer.len() - MAX_LINE_LEN;
            tracing::warn!("Dropping {} unterminated bytes", start);
            self.buffer.drain(..start);
        }
    }

    fn next_command(&mut self) -> Option<Self::Command> {
        self.next_command_with_bytes().map(|(feedback, _)| feedback)
    }

    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)> {
        let line = self.next_line()?;
        let feedback = classify(&line, self.dialect);
        Some((feedback, line.into_bytes()))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SignalKind;

    #[test]
    fn test_partial_lines() {
        let mut codec = FeedbackCodec::new(Dialect::AvMatrix);
        codec.push_bytes(b"Out3 In");
        assert!(codec.next_command().is_none());
        codec.push_bytes(b"5 Vid\r\nE1");
        assert_eq!(
            codec.next_command(),
            Some(Feedback::RouteChanged {
                output: 3,
                input: 5,
                kind: SignalKind::Video
            })
        );
        assert!(codec.next_command().is_none());
        codec.push_bytes(b"2\n");
        assert_eq!(codec.next_command(), Some(Feedback::ErrorCode(12)));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut codec = FeedbackCodec::new(Dialect::AvMatrix);
        codec.push_bytes(b"\r\n\n  \r\nAmt1 1\r\n");
        let (feedback, raw) = codec.next_command_with_bytes().unwrap();
        assert_eq!(
            feedback,
            Feedback::MuteState {
                output: 1,
                muted: true
            }
        );
        assert_eq!(raw, b"Amt1 1");
        assert!(codec.next_line().is_none());
    }

    #[test]
    fn test_multiple_lines_in_order() {
        let mut codec = FeedbackCodec::new(Dialect::AvMatrix);
        codec.push_bytes(b"Out1 In1 Vid\nOut1 In2 Aud\nFrq00 10\n");
        assert_eq!(codec.next_line().as_deref(), Some("Out1 In1 Vid"));
        assert_eq!(codec.next_line().as_deref(), Some("Out1 In2 Aud"));
        assert_eq!(codec.next_line().as_deref(), Some("Frq00 10"));
        assert_eq!(codec.next_line(), None);
    }

    #[test]
    fn test_overflow_keeps_tail() {
        let mut codec = FeedbackCodec::new(Dialect::AvMatrix);
        codec.push_bytes(&vec![b'x'; MAX_LINE_LEN * 5]);
        codec.push_bytes(b"\nE10\n");
        let first = codec.next_line().unwrap();
        assert_eq!(first.len(), MAX_LINE_LEN);
        assert_eq!(codec.next_command(), Some(Feedback::ErrorCode(10)));
    }

    #[test]
    fn test_clear() {
        let mut codec = FeedbackCodec::new(Dialect::Xtp);
        codec.push_bytes(b"Out1 In");
        codec.clear();
        codec.push_bytes(b"Amt1 0\n");
        assert!(matches!(
            codec.next_command(),
            Some(Feedback::MuteState { muted: false, .. })
        ));
    }
}
