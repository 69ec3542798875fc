//! Error types for SIS protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing a received line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line was empty after trimming
    #[error("empty line")]
    Empty,

    /// Line had the expected prefix but not the expected structure
    #[error("malformed {shape} line: {detail}")]
    Malformed {
        /// Which message shape was being parsed
        shape: &'static str,
        /// What was missing or wrong
        detail: String,
    },

    /// A numeric field could not be parsed
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

impl ParseError {
    pub(crate) fn malformed(shape: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            shape,
            detail: detail.into(),
        }
    }
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A command argument is outside the range the protocol accepts
    #[error("invalid {what}: {value} (allowed {min}..={max})")]
    InvalidArgument {
        /// Name of the argument
        what: &'static str,
        /// Value that was rejected
        value: u32,
        /// Smallest legal value
        min: u32,
        /// Largest legal value
        max: u32,
    },
}
