//! SIS Protocol Library
//!
//! Parsing and encoding for the line-oriented SIS control protocol spoken by
//! video/audio matrix switchers:
//!
//! - **Feedback**: `\n`-terminated lines from the device (route reports, sync
//!   bitmaps, firmware banners, volume/mute, error codes, login prompts)
//! - **Commands**: `\r`-terminated text sent to the device (ties, polls,
//!   verbose mode, presets, volume and mute)
//!
//! # Architecture
//!
//! - [`Dialect`] selects the token table for a device family
//! - [`FeedbackCodec`] turns a raw byte stream into classified [`Feedback`]
//! - [`SisCommand`] validates and encodes outbound commands, and parses them
//!   back for device-side use
//!
//! Nothing here does I/O.
//!
//! # Example
//!
//! ```rust
//! use sis_protocol::{Dialect, Feedback, FeedbackCodec, ProtocolCodec, SignalKind, SisCommand};
//!
//! let mut codec = FeedbackCodec::new(Dialect::AvMatrix);
//! codec.push_bytes(b"Out3 In5 Vid\r\n");
//! assert_eq!(
//!     codec.next_command(),
//!     Some(Feedback::RouteChanged { output: 3, input: 5, kind: SignalKind::Video })
//! );
//!
//! let tie = SisCommand::tie(4, 2, SignalKind::Video).unwrap();
//! assert_eq!(tie.encode(Dialect::AvMatrix), b"4*2%\r");
//! ```

pub mod codec;
pub mod command;
pub mod dialect;
pub mod error;
pub mod error_code;
pub mod feedback;
pub mod firmware;
mod scan;

pub use codec::FeedbackCodec;
pub use command::{SignalKind, SisCommand};
pub use dialect::{Dialect, DialectDescriptor};
pub use error::{ParseError, ProtocolError};
pub use error_code::{describe, DeviceErrorCode};
pub use feedback::{classify, Feedback, PromptKind};
pub use firmware::DeviceInfo;

/// Trait for protocol codecs that can parse incoming data streams
pub trait ProtocolCodec {
    /// The message type produced by this codec
    type Command;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete message from the buffer
    fn next_command(&mut self) -> Option<Self::Command>;

    /// Try to extract the next complete message along with its raw bytes
    ///
    /// This is useful for traffic monitoring where we want to show the exact
    /// bytes that were parsed for each message.
    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}
