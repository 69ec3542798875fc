//! Unified event stream for the session engine
//!
//! Every state change, traffic line and device error is published as a
//! [`MatrixEvent`] on one broadcast channel. Consumers that only care about a
//! single output or input filter the stream with an
//! [`EventFilter`](crate::notify::EventFilter).

use sis_protocol::{DeviceInfo, SignalKind};

use crate::session::SessionState;

/// Unified event enum for all engine activity
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixEvent {
    // -------------------------------------------------------------------------
    // Routing state
    // -------------------------------------------------------------------------
    /// An output's video source was reported
    VideoRouteChanged {
        /// Output slot
        output: u16,
        /// Input slot (0 = no source)
        input: u16,
    },

    /// An output's audio source was reported
    AudioRouteChanged {
        /// Output slot
        output: u16,
        /// Input slot (0 = no source)
        input: u16,
    },

    /// The display name of an output's current source
    RouteNameChanged {
        /// Output slot
        output: u16,
        /// `Video` or `Audio`
        kind: SignalKind,
        /// Source display name, or the no-route text
        name: String,
    },

    /// An input's sync detection changed
    SyncChanged {
        /// Input slot
        input: u16,
        /// Whether a signal is present
        detected: bool,
    },

    /// An output's volume changed
    VolumeChanged {
        /// Output slot
        output: u16,
        /// Level in device units
        level: u16,
        /// Level rescaled for control systems (level * 1024 - 1)
        scaled: i32,
    },

    /// An output's mute changed
    MuteChanged {
        /// Output slot
        output: u16,
        /// Whether the output is muted
        muted: bool,
    },

    /// Firmware/model information was parsed
    DeviceInfoChanged(DeviceInfo),

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------
    /// The session moved to a new state
    SessionStateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },

    /// The route-ready gate opened or closed
    RouteReadyChanged {
        /// New gate value
        ready: bool,
    },

    // -------------------------------------------------------------------------
    // Traffic events (for traffic monitor)
    // -------------------------------------------------------------------------
    /// A line received from the device (delimiter stripped)
    LineIn {
        /// Line text
        line: String,
    },

    /// A command sent to the device (terminator stripped)
    LineOut {
        /// Command text
        line: String,
    },

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------
    /// The device rejected a command
    DeviceError {
        /// Numeric code from the `E##` reply
        code: u16,
        /// Human-readable description
        description: &'static str,
    },

    /// A transport or engine error
    Error {
        /// Source of the error (e.g., "Transport")
        source: String,
        /// Error message
        message: String,
    },
}

impl MatrixEvent {
    /// Check if this is a traffic event (for traffic monitor filtering)
    pub fn is_traffic(&self) -> bool {
        matches!(self, MatrixEvent::LineIn { .. } | MatrixEvent::LineOut { .. })
    }

    /// Check if this event reports routing state
    pub fn is_route(&self) -> bool {
        matches!(
            self,
            MatrixEvent::VideoRouteChanged { .. }
                | MatrixEvent::AudioRouteChanged { .. }
                | MatrixEvent::RouteNameChanged { .. }
        )
    }

    /// Check if this event concerns the session lifecycle
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            MatrixEvent::SessionStateChanged { .. } | MatrixEvent::RouteReadyChanged { .. }
        )
    }

    /// Output slot this event is about, if any
    pub fn output(&self) -> Option<u16> {
        match self {
            MatrixEvent::VideoRouteChanged { output, .. }
            | MatrixEvent::AudioRouteChanged { output, .. }
            | MatrixEvent::RouteNameChanged { output, .. }
            | MatrixEvent::VolumeChanged { output, .. }
            | MatrixEvent::MuteChanged { output, .. } => Some(*output),
            _ => None,
        }
    }

    /// Input slot this event is about, if any
    pub fn input(&self) -> Option<u16> {
        match self {
            MatrixEvent::SyncChanged { input, .. } => Some(*input),
            _ => None,
        }
    }
}
