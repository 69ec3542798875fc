//! Error types for the session engine

use thiserror::Error;

/// Errors that can occur in the session engine
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Routing commands are held back until the initial state poll has settled
    #[error("routing is not ready yet")]
    RouteNotReady,

    /// Input slot is not configured
    #[error("unknown input: {0}")]
    UnknownInput(u16),

    /// Output slot is not configured
    #[error("unknown output: {0}")]
    UnknownOutput(u16),

    /// No transport is attached to the engine
    #[error("not connected to a device")]
    NotConnected,

    /// The engine task has stopped
    #[error("matrix engine has shut down")]
    ActorClosed,

    /// Command could not be encoded
    #[error("protocol error: {0}")]
    Protocol(#[from] sis_protocol::ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
