//! Matrix Switcher Session Engine
//!
//! This crate keeps an in-memory model of a matrix switcher's routing state
//! in sync with the physical device over its SIS control link.
//!
//! # Architecture
//!
//! One actor task owns everything for a device:
//!
//! - the **session** state machine (connect, login, initial poll, settle, ready)
//! - the **routing store** (source per output and signal kind, sync, volume, mute)
//! - a paced **outbound queue**, the only path commands take to the wire
//!
//! Callers hold a [`MatrixHandle`]. Changes are pushed as [`MatrixEvent`]s
//! and the latest [`MatrixSnapshot`] can be read at any time.
//!
//! Transport tasks ([`run_connection`], [`run_stream`]) own the socket or
//! serial port and forward bytes to and from the actor.
//!
//! # Route gating
//!
//! Routing commands are refused until the initial poll has been sent and the
//! settle delay has passed, so a control system can never act on stale state.
//!
//! # Example
//!
//! ```rust,no_run
//! use sis_matrix::{run_connection, ConnectionConfig, MatrixConfig, MatrixHandle};
//! use sis_protocol::{Dialect, SignalKind};
//!
//! # async fn demo() -> Result<(), sis_matrix::MatrixError> {
//! let config = MatrixConfig::with_counts(Dialect::AvMatrix, 8, 4);
//! let delay = config.reconnect_delay();
//! let matrix = MatrixHandle::spawn(config)?;
//!
//! let link = ConnectionConfig::Tcp { host: "192.168.1.50".into(), port: 23 };
//! tokio::spawn(run_connection(link, matrix.clone(), delay));
//!
//! // Later, once the session is ready:
//! matrix.route(3, 1, SignalKind::Video).await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod notify;
pub mod session;
pub mod state;
pub mod transport;

pub use actor::{run_matrix_actor, MatrixCommand, Request};
pub use config::{ConnectionConfig, EndpointConfig, MatrixConfig};
pub use error::MatrixError;
pub use events::MatrixEvent;
pub use handle::MatrixHandle;
pub use notify::{EventFilter, MatrixSnapshot, Notifier, Subscription};
pub use session::{Credential, SessionAction, SessionState};
pub use state::{InputState, OutputState, RoutingState};
pub use transport::{run_connection, run_stream};
