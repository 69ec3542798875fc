//! SIS Matrix Simulation Library
//!
//! This crate provides a simulated matrix switcher for exercising the session
//! engine without hardware:
//!
//! - **VirtualMatrix**: answers SIS commands from in-memory routing state
//! - **run_virtual_matrix_task**: serves a `VirtualMatrix` over any async stream
//!
//! # Example
//!
//! ```rust
//! use sis_sim::{VirtualMatrix, VirtualMatrixConfig};
//! use sis_protocol::SignalKind;
//!
//! let mut matrix = VirtualMatrix::new("bench", VirtualMatrixConfig::default());
//! matrix.push_bytes(b"2*1%\r");
//! assert_eq!(matrix.route(1, SignalKind::Video), Some(2));
//!
//! while let Some(bytes) = matrix.take_output() {
//!     println!("Matrix output: {:?}", String::from_utf8_lossy(&bytes));
//! }
//! ```

pub mod matrix;
pub mod matrix_task;

pub use matrix::{VirtualMatrix, VirtualMatrixConfig, REPLY_TERMINATOR};
pub use matrix_task::{run_virtual_matrix_task, VirtualMatrixCommand};
