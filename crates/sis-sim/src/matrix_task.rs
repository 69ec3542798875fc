//! Virtual matrix actor task
//!
//! Owns a [`VirtualMatrix`] and serves it over an async stream, so the
//! session engine can talk to it exactly as it talks to a TCP or serial
//! device. Front-panel actions arrive on a command channel.

use std::io;

use sis_protocol::SignalKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::VirtualMatrix;

/// Commands that can be sent to a virtual matrix task
#[derive(Debug, Clone)]
pub enum VirtualMatrixCommand {
    /// Change a route from the front panel
    SetRoute {
        input: u16,
        output: u16,
        kind: SignalKind,
    },
    /// Signal appears or disappears on an input
    SetSync { input: u16, detected: bool },
    /// Restart the device without dropping the connection
    Reboot,
    /// Shutdown the virtual matrix task
    Shutdown,
}

async fn flush_output<S>(stream: &mut S, matrix: &mut VirtualMatrix) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    while let Some(bytes) = matrix.take_output() {
        stream.write_all(&bytes).await?;
    }
    stream.flush().await
}

/// Run the virtual matrix task
///
/// Sends the connect banner, then answers every command read from `stream`
/// until the stream closes or `Shutdown` is received. Returns the matrix so
/// tests can inspect its final state.
pub async fn run_virtual_matrix_task<S>(
    mut stream: S,
    mut matrix: VirtualMatrix,
    mut cmd_rx: mpsc::Receiver<VirtualMatrixCommand>,
) -> io::Result<VirtualMatrix>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];

    info!(
        "Starting virtual matrix task for {} ({})",
        matrix.id(),
        matrix.dialect().name()
    );

    matrix.connect();
    flush_output(&mut stream, &mut matrix).await?;

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual matrix stream closed for {}", matrix.id());
                        break;
                    }
                    Ok(n) => {
                        debug!(
                            "Virtual matrix {} received {:?}",
                            matrix.id(),
                            String::from_utf8_lossy(&buf[..n])
                        );
                        matrix.push_bytes(&buf[..n]);
                    }
                    Err(e) => {
                        warn!("Virtual matrix {} stream error: {}", matrix.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualMatrixCommand::SetRoute { input, output, kind }) => {
                        if !matrix.set_route(input, output, kind) {
                            warn!(
                                "Virtual matrix {} has no route {} -> {}",
                                matrix.id(),
                                input,
                                output
                            );
                        }
                    }
                    Some(VirtualMatrixCommand::SetSync { input, detected }) => {
                        matrix.set_sync(input, detected);
                    }
                    Some(VirtualMatrixCommand::Reboot) => {
                        info!("Virtual matrix {} rebooting", matrix.id());
                        matrix.reboot();
                    }
                    Some(VirtualMatrixCommand::Shutdown) => {
                        info!("Shutdown requested for virtual matrix {}", matrix.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual matrix {}", matrix.id());
                        break;
                    }
                }
            }
        }

        flush_output(&mut stream, &mut matrix).await?;
    }

    info!("Virtual matrix task ended for {}", matrix.id());
    Ok(matrix)
}
