//! Byte transports for the matrix actor
//!
//! A transport task owns the I/O object, forwards everything it reads to the
//! actor and writes whatever the actor hands it. The actor never touches the
//! socket or serial port directly, so TCP, serial and in-memory streams all
//! share [`run_stream`].

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::MatrixError;
use crate::handle::MatrixHandle;

const READ_BUFFER_SIZE: usize = 1024;

/// Run one connection over an already-open stream
///
/// Reports the connection to the actor, then pumps bytes both ways until the
/// stream ends, a write fails or the actor goes away. The actor is told about
/// the disconnect unless it is already gone.
pub async fn run_stream<S>(mut stream: S, handle: &MatrixHandle) -> Result<(), MatrixError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    handle.transport_connected(writer_tx).await?;

    let mut buf = [0u8; READ_BUFFER_SIZE];
    let reason = loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => break Some("connection closed by device".to_string()),
                Ok(n) => {
                    handle.data_received(buf[..n].to_vec()).await?;
                }
                Err(e) => break Some(format!("read failed: {}", e)),
            },
            data = writer_rx.recv() => match data {
                Some(data) => {
                    if let Err(e) = write_all(&mut stream, &data).await {
                        break Some(format!("write failed: {}", e));
                    }
                }
                // Actor replaced or dropped this link
                None => break None,
            },
            _ = handle.closed() => {
                debug!("Actor stopped, closing transport");
                return Ok(());
            }
        }
    };

    handle.transport_disconnected(reason).await
}

async fn write_all<S: AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) -> io::Result<()> {
    stream.write_all(data).await?;
    stream.flush().await
}

/// Keep a TCP or serial connection to the device open
///
/// Reconnects after `reconnect_delay` whenever the connection fails or drops.
/// Returns once the actor has stopped.
pub async fn run_connection(
    config: ConnectionConfig,
    handle: MatrixHandle,
    reconnect_delay: Duration,
) {
    let target = config.describe();
    info!("Connection task started for {}", target);

    while !handle.is_closed() {
        if handle.transport_connecting().await.is_err() {
            break;
        }

        let result = match &config {
            ConnectionConfig::Tcp { host, port } => {
                match TcpStream::connect((host.as_str(), *port)).await {
                    Ok(stream) => {
                        let _ = stream.set_nodelay(true);
                        info!("Connected to {}", target);
                        run_stream(stream, &handle).await
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ConnectionConfig::Serial { port, baud_rate } => {
                match tokio_serial::new(port, *baud_rate)
                    .timeout(Duration::from_millis(100))
                    .open_native_async()
                {
                    Ok(stream) => {
                        info!("Opened {}", target);
                        run_stream(stream, &handle).await
                    }
                    Err(e) => Err(e.into()),
                }
            }
        };

        match result {
            Ok(()) => {}
            Err(MatrixError::ActorClosed) => break,
            Err(e) => {
                warn!("Connection to {} failed: {}", target, e);
                if handle
                    .transport_disconnected(Some(e.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }

        if handle.is_closed() {
            break;
        }
        debug!("Reconnecting to {} in {:?}", target, reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = handle.closed() => break,
        }
    }

    info!("Connection task for {} stopped", target);
}
