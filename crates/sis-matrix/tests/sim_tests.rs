//! End-to-end tests against the virtual matrix
//!
//! The engine and a `VirtualMatrix` are connected through an in-memory duplex
//! stream, so every byte takes the same path it would over TCP or serial.

use std::time::Duration;

use sis_matrix::{run_stream, MatrixConfig, MatrixHandle, SessionState};
use sis_protocol::{Dialect, SignalKind};
use sis_sim::{run_virtual_matrix_task, VirtualMatrix, VirtualMatrixCommand, VirtualMatrixConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct Bench {
    matrix: MatrixHandle,
    device: mpsc::Sender<VirtualMatrixCommand>,
    sim: JoinHandle<std::io::Result<VirtualMatrix>>,
}

fn bench(config: MatrixConfig, device: VirtualMatrixConfig) -> Bench {
    let (engine_side, device_side) = tokio::io::duplex(4096);
    let (device_tx, device_rx) = mpsc::channel(8);
    let sim = tokio::spawn(run_virtual_matrix_task(
        device_side,
        VirtualMatrix::new("bench", device),
        device_rx,
    ));

    let matrix = MatrixHandle::spawn(config).unwrap();
    let handle = matrix.clone();
    tokio::spawn(async move {
        let _ = run_stream(engine_side, &handle).await;
    });

    Bench {
        matrix,
        device: device_tx,
        sim,
    }
}

#[tokio::test(start_paused = true)]
async fn av_matrix_session() {
    let b = bench(
        MatrixConfig::with_counts(Dialect::AvMatrix, 8, 4),
        VirtualMatrixConfig::default(),
    );
    sleep(Duration::from_secs(11)).await;
    assert!(b.matrix.is_route_ready());

    b.matrix.route(5, 2, SignalKind::AudioVideo).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let snap = b.matrix.snapshot();
    assert_eq!(snap.source(2, SignalKind::Video), Some(5));
    assert_eq!(snap.source(2, SignalKind::Audio), Some(5));
    assert_eq!(snap.source_name(2, SignalKind::Audio), "Input 5-Audio");
    assert_eq!(
        snap.device_info().and_then(|d| d.model.as_deref()),
        Some("LX-DTPCP108")
    );

    // Front-panel changes arrive unsolicited
    b.device
        .send(VirtualMatrixCommand::SetRoute {
            input: 3,
            output: 1,
            kind: SignalKind::Video,
        })
        .await
        .unwrap();
    b.device
        .send(VirtualMatrixCommand::SetSync {
            input: 2,
            detected: true,
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;

    let snap = b.matrix.snapshot();
    assert_eq!(snap.source(1, SignalKind::Video), Some(3));
    assert_eq!(snap.sync_detected(2), Some(true));

    // Device goes away
    b.device.send(VirtualMatrixCommand::Shutdown).await.unwrap();
    let device = b.sim.await.unwrap().unwrap();
    assert_eq!(device.route(2, SignalKind::Video), Some(5));

    sleep(Duration::from_millis(100)).await;
    assert_eq!(b.matrix.session_state(), SessionState::Disconnected);
    assert!(!b.matrix.is_route_ready());
}

#[tokio::test(start_paused = true)]
async fn discovery_picks_up_existing_routes() {
    let b = bench(
        MatrixConfig::with_counts(Dialect::AvMatrix, 4, 2),
        VirtualMatrixConfig::default(),
    );
    b.device
        .send(VirtualMatrixCommand::SetRoute {
            input: 4,
            output: 2,
            kind: SignalKind::Audio,
        })
        .await
        .unwrap();

    sleep(Duration::from_secs(11)).await;
    assert_eq!(b.matrix.snapshot().source(2, SignalKind::Audio), Some(4));
}

#[tokio::test(start_paused = true)]
async fn xtp_session_with_password() {
    let mut config = MatrixConfig::with_counts(Dialect::Xtp, 4, 2);
    config.password = Some("extron".into());
    let b = bench(
        config,
        VirtualMatrixConfig {
            dialect: Dialect::Xtp,
            inputs: 4,
            outputs: 2,
            password: Some("extron".into()),
            ..Default::default()
        },
    );

    sleep(Duration::from_secs(12)).await;
    assert!(b.matrix.is_route_ready());

    // Discovery polled the levels
    assert_eq!(b.matrix.snapshot().volume(1), Some(50));
    assert_eq!(b.matrix.snapshot().muted(1), Some(false));

    b.matrix.set_volume(1, 75).await.unwrap();
    b.matrix.toggle_mute(2).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let snap = b.matrix.snapshot();
    assert_eq!(snap.volume(1), Some(75));
    assert_eq!(snap.muted(2), Some(true));

    b.device.send(VirtualMatrixCommand::Shutdown).await.unwrap();
    let device = b.sim.await.unwrap().unwrap();
    assert!(device.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn reboot_reruns_discovery() {
    let b = bench(
        MatrixConfig::with_counts(Dialect::AvMatrix, 2, 2),
        VirtualMatrixConfig::default(),
    );
    sleep(Duration::from_secs(11)).await;
    assert!(b.matrix.is_route_ready());

    b.device.send(VirtualMatrixCommand::Reboot).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(!b.matrix.is_route_ready());

    sleep(Duration::from_secs(11)).await;
    assert!(b.matrix.is_route_ready());
}
