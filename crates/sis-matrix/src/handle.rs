//! Client handle for the matrix actor

use sis_protocol::SignalKind;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::actor::{run_matrix_actor, MatrixCommand, Request};
use crate::config::MatrixConfig;
use crate::error::MatrixError;
use crate::events::MatrixEvent;
use crate::notify::{subscribe, EventFilter, MatrixSnapshot, Notifier, Subscription};
use crate::session::SessionState;
use crate::state::RoutingState;

/// Capacity of the actor's command channel
const COMMAND_CAPACITY: usize = 256;

/// Cloneable handle to a running matrix actor
///
/// Caller operations (`route`, `mute`, ...) resolve once the actor has
/// validated and queued the command, not when the device acknowledges it.
/// Transport tasks use the `transport_*` and `data_received` methods.
#[derive(Debug, Clone)]
pub struct MatrixHandle {
    cmd_tx: mpsc::Sender<MatrixCommand>,
    events: broadcast::Sender<MatrixEvent>,
    snapshot: watch::Receiver<MatrixSnapshot>,
}

impl MatrixHandle {
    /// Validate `config` and spawn the actor on the current tokio runtime
    pub fn spawn(config: MatrixConfig) -> Result<Self, MatrixError> {
        config.validate()?;

        let notifier = Notifier::new(MatrixSnapshot {
            session: SessionState::Disconnected,
            route_ready: false,
            routing: RoutingState::new(&config),
        });
        let events = notifier.event_sender();
        let snapshot = notifier.snapshot_receiver();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);

        tokio::spawn(run_matrix_actor(config, cmd_rx, notifier));

        Ok(Self {
            cmd_tx,
            events,
            snapshot,
        })
    }

    async fn send(&self, cmd: MatrixCommand) -> Result<(), MatrixError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| MatrixError::ActorClosed)
    }

    async fn request(&self, request: Request) -> Result<(), MatrixError> {
        let (response, rx) = oneshot::channel();
        self.send(MatrixCommand::Request { request, response }).await?;
        rx.await.map_err(|_| MatrixError::ActorClosed)?
    }

    // -------------------------------------------------------------------------
    // Caller operations
    // -------------------------------------------------------------------------

    /// Route `input` (0 disconnects) to `output`
    ///
    /// Fails with [`MatrixError::RouteNotReady`] until the initial state has
    /// been polled and the settle delay has elapsed.
    pub async fn route(
        &self,
        input: u16,
        output: u16,
        kind: SignalKind,
    ) -> Result<(), MatrixError> {
        let (response, rx) = oneshot::channel();
        self.send(MatrixCommand::Route {
            input,
            output,
            kind,
            response,
        })
        .await?;
        rx.await.map_err(|_| MatrixError::ActorClosed)?
    }

    /// Query firmware, information and sync
    pub async fn poll(&self) -> Result<(), MatrixError> {
        self.request(Request::Poll).await
    }

    /// Query the source of every output
    pub async fn poll_routes(&self) -> Result<(), MatrixError> {
        self.request(Request::PollRoutes).await
    }

    pub async fn poll_sync(&self) -> Result<(), MatrixError> {
        self.request(Request::PollSync).await
    }

    pub async fn recall_preset(&self, preset: u16) -> Result<(), MatrixError> {
        self.request(Request::RecallPreset(preset)).await
    }

    pub async fn volume_up(&self, output: u16) -> Result<(), MatrixError> {
        self.request(Request::VolumeUp(output)).await
    }

    pub async fn volume_down(&self, output: u16) -> Result<(), MatrixError> {
        self.request(Request::VolumeDown(output)).await
    }

    /// Set an output's volume (0-100)
    pub async fn set_volume(&self, output: u16, level: u16) -> Result<(), MatrixError> {
        self.request(Request::SetVolume { output, level }).await
    }

    pub async fn mute(&self, output: u16, muted: bool) -> Result<(), MatrixError> {
        self.request(Request::SetMute { output, muted }).await
    }

    pub async fn toggle_mute(&self, output: u16) -> Result<(), MatrixError> {
        self.request(Request::ToggleMute(output)).await
    }

    /// Set the device's feedback verbosity (0-3)
    pub async fn set_verbose_mode(&self, level: u8) -> Result<(), MatrixError> {
        self.request(Request::SetVerbose(level)).await
    }

    /// Send text verbatim; the terminator is appended
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), MatrixError> {
        self.request(Request::SendRaw(text.into())).await
    }

    /// Stop the actor; queued commands are discarded
    pub async fn shutdown(&self) -> Result<(), MatrixError> {
        self.send(MatrixCommand::Shutdown).await
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn is_route_ready(&self) -> bool {
        self.snapshot.borrow().route_ready
    }

    pub fn session_state(&self) -> SessionState {
        self.snapshot.borrow().session
    }

    /// Latest published state
    pub fn snapshot(&self) -> MatrixSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel for snapshot changes
    pub fn watch_snapshot(&self) -> watch::Receiver<MatrixSnapshot> {
        self.snapshot.clone()
    }

    /// Every event, unfiltered
    pub fn subscribe(&self) -> broadcast::Receiver<MatrixEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> Subscription {
        subscribe(&self.events, filter)
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    /// Resolves once the actor has stopped
    pub async fn closed(&self) {
        self.cmd_tx.closed().await
    }

    // -------------------------------------------------------------------------
    // Transport side
    // -------------------------------------------------------------------------

    pub async fn transport_connecting(&self) -> Result<(), MatrixError> {
        self.send(MatrixCommand::TransportConnecting).await
    }

    pub async fn transport_connected(
        &self,
        writer: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<(), MatrixError> {
        self.send(MatrixCommand::TransportConnected { writer }).await
    }

    pub async fn transport_disconnected(&self, reason: Option<String>) -> Result<(), MatrixError> {
        self.send(MatrixCommand::TransportDisconnected { reason }).await
    }

    pub async fn data_received(&self, data: Vec<u8>) -> Result<(), MatrixError> {
        self.send(MatrixCommand::DataReceived { data }).await
    }

    pub async fn report_error(
        &self,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), MatrixError> {
        self.send(MatrixCommand::ReportError {
            source: source.into(),
            message: message.into(),
        })
        .await
    }
}
