//! Matrix session actor
//!
//! All state for one device lives in this actor: the routing store, the
//! session state machine, the line codec and the outbound queue. Callers and
//! the transport talk to it through [`MatrixCommand`]s, so received lines are
//! processed strictly in arrival order and every transmitted command goes
//! through one paced write path.
//!
//! # Timers
//!
//! Three deadlines drive the loop besides incoming commands:
//! - the next permitted transmit time (command spacing)
//! - the settle delay after the initial poll
//! - the recurring liveness poll
//!
//! All of them are plain `Option<Instant>` values owned by the actor, so
//! cancelling a timer is just clearing its deadline.

use std::collections::VecDeque;

use sis_protocol::error_code::format_error;
use sis_protocol::{describe, Feedback, FeedbackCodec, ProtocolCodec, SignalKind, SisCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::MatrixConfig;
use crate::error::MatrixError;
use crate::events::MatrixEvent;
use crate::notify::{MatrixSnapshot, Notifier};
use crate::session::{Credential, Session, SessionAction, SessionState};
use crate::state::RoutingState;

/// Caller operations other than routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Firmware, information and sync query
    Poll,
    /// Route query for every output (plus volume/mute where supported)
    PollRoutes,
    /// Sync bitmap query
    PollSync,
    /// Recall a global preset
    RecallPreset(u16),
    VolumeUp(u16),
    VolumeDown(u16),
    SetVolume { output: u16, level: u16 },
    SetMute { output: u16, muted: bool },
    /// Flip the mute state last reported for this output
    ToggleMute(u16),
    /// Set feedback verbosity (0-3)
    SetVerbose(u8),
    /// Send text as-is, terminator appended
    SendRaw(String),
}

/// Commands sent to the matrix actor
#[derive(Debug)]
pub enum MatrixCommand {
    /// The transport is opening a connection
    TransportConnecting,

    /// The transport is connected; bytes sent on `writer` go to the device
    TransportConnected {
        /// Write path to the device
        writer: mpsc::UnboundedSender<Vec<u8>>,
    },

    /// The transport lost its connection
    TransportDisconnected {
        /// Why, if known
        reason: Option<String>,
    },

    /// Raw bytes read from the device
    DataReceived {
        /// Bytes as read, not yet split into lines
        data: Vec<u8>,
    },

    /// Route an input to an output
    Route {
        input: u16,
        output: u16,
        kind: SignalKind,
        /// Channel to send back the result
        response: oneshot::Sender<Result<(), MatrixError>>,
    },

    /// Any other caller operation
    Request {
        request: Request,
        /// Channel to send back the result
        response: oneshot::Sender<Result<(), MatrixError>>,
    },

    /// Report an error from an async task (emits MatrixEvent::Error)
    ReportError {
        /// Source of the error (e.g., "Transport")
        source: String,
        /// Error message
        message: String,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Entry in the outbound queue
#[derive(Debug)]
enum Outbound {
    Command(SisCommand),
    /// Discovery has moved past the verbose-mode command
    PollingStarted,
    /// Every discovery command has been transmitted
    DiscoverySent,
}

/// Where transmitted bytes go
#[derive(Debug)]
enum Link {
    Down,
    /// Virtual mode without a device: commands are reported but not written
    Detached,
    Up(mpsc::UnboundedSender<Vec<u8>>),
}

/// Internal state for the matrix actor
struct Engine {
    config: MatrixConfig,
    session: Session,
    routing: RoutingState,
    codec: FeedbackCodec,
    link: Link,
    outbound: VecDeque<Outbound>,
    /// Earliest time the next command may be transmitted
    next_send_at: Instant,
    settle_at: Option<Instant>,
    poll_at: Option<Instant>,
    notifier: Notifier,
    /// Snapshot needs republishing
    dirty: bool,
}

impl Engine {
    fn new(config: MatrixConfig, notifier: Notifier) -> Self {
        Self {
            routing: RoutingState::new(&config),
            codec: FeedbackCodec::new(config.dialect),
            session: Session::new(),
            link: Link::Down,
            outbound: VecDeque::new(),
            next_send_at: Instant::now(),
            settle_at: None,
            poll_at: None,
            notifier,
            dirty: true,
            config,
        }
    }

    fn next_send_deadline(&self) -> Option<Instant> {
        if self.outbound.is_empty() || matches!(self.link, Link::Down) {
            None
        } else {
            Some(self.next_send_at)
        }
    }

    fn publish(&mut self, events: Vec<MatrixEvent>) {
        if !events.is_empty() {
            self.dirty = true;
        }
        self.notifier.publish_all(events);
    }

    fn publish_snapshot(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.notifier.update_snapshot(MatrixSnapshot {
            session: self.session.state(),
            route_ready: self.session.is_route_ready(),
            routing: self.routing.clone(),
        });
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    fn transition(&mut self, change: Option<(SessionState, SessionState)>) {
        let Some((from, to)) = change else {
            return;
        };
        let mut events = vec![MatrixEvent::SessionStateChanged { from, to }];
        let was_ready = from == SessionState::Ready;
        let is_ready = to == SessionState::Ready;
        if was_ready != is_ready {
            info!("Route ready: {}", is_ready);
            events.push(MatrixEvent::RouteReadyChanged { ready: is_ready });
        }
        self.dirty = true;
        self.publish(events);
    }

    fn run_actions(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::AbortDiscovery => {
                    if !self.outbound.is_empty() {
                        debug!("Dropping {} queued commands", self.outbound.len());
                    }
                    self.outbound.clear();
                    self.settle_at = None;
                }
                SessionAction::SendCredential(kind) => self.queue_credential(kind),
                SessionAction::OfferPassword => {
                    if let Some(password) = self.config.password.clone() {
                        self.enqueue(SisCommand::Credential(password));
                    }
                }
                SessionAction::QueueDiscovery => self.queue_discovery(),
                SessionAction::StartSettleTimer => {
                    debug!("Initial poll sent, settling for {:?}", self.config.settle());
                    self.settle_at = Some(Instant::now() + self.config.settle());
                }
                SessionAction::EnterReady => {
                    let refresh = self.routing.refresh_all();
                    self.publish(refresh);
                    self.poll_at = Some(Instant::now());
                }
                SessionAction::CancelTimers => {
                    self.settle_at = None;
                    self.poll_at = None;
                }
            }
        }
    }

    fn on_connecting(&mut self) {
        let change = self.session.on_connecting();
        self.transition(change);
    }

    fn on_connected(&mut self, link: Link) {
        match &link {
            Link::Detached => info!("Virtual session started without a device"),
            _ => info!("Transport connected"),
        }
        self.link = link;
        self.codec.clear();
        self.next_send_at = Instant::now();
        let (change, actions) = self.session.on_connected();
        self.transition(change);
        self.run_actions(actions);
    }

    fn on_disconnected(&mut self, reason: Option<String>) {
        match &reason {
            Some(reason) => warn!("Transport disconnected: {}", reason),
            None => info!("Transport disconnected"),
        }
        self.link = Link::Down;
        self.codec.clear();
        let (change, actions) = self.session.on_disconnected();
        self.transition(change);
        self.run_actions(actions);
        if let Some(message) = reason {
            self.publish(vec![MatrixEvent::Error {
                source: "Transport".into(),
                message,
            }]);
        }
    }

    fn on_settle_elapsed(&mut self) {
        self.settle_at = None;
        let (change, actions) = self.session.on_settle_elapsed();
        self.transition(change);
        self.run_actions(actions);
    }

    fn on_poll_tick(&mut self) {
        self.poll_at = Some(Instant::now() + self.config.poll_interval());
        if self.session.state().is_connected() {
            debug!("Liveness poll");
            self.queue_liveness_poll();
        }
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    fn enqueue(&mut self, command: SisCommand) {
        self.outbound.push_back(Outbound::Command(command));
    }

    fn queue_credential(&mut self, kind: Credential) {
        let credential = match kind {
            Credential::Username => self.config.username.clone(),
            Credential::Password => self.config.password.clone(),
        };
        match credential {
            Some(text) => self.enqueue(SisCommand::Credential(text)),
            None => warn!("Device asked for {:?} but none is configured", kind),
        }
    }

    fn queue_discovery(&mut self) {
        let d = self.config.dialect.descriptor();
        self.enqueue(SisCommand::SetVerbose(d.discovery_verbose_level));
        self.outbound.push_back(Outbound::PollingStarted);
        self.queue_route_polls();
        self.enqueue(SisCommand::PollSync);
        self.enqueue(SisCommand::SetVerbose(d.steady_verbose_level));
        self.outbound.push_back(Outbound::DiscoverySent);
    }

    fn queue_route_polls(&mut self) {
        let polls_levels = self.config.dialect.descriptor().polls_audio_levels;
        let outputs: Vec<u16> = self.routing.outputs().map(|o| o.slot).collect();
        for output in outputs {
            self.enqueue(SisCommand::QueryTie {
                output,
                kind: SignalKind::Video,
            });
            self.enqueue(SisCommand::QueryTie {
                output,
                kind: SignalKind::Audio,
            });
            if polls_levels {
                self.enqueue(SisCommand::QueryVolume(output));
                self.enqueue(SisCommand::QueryMute(output));
            }
        }
    }

    fn queue_liveness_poll(&mut self) {
        self.enqueue(SisCommand::PollFirmware);
        if self.config.dialect.descriptor().info_poll.is_some() {
            self.enqueue(SisCommand::PollInformation);
        }
        self.enqueue(SisCommand::PollSync);
    }

    /// Transmit the next queued command, handling any markers around it
    fn flush_outbound(&mut self) {
        self.drain_markers();
        if let Some(Outbound::Command(command)) = self.outbound.pop_front() {
            self.transmit(&command);
            self.next_send_at = Instant::now() + self.config.command_spacing();
        }
        self.drain_markers();
    }

    fn drain_markers(&mut self) {
        while let Some(front) = self.outbound.front() {
            match front {
                Outbound::Command(_) => break,
                Outbound::PollingStarted => {
                    self.outbound.pop_front();
                    let change = self.session.on_discovery_polling();
                    self.transition(change);
                }
                Outbound::DiscoverySent => {
                    self.outbound.pop_front();
                    let actions = self.session.on_discovery_sent();
                    self.run_actions(actions);
                }
            }
        }
    }

    fn transmit(&mut self, command: &SisCommand) {
        let dialect = self.config.dialect;
        let line = match command {
            SisCommand::Credential(_) => "****".to_string(),
            other => other.to_wire_string(dialect),
        };
        debug!("Sending {:?}", line);
        match &self.link {
            Link::Up(writer) => {
                if writer.send(command.encode(dialect)).is_err() {
                    warn!("Write path closed, dropping {:?}", line);
                    return;
                }
            }
            Link::Detached => {}
            Link::Down => {
                debug!("No transport, dropping {:?}", line);
                return;
            }
        }
        self.notifier.publish(MatrixEvent::LineOut { line });
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn on_data(&mut self, data: &[u8]) {
        self.codec.push_bytes(data);
        while let Some((feedback, raw)) = self.codec.next_command_with_bytes() {
            let line = String::from_utf8_lossy(&raw).into_owned();
            debug!("Received {:?}", line);
            self.notifier.publish(MatrixEvent::LineIn { line });
            self.apply_feedback(feedback);
        }
    }

    /// Feed a locally produced line through the same path as device input
    fn inject_line(&mut self, line: &str) {
        debug!("Loopback {:?}", line);
        self.notifier.publish(MatrixEvent::LineIn {
            line: line.to_string(),
        });
        let feedback = sis_protocol::classify(line, self.config.dialect);
        self.apply_feedback(feedback);
    }

    fn apply_feedback(&mut self, feedback: Feedback) {
        let events = match feedback {
            Feedback::RouteChanged {
                output,
                input,
                kind,
            } => {
                debug!("Route report: output {} <- input {} ({})", output, input, kind);
                self.routing.apply_route(output, input, kind)
            }
            Feedback::SyncStatus { bits } => self.routing.apply_sync_bitmap(&bits),
            Feedback::FirmwareInfo(info) => {
                info!("Device firmware: {}", info.firmware_version);
                self.routing.set_device_info(info)
            }
            Feedback::VolumeLevel { output, level } => self.routing.apply_volume(output, level),
            Feedback::MuteState { output, muted } => self.routing.apply_mute(output, muted),
            Feedback::ErrorCode(code) => {
                warn!("Device reported {}", format_error(code));
                vec![MatrixEvent::DeviceError {
                    code,
                    description: describe(code),
                }]
            }
            Feedback::LoginPrompt(kind) => {
                debug!("Login prompt: {:?}", kind);
                let (change, actions) = self.session.on_prompt(kind);
                self.transition(change);
                self.run_actions(actions);
                Vec::new()
            }
            Feedback::Unrecognized(line) => {
                debug!("Unhandled line {:?}", line);
                Vec::new()
            }
        };
        self.publish(events);
    }

    // -------------------------------------------------------------------------
    // Caller operations
    // -------------------------------------------------------------------------

    fn check_output(&self, output: u16) -> Result<(), MatrixError> {
        if self.routing.output(output).is_none() {
            return Err(MatrixError::UnknownOutput(output));
        }
        Ok(())
    }

    fn route(&mut self, input: u16, output: u16, kind: SignalKind) -> Result<(), MatrixError> {
        self.check_output(output)?;
        if input != 0 && self.routing.input(input).is_none() {
            return Err(MatrixError::UnknownInput(input));
        }
        if !self.session.is_route_ready() {
            debug!("Session is {}, route gate closed", self.session.state());
            return Err(MatrixError::RouteNotReady);
        }

        let command = SisCommand::tie(input, output, kind)?;
        let loopback = command.tie_feedback();
        info!("Routing input {} to output {} ({})", input, output, kind);
        self.enqueue(command);

        if self.config.virtual_mode {
            if let Some(line) = loopback {
                self.inject_line(&line);
            }
        }
        Ok(())
    }

    fn request(&mut self, request: Request) -> Result<(), MatrixError> {
        if !self.session.state().is_connected() {
            return Err(MatrixError::NotConnected);
        }
        match request {
            Request::Poll => self.queue_liveness_poll(),
            Request::PollRoutes => self.queue_route_polls(),
            Request::PollSync => self.enqueue(SisCommand::PollSync),
            Request::RecallPreset(preset) => self.enqueue(SisCommand::recall_preset(preset)?),
            Request::VolumeUp(output) => {
                self.check_output(output)?;
                self.enqueue(SisCommand::volume_up(output)?);
            }
            Request::VolumeDown(output) => {
                self.check_output(output)?;
                self.enqueue(SisCommand::volume_down(output)?);
            }
            Request::SetVolume { output, level } => {
                self.check_output(output)?;
                self.enqueue(SisCommand::set_volume(output, level)?);
            }
            Request::SetMute { output, muted } => {
                self.check_output(output)?;
                self.enqueue(SisCommand::mute(output, muted)?);
            }
            Request::ToggleMute(output) => {
                let muted = self
                    .routing
                    .output(output)
                    .map(|o| o.muted)
                    .ok_or(MatrixError::UnknownOutput(output))?;
                self.enqueue(SisCommand::mute(output, !muted)?);
            }
            Request::SetVerbose(level) => self.enqueue(SisCommand::set_verbose(level)?),
            Request::SendRaw(text) => self.enqueue(SisCommand::Raw(text)),
        }
        Ok(())
    }

    /// Handle one command; returns false when the actor should stop
    fn handle_command(&mut self, cmd: MatrixCommand) -> bool {
        match cmd {
            MatrixCommand::TransportConnecting => self.on_connecting(),
            MatrixCommand::TransportConnected { writer } => self.on_connected(Link::Up(writer)),
            MatrixCommand::TransportDisconnected { reason } => self.on_disconnected(reason),
            MatrixCommand::DataReceived { data } => self.on_data(&data),
            MatrixCommand::Route {
                input,
                output,
                kind,
                response,
            } => {
                let result = self.route(input, output, kind);
                if let Err(e) = &result {
                    warn!("Route {} -> {} ({}) rejected: {}", input, output, kind, e);
                }
                self.publish_snapshot();
                let _ = response.send(result);
            }
            MatrixCommand::Request { request, response } => {
                let result = self.request(request);
                if let Err(e) = &result {
                    warn!("Request rejected: {}", e);
                }
                let _ = response.send(result);
            }
            MatrixCommand::ReportError { source, message } => {
                warn!("{}: {}", source, message);
                self.publish(vec![MatrixEvent::Error { source, message }]);
            }
            MatrixCommand::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Run the matrix actor
///
/// Processes commands until `Shutdown` is received or every sender is
/// dropped. Events and snapshots are published through `notifier`.
pub async fn run_matrix_actor(
    config: MatrixConfig,
    mut cmd_rx: mpsc::Receiver<MatrixCommand>,
    notifier: Notifier,
) {
    let virtual_mode = config.virtual_mode;
    let mut engine = Engine::new(config, notifier);
    info!(
        "Matrix actor started ({}, {} inputs, {} outputs)",
        engine.config.dialect.name(),
        engine.config.inputs.len(),
        engine.config.outputs.len()
    );

    if virtual_mode {
        engine.on_connected(Link::Detached);
    }
    engine.publish_snapshot();

    loop {
        let send_at = engine.next_send_deadline();
        let settle_at = engine.settle_at;
        let poll_at = engine.poll_at;

        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                if !engine.handle_command(cmd) {
                    break;
                }
            }
            _ = wait_until(send_at) => engine.flush_outbound(),
            _ = wait_until(settle_at) => engine.on_settle_elapsed(),
            _ = wait_until(poll_at) => engine.on_poll_tick(),
        }

        engine.publish_snapshot();
    }

    info!("Matrix actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sis_protocol::Dialect;

    fn engine(config: MatrixConfig) -> Engine {
        let routing = RoutingState::new(&config);
        let notifier = Notifier::new(MatrixSnapshot {
            session: SessionState::Disconnected,
            route_ready: false,
            routing,
        });
        Engine::new(config, notifier)
    }

    fn queued(engine: &Engine) -> Vec<String> {
        engine
            .outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Command(c) => Some(c.to_wire_string(Dialect::AvMatrix)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_discovery_sequence() {
        let mut e = engine(MatrixConfig::with_counts(Dialect::AvMatrix, 2, 2));
        let (tx, _rx) = mpsc::unbounded_channel();
        e.on_connected(Link::Up(tx));
        assert_eq!(
            queued(&e),
            vec!["\x1B3CV", "1%", "1$", "2%", "2$", "0LS", "\x1B1CV"]
        );
        assert_eq!(e.session.state(), SessionState::Handshaking);
    }

    #[tokio::test]
    async fn test_xtp_discovery_polls_levels() {
        let mut e = engine(MatrixConfig::with_counts(Dialect::Xtp, 1, 1));
        e.on_connected(Link::Detached);
        assert_eq!(queued(&e), vec!["\x1B3CV", "1%", "1$", "1V", "1Z", "0LS", "\x1B1CV"]);
    }

    #[tokio::test]
    async fn test_markers_drive_session() {
        let mut e = engine(MatrixConfig::with_counts(Dialect::AvMatrix, 1, 1));
        e.on_connected(Link::Detached);
        e.flush_outbound();
        assert_eq!(e.session.state(), SessionState::PollingInitialState);
        while !e.outbound.is_empty() {
            e.flush_outbound();
        }
        assert!(e.settle_at.is_some());
        e.on_settle_elapsed();
        assert!(e.session.is_route_ready());
        assert!(e.poll_at.is_some());
    }

    #[tokio::test]
    async fn test_password_prompt_sends_credential_first() {
        let mut config = MatrixConfig::with_counts(Dialect::AvMatrix, 1, 1);
        config.password = Some("secret".into());
        let mut e = engine(config);
        e.on_connected(Link::Detached);
        e.on_data(b"Password:\r\n");
        match e.outbound.front() {
            Some(Outbound::Command(SisCommand::Credential(p))) => assert_eq!(p, "secret"),
            other => panic!("unexpected queue head {:?}", other),
        }
        assert_eq!(e.session.state(), SessionState::Handshaking);
    }

    #[tokio::test]
    async fn test_requests_need_connection() {
        let mut e = engine(MatrixConfig::with_counts(Dialect::AvMatrix, 1, 1));
        assert!(matches!(
            e.request(Request::PollSync),
            Err(MatrixError::NotConnected)
        ));
        e.on_connected(Link::Detached);
        assert!(e.request(Request::PollSync).is_ok());
        assert!(matches!(
            e.request(Request::SetVolume {
                output: 1,
                level: 101
            }),
            Err(MatrixError::Protocol(_))
        ));
        assert!(matches!(
            e.request(Request::VolumeUp(5)),
            Err(MatrixError::UnknownOutput(5))
        ));
    }

    #[tokio::test]
    async fn test_toggle_mute_uses_reported_state() {
        let mut e = engine(MatrixConfig::with_counts(Dialect::Xtp, 1, 2));
        e.on_connected(Link::Detached);
        e.outbound.clear();
        e.on_data(b"Amt2 1\n");
        e.request(Request::ToggleMute(2)).unwrap();
        assert_eq!(queued(&e), vec!["2*0Z"]);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_timers() {
        let mut e = engine(MatrixConfig::with_counts(Dialect::AvMatrix, 1, 1));
        e.on_connected(Link::Detached);
        while !e.outbound.is_empty() {
            e.flush_outbound();
        }
        e.on_settle_elapsed();
        e.on_disconnected(None);
        assert!(e.settle_at.is_none());
        assert!(e.poll_at.is_none());
        assert!(e.outbound.is_empty());
        assert!(!e.session.is_route_ready());
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_route_rejections_are_logged() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut e = engine(MatrixConfig::with_counts(Dialect::AvMatrix, 2, 2));
            for (input, output) in [(9, 1), (1, 7)] {
                let (tx, mut rx) = oneshot::channel();
                assert!(e.handle_command(MatrixCommand::Route {
                    input,
                    output,
                    kind: SignalKind::Video,
                    response: tx,
                }));
                assert!(rx.try_recv().unwrap().is_err());
            }
        });

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("unknown input: 9"), "{}", text);
        assert!(text.contains("unknown output: 7"), "{}", text);
    }
}
