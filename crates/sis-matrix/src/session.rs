//! Session state machine
//!
//! ```text
//! Disconnected -> Connecting -> Handshaking -> PollingInitialState -> Ready
//!       ^                                                               |
//!       +-------------------------- disconnect -------------------------+
//! ```
//!
//! The machine is pure: each transition returns the actions the engine must
//! carry out (queue the discovery burst, arm or cancel timers, send a
//! credential). Route-ready is derived from the state, never stored.

use serde::Serialize;
use sis_protocol::PromptKind;
use tracing::{debug, info};

/// Connection lifecycle of one device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SessionState {
    /// No transport
    #[default]
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport is up, login/verbose-mode negotiation in progress
    Handshaking,
    /// Initial route and sync poll is being transmitted or settling
    PollingInitialState,
    /// Initial state is trusted; routing commands are accepted
    Ready,
}

impl SessionState {
    /// Whether a transport is attached
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Handshaking | SessionState::PollingInitialState | SessionState::Ready
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::PollingInitialState => "polling initial state",
            SessionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Which credential the device asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    Username,
    Password,
}

/// Work the engine must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Drop any queued discovery commands and cancel the settle timer
    AbortDiscovery,
    /// Send a stored credential
    SendCredential(Credential),
    /// Send the stored password if one is configured
    OfferPassword,
    /// Queue verbose-high, route polls, sync poll, verbose-low
    QueueDiscovery,
    /// Start the settle delay
    StartSettleTimer,
    /// Open the route gate, broadcast a full refresh and start liveness polls
    EnterReady,
    /// Cancel the settle and poll timers
    CancelTimers,
}

/// Session state machine
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Routing commands are accepted only once the session is ready
    pub fn is_route_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    fn set(&mut self, to: SessionState) -> Option<(SessionState, SessionState)> {
        let from = self.state;
        if from == to {
            return None;
        }
        info!("Session {} -> {}", from, to);
        self.state = to;
        Some((from, to))
    }

    /// The transport is being opened
    pub fn on_connecting(&mut self) -> Option<(SessionState, SessionState)> {
        if self.state.is_connected() {
            return None;
        }
        self.set(SessionState::Connecting)
    }

    /// The transport is up; start the handshake
    pub fn on_connected(&mut self) -> (Option<(SessionState, SessionState)>, Vec<SessionAction>) {
        let was_ready = self.state == SessionState::Ready;
        let change = self.set(SessionState::Handshaking);
        let mut actions = vec![SessionAction::AbortDiscovery];
        if was_ready {
            actions.push(SessionAction::CancelTimers);
        }
        actions.push(SessionAction::QueueDiscovery);
        (change, actions)
    }

    /// The device sent a login prompt or its banner
    pub fn on_prompt(
        &mut self,
        kind: PromptKind,
    ) -> (Option<(SessionState, SessionState)>, Vec<SessionAction>) {
        if !self.state.is_connected() {
            debug!("Ignoring {:?} prompt while {}", kind, self.state);
            return (None, Vec::new());
        }
        match kind {
            PromptKind::Username => (
                None,
                vec![SessionAction::SendCredential(Credential::Username)],
            ),
            PromptKind::Password => {
                self.restart_with_login(SessionAction::SendCredential(Credential::Password))
            }
            // Device (re)started: log in again if needed, then rediscover
            PromptKind::Banner => self.restart_with_login(SessionAction::OfferPassword),
        }
    }

    fn restart_with_login(
        &mut self,
        login: SessionAction,
    ) -> (Option<(SessionState, SessionState)>, Vec<SessionAction>) {
        let was_ready = self.state == SessionState::Ready;
        let change = self.set(SessionState::Handshaking);
        let mut actions = vec![SessionAction::AbortDiscovery];
        if was_ready {
            actions.push(SessionAction::CancelTimers);
        }
        actions.push(login);
        actions.push(SessionAction::QueueDiscovery);
        (change, actions)
    }

    /// The first discovery poll has been transmitted
    pub fn on_discovery_polling(&mut self) -> Option<(SessionState, SessionState)> {
        if self.state != SessionState::Handshaking {
            return None;
        }
        self.set(SessionState::PollingInitialState)
    }

    /// The whole discovery burst has been transmitted
    pub fn on_discovery_sent(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::PollingInitialState {
            return Vec::new();
        }
        vec![SessionAction::StartSettleTimer]
    }

    /// The settle delay has elapsed
    pub fn on_settle_elapsed(
        &mut self,
    ) -> (Option<(SessionState, SessionState)>, Vec<SessionAction>) {
        if self.state != SessionState::PollingInitialState {
            return (None, Vec::new());
        }
        let change = self.set(SessionState::Ready);
        (change, vec![SessionAction::EnterReady])
    }

    /// The transport dropped
    pub fn on_disconnected(
        &mut self,
    ) -> (Option<(SessionState, SessionState)>, Vec<SessionAction>) {
        let change = self.set(SessionState::Disconnected);
        (
            change,
            vec![SessionAction::AbortDiscovery, SessionAction::CancelTimers],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_session() -> Session {
        let mut s = Session::new();
        s.on_connecting();
        s.on_connected();
        s.on_discovery_polling();
        assert_eq!(s.on_discovery_sent(), vec![SessionAction::StartSettleTimer]);
        s.on_settle_elapsed();
        s
    }

    #[test]
    fn test_happy_path() {
        let mut s = Session::new();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(
            s.on_connecting(),
            Some((SessionState::Disconnected, SessionState::Connecting))
        );
        let (change, actions) = s.on_connected();
        assert_eq!(change, Some((SessionState::Connecting, SessionState::Handshaking)));
        assert!(actions.contains(&SessionAction::QueueDiscovery));
        assert!(!s.is_route_ready());

        s.on_discovery_polling();
        assert_eq!(s.state(), SessionState::PollingInitialState);
        assert!(!s.is_route_ready());

        let (change, actions) = s.on_settle_elapsed();
        assert_eq!(
            change,
            Some((SessionState::PollingInitialState, SessionState::Ready))
        );
        assert_eq!(actions, vec![SessionAction::EnterReady]);
        assert!(s.is_route_ready());
    }

    #[test]
    fn test_settle_ignored_unless_polling() {
        let mut s = Session::new();
        s.on_connected();
        let (change, actions) = s.on_settle_elapsed();
        assert!(change.is_none());
        assert!(actions.is_empty());
        assert_eq!(s.state(), SessionState::Handshaking);
    }

    #[test]
    fn test_disconnect_clears_ready() {
        let mut s = ready_session();
        let (change, actions) = s.on_disconnected();
        assert_eq!(change, Some((SessionState::Ready, SessionState::Disconnected)));
        assert!(actions.contains(&SessionAction::CancelTimers));
        assert!(!s.is_route_ready());
    }

    #[test]
    fn test_password_prompt_restarts_handshake() {
        let mut s = Session::new();
        s.on_connected();
        s.on_discovery_polling();
        let (change, actions) = s.on_prompt(PromptKind::Password);
        assert_eq!(
            change,
            Some((SessionState::PollingInitialState, SessionState::Handshaking))
        );
        assert_eq!(
            actions,
            vec![
                SessionAction::AbortDiscovery,
                SessionAction::SendCredential(Credential::Password),
                SessionAction::QueueDiscovery,
            ]
        );
    }

    #[test]
    fn test_banner_mid_handshake_offers_password() {
        let mut s = Session::new();
        s.on_connected();
        s.on_discovery_polling();
        let (change, actions) = s.on_prompt(PromptKind::Banner);
        assert_eq!(
            change,
            Some((SessionState::PollingInitialState, SessionState::Handshaking))
        );
        assert_eq!(
            actions,
            vec![
                SessionAction::AbortDiscovery,
                SessionAction::OfferPassword,
                SessionAction::QueueDiscovery,
            ]
        );

        let mut s = ready_session();
        let (change, actions) = s.on_prompt(PromptKind::Banner);
        assert_eq!(change, Some((SessionState::Ready, SessionState::Handshaking)));
        assert!(actions.contains(&SessionAction::CancelTimers));
        assert!(actions.contains(&SessionAction::QueueDiscovery));
    }

    #[test]
    fn test_prompt_ignored_when_disconnected() {
        let mut s = Session::new();
        let (change, actions) = s.on_prompt(PromptKind::Password);
        assert!(change.is_none());
        assert!(actions.is_empty());
    }
}
