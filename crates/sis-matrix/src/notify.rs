//! Change notification
//!
//! Push: every [`MatrixEvent`] goes out on a broadcast channel, optionally
//! narrowed per subscriber with an [`EventFilter`].
//! Pull: the latest [`MatrixSnapshot`] is kept in a watch channel so readers
//! never wait on the engine.

use serde::Serialize;
use sis_protocol::{DeviceInfo, SignalKind};
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::events::MatrixEvent;
use crate::session::SessionState;
use crate::state::RoutingState;

/// Broadcast capacity; slow subscribers skip ahead past this many events
const EVENT_CAPACITY: usize = 1024;

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixSnapshot {
    pub session: SessionState,
    pub route_ready: bool,
    pub routing: RoutingState,
}

impl MatrixSnapshot {
    /// Input feeding `output` for `kind`, if the output is configured
    pub fn source(&self, output: u16, kind: SignalKind) -> Option<u16> {
        self.routing.output(output).map(|o| o.source(kind))
    }

    pub fn source_name(&self, output: u16, kind: SignalKind) -> String {
        self.routing.source_name(output, kind)
    }

    pub fn sync_detected(&self, input: u16) -> Option<bool> {
        self.routing.input(input).map(|i| i.sync_detected)
    }

    pub fn volume(&self, output: u16) -> Option<u16> {
        self.routing.output(output).and_then(|o| o.volume)
    }

    pub fn muted(&self, output: u16) -> Option<bool> {
        self.routing.output(output).map(|o| o.muted)
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.routing.device_info()
    }
}

/// Which events a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Everything
    All,
    /// Route, name, volume and mute changes of one output
    Output(u16),
    /// Sync changes of one input
    Input(u16),
    /// Route and source-name changes of every output
    Routes,
    /// Session state and route-ready changes
    Session,
    /// Traffic lines only
    Traffic,
    /// Everything except traffic lines
    NoTraffic,
}

impl EventFilter {
    pub fn matches(&self, event: &MatrixEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Output(slot) => event.output() == Some(*slot),
            EventFilter::Input(slot) => event.input() == Some(*slot),
            EventFilter::Routes => event.is_route(),
            EventFilter::Session => event.is_session(),
            EventFilter::Traffic => event.is_traffic(),
            EventFilter::NoTraffic => !event.is_traffic(),
        }
    }
}

/// A filtered event receiver
pub struct Subscription {
    rx: broadcast::Receiver<MatrixEvent>,
    filter: EventFilter,
}

impl Subscription {
    /// Wait for the next matching event; `None` once the engine is gone
    pub async fn recv(&mut self) -> Option<MatrixEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscriber lagged, skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered
    pub fn try_recv(&mut self) -> Option<MatrixEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Subscriber lagged, skipped {} events", n);
                }
                Err(_) => return None,
            }
        }
    }
}

/// Publishing side, owned by the engine
#[derive(Debug)]
pub struct Notifier {
    events: broadcast::Sender<MatrixEvent>,
    snapshot: watch::Sender<MatrixSnapshot>,
}

impl Notifier {
    pub fn new(initial: MatrixSnapshot) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot, _) = watch::channel(initial);
        Self { events, snapshot }
    }

    /// Publish one event; having no subscribers is not an error
    pub fn publish(&self, event: MatrixEvent) {
        let _ = self.events.send(event);
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = MatrixEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Replace the pull-side snapshot
    pub fn update_snapshot(&self, snapshot: MatrixSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    pub fn event_sender(&self) -> broadcast::Sender<MatrixEvent> {
        self.events.clone()
    }

    pub fn snapshot_receiver(&self) -> watch::Receiver<MatrixSnapshot> {
        self.snapshot.subscribe()
    }
}

/// Subscribe to a broadcast sender with a filter
pub fn subscribe(events: &broadcast::Sender<MatrixEvent>, filter: EventFilter) -> Subscription {
    Subscription {
        rx: events.subscribe(),
        filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatrixConfig;
    use sis_protocol::Dialect;

    fn notifier() -> Notifier {
        let config = MatrixConfig::with_counts(Dialect::AvMatrix, 2, 2);
        Notifier::new(MatrixSnapshot {
            session: SessionState::Disconnected,
            route_ready: false,
            routing: RoutingState::new(&config),
        })
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let n = notifier();
        let mut out2 = subscribe(&n.event_sender(), EventFilter::Output(2));
        let mut all = subscribe(&n.event_sender(), EventFilter::All);

        n.publish(MatrixEvent::VideoRouteChanged {
            output: 1,
            input: 1,
        });
        n.publish(MatrixEvent::MuteChanged {
            output: 2,
            muted: true,
        });

        assert_eq!(
            out2.recv().await,
            Some(MatrixEvent::MuteChanged {
                output: 2,
                muted: true
            })
        );
        assert!(out2.try_recv().is_none());
        assert!(matches!(
            all.recv().await,
            Some(MatrixEvent::VideoRouteChanged { output: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_subscription_ends() {
        let n = notifier();
        let mut sub = subscribe(&n.event_sender(), EventFilter::All);
        drop(n);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_snapshot_updates() {
        let n = notifier();
        let rx = n.snapshot_receiver();
        let mut snap = rx.borrow().clone();
        snap.route_ready = true;
        n.update_snapshot(snap);
        assert!(rx.borrow().route_ready);
    }

    #[test]
    fn test_filters() {
        let sync = MatrixEvent::SyncChanged {
            input: 1,
            detected: true,
        };
        assert!(EventFilter::Input(1).matches(&sync));
        assert!(!EventFilter::Input(2).matches(&sync));
        assert!(!EventFilter::Routes.matches(&sync));
        assert!(EventFilter::NoTraffic.matches(&sync));
        assert!(!EventFilter::NoTraffic.matches(&MatrixEvent::LineOut { line: "0LS".into() }));
    }
}
