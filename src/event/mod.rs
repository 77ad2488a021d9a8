//! Event system for presentation layers.
//!
//! The engine never touches UI state. Everything a front end needs to render
//! (coordinates, temperatures, mesh progress, the busy gauge) is published as
//! an [`Event`] on a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

/// Event types that can be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Serial port opened.
    Connected { port: String, baud_rate: u32 },
    /// Serial port closed.
    Disconnected,
    /// The port could not be opened or the link dropped.
    ConnectionError { message: String },
    /// Position report received (values as reported).
    Position { x: String, y: String, z: String },
    /// Mesh grid size became known.
    MeshGeometry {
        count_x: u32,
        count_y: u32,
        total_points: u32,
    },
    /// Mesh Z search height received.
    MeshStartHeight { z: f64 },
    /// Bed temperature received.
    Temperature { bed: f64 },
    /// Handshake counter changed.
    HandshakeProgress { count: u8, max: u8 },
    /// Leveling moved to a mesh point (`point == total` when finished).
    LevelingProgress { point: u32, total: u32 },
    /// Commanded Z height changed.
    TargetZ { z: f64 },
}

/// Discriminant of an [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    ConnectionError,
    Position,
    MeshGeometry,
    MeshStartHeight,
    Temperature,
    HandshakeProgress,
    LevelingProgress,
    TargetZ,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::ConnectionError { .. } => EventKind::ConnectionError,
            Self::Position { .. } => EventKind::Position,
            Self::MeshGeometry { .. } => EventKind::MeshGeometry,
            Self::MeshStartHeight { .. } => EventKind::MeshStartHeight,
            Self::Temperature { .. } => EventKind::Temperature,
            Self::HandshakeProgress { .. } => EventKind::HandshakeProgress,
            Self::LevelingProgress { .. } => EventKind::LevelingProgress,
            Self::TargetZ { .. } => EventKind::TargetZ,
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event subscriber lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receives the next event matching `filter`, skipping the rest.
    pub async fn recv_matching(&mut self, filter: &EventFilter) -> Option<Event> {
        loop {
            let event = self.recv().await?;
            if filter.matches(&event) {
                return Some(event);
            }
        }
    }
}

/// Subscription filter for specific event types.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event kinds.
    pub kinds: Option<Vec<EventKind>>,
    /// Only match handshake progress at its ceiling.
    pub handshake_complete: bool,
}

impl EventFilter {
    /// Creates a filter for specific event kinds.
    #[must_use]
    pub const fn kinds(kinds: Vec<EventKind>) -> Self {
        Self {
            kinds: Some(kinds),
            handshake_complete: false,
        }
    }

    /// Creates a filter for a completed handshake.
    #[must_use]
    pub fn handshake_complete() -> Self {
        Self {
            kinds: Some(vec![EventKind::HandshakeProgress]),
            handshake_complete: true,
        }
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }

        if self.handshake_complete {
            if let Event::HandshakeProgress { count, max } = event {
                if count != max {
                    return false;
                }
            } else {
                return false;
            }
        }

        true
    }
}

struct EventDispatcherInner {
    sender: broadcast::Sender<Event>,
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherInner>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(EventDispatcherInner { sender }),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Only events dispatched after this call are considered. Returns `None`
    /// if the timeout expires or the channel is closed.
    pub async fn wait_for(&self, filter: EventFilter, timeout: Duration) -> Option<Event> {
        let mut subscription = self.subscribe();
        tokio::time::timeout(timeout, subscription.recv_matching(&filter))
            .await
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(Event::Disconnected);

        let event = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap();

        assert_eq!(event, Some(Event::Disconnected));
    }

    #[tokio::test]
    async fn test_zero_capacity_still_delivers() {
        let dispatcher = EventDispatcher::new(0);
        let mut sub = dispatcher.subscribe();
        dispatcher.dispatch(Event::Disconnected);
        assert_eq!(sub.recv().await, Some(Event::Disconnected));
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::kinds(vec![EventKind::Temperature, EventKind::Position]);

        assert!(filter.matches(&Event::Temperature { bed: 60.0 }));
        assert!(filter.matches(&Event::Position {
            x: "0.00".into(),
            y: "0.00".into(),
            z: "0.00".into(),
        }));
        assert!(!filter.matches(&Event::Disconnected));
    }

    #[test]
    fn test_handshake_filter() {
        let filter = EventFilter::handshake_complete();

        assert!(filter.matches(&Event::HandshakeProgress { count: 6, max: 6 }));
        assert!(!filter.matches(&Event::HandshakeProgress { count: 3, max: 6 }));
        assert!(!filter.matches(&Event::TargetZ { z: 0.0 }));
    }

    #[tokio::test]
    async fn test_recv_matching_skips_other_events() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(Event::HandshakeProgress { count: 1, max: 6 });
        dispatcher.dispatch(Event::TargetZ { z: 0.3 });
        dispatcher.dispatch(Event::HandshakeProgress { count: 6, max: 6 });

        let event = sub
            .recv_matching(&EventFilter::handshake_complete())
            .await;
        assert_eq!(event, Some(Event::HandshakeProgress { count: 6, max: 6 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let dispatcher = EventDispatcher::new(16);
        let event = dispatcher
            .wait_for(
                EventFilter::kinds(vec![EventKind::MeshGeometry]),
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(event, None);
    }
}
