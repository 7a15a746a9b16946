//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the hub for [`TrackerEvent`]s. Share it via
//! `Arc<EventBus>`; the cache publishes only after releasing its lock, so a
//! subscriber may immediately read the cache from its handler.

use chrono::{DateTime, Utc};
use playertrack_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Any cache mutation settled.
pub const CACHE_CHANGED: &str = "cache.changed";
/// A player entered the cache for the first time.
pub const PLAYER_ADDED: &str = "player.added";
/// One player's record changed.
pub const PLAYER_UPDATED: &str = "player.updated";
/// Duplicate records were merged into a survivor.
pub const PLAYERS_MERGED: &str = "players.merged";
/// A lodestone lookup reached a new status.
pub const LOOKUP_RESOLVED: &str = "lookup.resolved";

// ---------------------------------------------------------------------------
// TrackerEvent
// ---------------------------------------------------------------------------

/// A notification emitted by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerEvent {
    /// Dot-separated event name, e.g. `"player.updated"`.
    pub event_type: String,

    /// Player the event concerns, if any.
    pub player_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl TrackerEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            player_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn cache_changed() -> Self {
        Self::new(CACHE_CHANGED)
    }

    pub fn player_updated(player_id: DbId) -> Self {
        Self::new(PLAYER_UPDATED).with_player(player_id)
    }

    pub fn with_player(mut self, player_id: DbId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use playertrack_events::bus::{EventBus, TrackerEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(TrackerEvent::cache_changed());
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when nobody
    /// is listening.
    pub fn publish(&self, event: TrackerEvent) {
        tracing::trace!(event_type = %event.event_type, player_id = ?event.player_id, "Publishing event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            TrackerEvent::player_updated(42).with_payload(serde_json::json!({"name": "Foo Bar"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert!(received.is(PLAYER_UPDATED));
        assert_eq!(received.player_id, Some(42));
        assert_eq!(received.payload["name"], "Foo Bar");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(TrackerEvent::cache_changed());

        assert!(rx1.recv().await.unwrap().is(CACHE_CHANGED));
        assert!(rx2.recv().await.unwrap().is(CACHE_CHANGED));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(TrackerEvent::cache_changed());
    }

    #[test]
    fn bare_event_has_empty_payload() {
        let event = TrackerEvent::new(LOOKUP_RESOLVED);
        assert!(event.player_id.is_none());
        assert!(event.payload.is_object());
    }
}
