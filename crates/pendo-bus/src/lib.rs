// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process realtime distribution for the Pendo chat core.
//!
//! One broadcast channel per logical room: `chat:<conversation id>` for
//! the two participants of a conversation, [`GLOBAL_QUEUE`] for
//! counsellors watching the waiting queue, and [`GLOBAL_NOTIFICATIONS`]
//! for out-of-band alerts.
//!
//! Delivery is at-least-once and ordered per room for connected
//! subscribers. The buffer is bounded: a subscriber that lags past it
//! observes [`tokio::sync::broadcast::error::RecvError::Lagged`] and must
//! refetch current state -- the same rule as reconnecting. Push is never
//! a substitute for durable state.

pub mod event;

pub use event::RoomEvent;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

/// Shared room for counsellors monitoring the waiting queue.
pub const GLOBAL_QUEUE: &str = "global_queue";

/// Shared room for out-of-band alerts (video session links).
pub const GLOBAL_NOTIFICATIONS: &str = "global_notifications";

/// Room name for one conversation.
pub fn conversation_room(conversation_id: &str) -> String {
    format!("chat:{conversation_id}")
}

/// Broadcast fan-out keyed by room name.
///
/// Rooms are created lazily on first subscribe or publish and are cheap:
/// an idle room is one map entry. Publishing to a room with no
/// subscribers is a silent no-op (the durable state in storage is the
/// source of truth; events are only a latency optimization).
pub struct RoomBus {
    rooms: DashMap<String, broadcast::Sender<RoomEvent>>,
    buffer: usize,
}

impl RoomBus {
    /// Create a bus whose per-room buffer holds `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            buffer,
        }
    }

    /// Subscribe to a room, creating it if needed.
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<RoomEvent> {
        self.sender(room).subscribe()
    }

    /// Publish an event to a room. Returns the number of subscribers it
    /// reached.
    pub fn publish(&self, room: &str, event: RoomEvent) -> usize {
        let sender = self.sender(room);
        match sender.send(event) {
            Ok(n) => {
                trace!(room, subscribers = n, "event published");
                n
            }
            // send only fails when no receiver exists; nothing to deliver.
            Err(_) => 0,
        }
    }

    /// Number of current subscribers in a room.
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    fn sender(&self, room: &str) -> broadcast::Sender<RoomEvent> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pendo_core::types::RiskLevel;

    fn ended(id: &str) -> RoomEvent {
        RoomEvent::ConversationEnded {
            conversation_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        let bus = RoomBus::new(16);
        let mut rx = bus.subscribe("chat:c-1");

        bus.publish("chat:c-1", ended("first"));
        bus.publish("chat:c-1", ended("second"));

        assert_eq!(rx.recv().await.unwrap(), ended("first"));
        assert_eq!(rx.recv().await.unwrap(), ended("second"));
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let bus = RoomBus::new(16);
        let mut queue_rx = bus.subscribe(GLOBAL_QUEUE);
        let mut chat_rx = bus.subscribe("chat:c-1");

        bus.publish("chat:c-1", ended("c-1"));

        assert_eq!(chat_rx.recv().await.unwrap(), ended("c-1"));
        assert!(queue_rx.try_recv().is_err(), "queue room must not see chat events");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = RoomBus::new(16);
        assert_eq!(bus.publish("chat:nobody", ended("c-1")), 0);
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let bus = RoomBus::new(16);
        let mut rx1 = bus.subscribe(GLOBAL_QUEUE);
        let mut rx2 = bus.subscribe(GLOBAL_QUEUE);

        let event = RoomEvent::RiskEscalated {
            conversation_id: "c-1".to_string(),
            risk_level: RiskLevel::High,
            escalated: true,
        };
        let reached = bus.publish(GLOBAL_QUEUE, event.clone());

        assert_eq!(reached, 2);
        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn lagging_subscriber_observes_lag_not_silent_loss() {
        let bus = RoomBus::new(2);
        let mut rx = bus.subscribe("chat:c-1");

        for i in 0..5 {
            bus.publish("chat:c-1", ended(&format!("c-{i}")));
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                assert!(skipped >= 1, "lag must report skipped events");
            }
            other => panic!("expected Lagged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscriber_count_tracks_receivers() {
        let bus = RoomBus::new(16);
        assert_eq!(bus.subscriber_count("chat:c-1"), 0);
        let rx = bus.subscribe("chat:c-1");
        assert_eq!(bus.subscriber_count("chat:c-1"), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count("chat:c-1"), 0);
    }

    #[test]
    fn conversation_room_name_matches_wire_format() {
        assert_eq!(conversation_room("abc"), "chat:abc");
    }
}
