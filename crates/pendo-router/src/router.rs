// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session router: every boundary operation of the chat core.
//!
//! Composes the conversation store (durable truth, all state-machine
//! guards) with the room bus (latency optimization, at-least-once).
//! Ordering of the two halves matters: storage commits first, then the
//! event is published, so a subscriber that refetches after any event
//! always observes at least the state that produced it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use pendo_bus::{conversation_room, RoomBus, RoomEvent, GLOBAL_NOTIFICATIONS, GLOBAL_QUEUE};
use pendo_core::types::{
    ChatMessage, Conversation, ConversationState, RiskLevel, SenderRole, VideoNotification,
};
use pendo_core::{now_iso, ConversationStore, PendoError};

use crate::metrics;

/// Routes students to counsellors and keeps both parties' views
/// consistent: queue fan-out, atomic claim, ordered log delivery.
pub struct SessionRouter {
    store: Arc<dyn ConversationStore>,
    bus: Arc<RoomBus>,
}

impl SessionRouter {
    pub fn new(store: Arc<dyn ConversationStore>, bus: Arc<RoomBus>) -> Self {
        Self { store, bus }
    }

    /// The underlying store (used by the sweeper and snapshot reads).
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// The room bus (used by the gateway for subscriptions).
    pub fn bus(&self) -> &Arc<RoomBus> {
        &self.bus
    }

    /// Entry point for a student: reuse the open conversation or start a
    /// fresh one. New conversations are announced to every counsellor
    /// watching the queue -- the claim guard, not announcement order,
    /// decides who gets it.
    pub async fn get_or_create(&self, student_id: &str) -> Result<Conversation, PendoError> {
        let (conv, created) = self.store.get_or_create(student_id).await?;
        if created {
            info!(conversation_id = %conv.id, "conversation created, waiting for a counsellor");
            metrics::record_conversation_created();
            self.bus.publish(
                GLOBAL_QUEUE,
                RoomEvent::QueueChanged {
                    conversation: conv.clone(),
                },
            );
        }
        Ok(conv)
    }

    /// Append a message and deliver it to the conversation's room.
    ///
    /// Whitespace-only input returns `Ok(None)` without touching storage
    /// or publishing anything.
    pub async fn append(
        &self,
        conversation_id: &str,
        role: SenderRole,
        sender_id: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, PendoError> {
        let Some(message) = self
            .store
            .append_message(conversation_id, role, sender_id, content)
            .await?
        else {
            return Ok(None);
        };

        metrics::record_message(&role.to_string());
        debug!(
            conversation_id,
            seq = message.seq,
            %role,
            "message appended"
        );
        self.bus.publish(
            &conversation_room(conversation_id),
            RoomEvent::MessageAppended {
                conversation_id: conversation_id.to_string(),
                message: message.clone(),
            },
        );
        Ok(Some(message))
    }

    /// Full current state of a conversation: row plus ordered log.
    ///
    /// This is the refetch path clients use after reconnecting or after a
    /// lag signal; it reflects append order, never client timestamps.
    pub async fn read(
        &self,
        conversation_id: &str,
    ) -> Result<(Conversation, Vec<ChatMessage>), PendoError> {
        let conv = self
            .store
            .get(conversation_id)
            .await?
            .ok_or_else(|| PendoError::not_found("conversation", conversation_id))?;
        let log = self.store.messages(conversation_id, None).await?;
        Ok((conv, log))
    }

    /// Fresh snapshot of the waiting queue.
    pub async fn list_queue(&self) -> Result<Vec<Conversation>, PendoError> {
        let queue = self.store.list_queue().await?;
        metrics::set_queue_depth(queue.len() as f64);
        Ok(queue)
    }

    /// Audit listing over all conversations.
    pub async fn list(
        &self,
        state: Option<ConversationState>,
    ) -> Result<Vec<Conversation>, PendoError> {
        self.store.list(state).await
    }

    /// Conversations a counsellor currently owns -- the reconnect query.
    pub async fn owned(&self, counsellor_id: &str) -> Result<Vec<Conversation>, PendoError> {
        self.store.owned(counsellor_id).await
    }

    /// Claim a waiting conversation for a counsellor.
    ///
    /// Exactly one of N concurrent claimants succeeds; losers get a
    /// Conflict and should drop the entry from their queue view. On
    /// success the claim is announced both to the conversation room and
    /// to the queue room, so the entry vanishes from every counsellor's
    /// view including the winner's.
    pub async fn claim(
        &self,
        conversation_id: &str,
        counsellor_id: &str,
    ) -> Result<Conversation, PendoError> {
        match self.store.claim(conversation_id, counsellor_id).await {
            Ok(conv) => {
                metrics::record_claim("won");
                info!(conversation_id, counsellor_id, "conversation claimed");
                self.bus.publish(
                    &conversation_room(conversation_id),
                    RoomEvent::ConversationClaimed {
                        conversation_id: conversation_id.to_string(),
                        counsellor_id: counsellor_id.to_string(),
                    },
                );
                self.bus.publish(
                    GLOBAL_QUEUE,
                    RoomEvent::QueueChanged {
                        conversation: conv.clone(),
                    },
                );
                Ok(conv)
            }
            Err(e) if e.is_conflict() => {
                metrics::record_claim("lost");
                debug!(conversation_id, counsellor_id, "claim lost the race");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// End an assigned session. Idempotent: a duplicate end returns the
    /// same terminal state and publishes nothing.
    pub async fn end(&self, conversation_id: &str) -> Result<Conversation, PendoError> {
        let (conv, changed) = self.store.end(conversation_id).await?;
        if changed {
            info!(conversation_id, "conversation ended");
            self.bus.publish(
                &conversation_room(conversation_id),
                RoomEvent::ConversationEnded {
                    conversation_id: conversation_id.to_string(),
                },
            );
        }
        Ok(conv)
    }

    /// Raise a conversation's risk. One-way: lower-or-equal levels are
    /// idempotent no-ops. Queued conversations are re-announced so their
    /// new priority reorders every counsellor's view.
    pub async fn escalate(
        &self,
        conversation_id: &str,
        level: RiskLevel,
    ) -> Result<Conversation, PendoError> {
        let (conv, changed) = self.store.escalate(conversation_id, level).await?;
        if changed {
            warn!(
                conversation_id,
                risk_level = %conv.risk_level,
                "conversation escalated"
            );
            metrics::record_escalation(&conv.risk_level.to_string());
            self.bus.publish(
                &conversation_room(conversation_id),
                RoomEvent::RiskEscalated {
                    conversation_id: conversation_id.to_string(),
                    risk_level: conv.risk_level,
                    escalated: conv.escalated,
                },
            );
            if conv.in_queue() {
                self.bus.publish(
                    GLOBAL_QUEUE,
                    RoomEvent::QueueChanged {
                        conversation: conv.clone(),
                    },
                );
            }
        }
        Ok(conv)
    }

    /// Fan a video-session alert out to counsellor dashboards. The
    /// notification is ephemeral -- delivered, never stored.
    pub fn notify_video_session(
        &self,
        payload: serde_json::Value,
    ) -> (VideoNotification, usize) {
        let notification = VideoNotification {
            payload,
            created_at: now_iso(),
        };
        let reached = self.bus.publish(
            GLOBAL_NOTIFICATIONS,
            RoomEvent::VideoSession {
                notification: notification.clone(),
            },
        );
        debug!(subscribers = reached, "video session notification fanned out");
        (notification, reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pendo_config::model::StorageConfig;
    use pendo_storage::SqliteStore;
    use tempfile::tempdir;

    async fn setup() -> (Arc<SessionRouter>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("router.db");
        let store = SqliteStore::new(StorageConfig {
            database_path: db_path.to_str().unwrap().to_string(),
            wal_mode: true,
        });
        store.initialize().await.unwrap();
        let router = SessionRouter::new(Arc::new(store), Arc::new(RoomBus::new(64)));
        (Arc::new(router), dir)
    }

    #[tokio::test]
    async fn append_publishes_to_the_conversation_room() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        let mut rx = router.bus().subscribe(&conversation_room(&conv.id));

        let msg = router
            .append(&conv.id, SenderRole::Student, "NRB-1234", "I need help")
            .await
            .unwrap()
            .unwrap();

        match rx.recv().await.unwrap() {
            RoomEvent::MessageAppended {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, conv.id);
                assert_eq!(message.id, msg.id);
                assert_eq!(message.content, "I need help");
            }
            other => panic!("expected MessageAppended, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_append_publishes_nothing() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        let mut rx = router.bus().subscribe(&conversation_room(&conv.id));

        let result = router
            .append(&conv.id, SenderRole::Student, "NRB-1234", "   ")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn new_conversation_is_announced_on_the_queue_room() {
        let (router, _dir) = setup().await;
        let mut rx = router.bus().subscribe(GLOBAL_QUEUE);

        let conv = router.get_or_create("NRB-1234").await.unwrap();

        match rx.recv().await.unwrap() {
            RoomEvent::QueueChanged { conversation } => {
                assert_eq!(conversation.id, conv.id);
                assert!(conversation.in_queue());
            }
            other => panic!("expected QueueChanged, got {other:?}"),
        }

        // Reuse does not re-announce.
        let again = router.get_or_create("NRB-1234").await.unwrap();
        assert_eq!(again.id, conv.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn claim_announces_to_room_and_queue() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        let mut queue_rx = router.bus().subscribe(GLOBAL_QUEUE);
        let mut room_rx = router.bus().subscribe(&conversation_room(&conv.id));

        router.claim(&conv.id, "CNSL-9001").await.unwrap();

        match room_rx.recv().await.unwrap() {
            RoomEvent::ConversationClaimed { counsellor_id, .. } => {
                assert_eq!(counsellor_id, "CNSL-9001");
            }
            other => panic!("expected ConversationClaimed, got {other:?}"),
        }
        match queue_rx.recv().await.unwrap() {
            RoomEvent::QueueChanged { conversation } => {
                // The embedded row shows the entry is gone from the queue.
                assert!(!conversation.in_queue());
                assert_eq!(conversation.counsellor_id.as_deref(), Some("CNSL-9001"));
            }
            other => panic!("expected QueueChanged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn losing_claim_returns_conflict_without_events() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        router.claim(&conv.id, "CNSL-9001").await.unwrap();

        let mut room_rx = router.bus().subscribe(&conversation_room(&conv.id));
        let err = router.claim(&conv.id, "CNSL-9002").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(room_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_end_publishes_once() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        router.claim(&conv.id, "CNSL-9001").await.unwrap();

        let mut rx = router.bus().subscribe(&conversation_room(&conv.id));
        router.end(&conv.id).await.unwrap();
        let again = router.end(&conv.id).await.unwrap();
        assert_eq!(again.state, ConversationState::Ended);

        assert!(matches!(
            rx.recv().await.unwrap(),
            RoomEvent::ConversationEnded { .. }
        ));
        assert!(rx.try_recv().is_err(), "second end must not re-publish");
    }

    #[tokio::test]
    async fn escalation_of_queued_conversation_reannounces_queue() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        let mut queue_rx = router.bus().subscribe(GLOBAL_QUEUE);

        router.escalate(&conv.id, RiskLevel::High).await.unwrap();

        match queue_rx.recv().await.unwrap() {
            RoomEvent::QueueChanged { conversation } => {
                assert_eq!(conversation.risk_level, RiskLevel::High);
                assert!(conversation.escalated);
            }
            other => panic!("expected QueueChanged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn escalation_of_assigned_conversation_skips_queue_room() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        router.claim(&conv.id, "CNSL-9001").await.unwrap();

        let mut queue_rx = router.bus().subscribe(GLOBAL_QUEUE);
        let mut room_rx = router.bus().subscribe(&conversation_room(&conv.id));

        // Recorded for audit even though the session is already owned.
        let conv = router.escalate(&conv.id, RiskLevel::High).await.unwrap();
        assert_eq!(conv.risk_level, RiskLevel::High);

        assert!(matches!(
            room_rx.recv().await.unwrap(),
            RoomEvent::RiskEscalated { .. }
        ));
        assert!(queue_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn video_notification_reaches_subscribers() {
        let (router, _dir) = setup().await;
        let mut rx = router.bus().subscribe(GLOBAL_NOTIFICATIONS);

        let payload = serde_json::json!({
            "counsellor_name": "A. Mwangi",
            "meet_link": "https://meet.example/abc",
        });
        let (notification, reached) = router.notify_video_session(payload.clone());
        assert_eq!(reached, 1);
        assert_eq!(notification.payload, payload);

        match rx.recv().await.unwrap() {
            RoomEvent::VideoSession { notification } => {
                assert_eq!(notification.payload["meet_link"], "https://meet.example/abc");
            }
            other => panic!("expected VideoSession, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_returns_log_in_append_order() {
        let (router, _dir) = setup().await;
        let conv = router.get_or_create("NRB-1234").await.unwrap();
        router
            .append(&conv.id, SenderRole::Student, "NRB-1234", "one")
            .await
            .unwrap();
        router
            .append(&conv.id, SenderRole::Student, "NRB-1234", "two")
            .await
            .unwrap();

        let (read_conv, log) = router.read(&conv.id).await.unwrap();
        assert_eq!(read_conv.id, conv.id);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, "one");
        assert_eq!(log[1].content, "two");

        let err = router.read("missing").await.unwrap_err();
        assert!(matches!(err, PendoError::NotFound { .. }));
    }
}
