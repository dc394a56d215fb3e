// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events delivered through the room bus.
//!
//! Serialized with a `type` tag so WebSocket clients can dispatch on it
//! directly. Clients de-duplicate on message id / conversation id --
//! delivery is at-least-once.

use serde::{Deserialize, Serialize};

use pendo_core::types::{ChatMessage, Conversation, RiskLevel, VideoNotification};

/// An event published to one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A message was appended to a conversation's log.
    MessageAppended {
        conversation_id: String,
        message: ChatMessage,
    },
    /// The queue-relevant fields of a conversation changed: it was
    /// created, claimed, or re-prioritized. Counsellor queue views
    /// re-render (or drop the entry) from the embedded row.
    QueueChanged { conversation: Conversation },
    /// A counsellor took ownership of the conversation.
    ConversationClaimed {
        conversation_id: String,
        counsellor_id: String,
    },
    /// The session was explicitly closed.
    ConversationEnded { conversation_id: String },
    /// Risk level was raised by the external triage signal.
    RiskEscalated {
        conversation_id: String,
        risk_level: RiskLevel,
        escalated: bool,
    },
    /// A video meeting link is ready (out-of-band alert).
    VideoSession { notification: VideoNotification },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_a_type_tag() {
        let event = RoomEvent::ConversationEnded {
            conversation_id: "c-1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversation_ended");
        assert_eq!(json["conversation_id"], "c-1");
    }

    #[test]
    fn escalation_event_round_trips() {
        let event = RoomEvent::RiskEscalated {
            conversation_id: "c-1".to_string(),
            risk_level: RiskLevel::High,
            escalated: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"risk_escalated\""));
        assert!(json.contains("\"high\""));
        let back: RoomEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
