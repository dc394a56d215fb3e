// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types shared across the Pendo chat core.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Who sent a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Student,
    Counsellor,
    /// Server-generated messages (session markers, inactivity closures).
    System,
}

/// Risk classification of a conversation, as reported by the external
/// triage classifier. Ordering matters: escalation only ever moves
/// upward, so the derive order is `None < Medium < High`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Medium,
    High,
}

impl RiskLevel {
    /// Numeric rank used by the queue ordering key.
    pub fn rank(self) -> i64 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }
}

/// Lifecycle state of a conversation.
///
/// Transitions are one-way: `Unassigned -> Assigned -> Ended`. A claimed
/// conversation is owned by its counsellor until explicitly ended; there
/// is no path back to `Unassigned`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Unassigned,
    Assigned,
    Ended,
}

/// A student-counsellor chat relationship: assignment state, risk
/// classification, and (separately stored) ordered message log.
///
/// A conversation with `counsellor_id = None` and state `Unassigned` is
/// implicitly in the queue; there is no separate queue entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// UUID v4.
    pub id: String,
    /// Opaque student access code (e.g. `NRB-1234`).
    pub student_id: String,
    /// Assigned counsellor; `None` while queued.
    pub counsellor_id: Option<String>,
    pub state: ConversationState,
    pub risk_level: RiskLevel,
    /// Set once a risk signal arrives; never cleared (audit trail).
    pub escalated: bool,
    /// ISO-8601, millisecond precision.
    pub created_at: String,
    /// Bumped on every append and state change.
    pub updated_at: String,
}

impl Conversation {
    /// True while the conversation is waiting for a counsellor.
    pub fn in_queue(&self) -> bool {
        self.counsellor_id.is_none() && self.state == ConversationState::Unassigned
    }
}

/// One immutable entry in a conversation's append-only log.
///
/// `seq` is assigned server-side inside the append transaction and is
/// the sole ordering key -- client clocks are never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// UUID v4.
    pub id: String,
    pub conversation_id: String,
    /// Per-conversation monotone sequence, starting at 1.
    pub seq: i64,
    pub role: SenderRole,
    pub sender_id: String,
    pub content: String,
    /// Server-assigned ISO-8601 timestamp; informational only.
    pub created_at: String,
}

/// An ephemeral out-of-band alert (video meeting link ready). Produced
/// by the external meeting scheduler, fanned out to counsellor
/// dashboards, and never persisted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoNotification {
    /// Opaque to the core -- whatever the scheduler built.
    pub payload: serde_json::Value,
    pub created_at: String,
}
