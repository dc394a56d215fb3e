// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation store trait for persistence backends.
//!
//! The store is the single source of truth for assignment state: the
//! claim/end guards are conditional updates at the datastore layer, never
//! read-then-write in the caller. The session router composes a store
//! implementation with the realtime bus; tests may substitute their own.

use async_trait::async_trait;

use crate::error::PendoError;
use crate::types::{ChatMessage, Conversation, ConversationState, RiskLevel, SenderRole};

/// Persistence operations for conversations and their message logs.
///
/// Every mutation that races (claim, end, escalate) must be implemented
/// as a single guarded update so that concurrent callers observe exactly
/// one winner. All operations are suspend points; implementations must
/// not hold exclusive locks across awaits.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the most recent non-ended conversation for `student_id`,
    /// or creates a fresh unassigned one. The boolean is `true` when a
    /// new conversation was inserted.
    ///
    /// Concurrent calls for the same student must never produce two open
    /// conversations -- the creation path is a compare-and-insert keyed
    /// on `(student_id, not ended)`.
    async fn get_or_create(&self, student_id: &str) -> Result<(Conversation, bool), PendoError>;

    /// Fetch a conversation by id.
    async fn get(&self, id: &str) -> Result<Option<Conversation>, PendoError>;

    /// List conversations, optionally filtered by state. Audit view;
    /// newest first.
    async fn list(
        &self,
        state: Option<ConversationState>,
    ) -> Result<Vec<Conversation>, PendoError>;

    /// Snapshot of the waiting queue: unassigned conversations ordered
    /// `(escalated DESC, risk DESC, created_at ASC)`. Recomputed per
    /// call, never incrementally maintained.
    async fn list_queue(&self) -> Result<Vec<Conversation>, PendoError>;

    /// All conversations currently assigned to `counsellor_id`. The
    /// reconnect path: clients re-derive their room subscriptions from
    /// this instead of trusting buffered events.
    async fn owned(&self, counsellor_id: &str) -> Result<Vec<Conversation>, PendoError>;

    /// Append a message to the conversation log.
    ///
    /// Whitespace-only content is a no-op returning `Ok(None)`, not an
    /// error. The sequence number and timestamp are assigned server-side
    /// in the same transaction as the insert. Appending to an ended
    /// conversation is a [`PendoError::Conflict`].
    async fn append_message(
        &self,
        conversation_id: &str,
        role: SenderRole,
        sender_id: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, PendoError>;

    /// Messages for a conversation in append (`seq`) order.
    async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, PendoError>;

    /// Atomically assign the conversation to `counsellor_id`.
    ///
    /// Valid only while unassigned; of N concurrent claimants exactly one
    /// succeeds and the rest receive [`PendoError::Conflict`].
    async fn claim(
        &self,
        conversation_id: &str,
        counsellor_id: &str,
    ) -> Result<Conversation, PendoError>;

    /// Transition an assigned conversation to ended.
    ///
    /// Idempotent: ending an already-ended conversation returns the
    /// current state with `false` for "changed". Ending an unassigned
    /// conversation is a [`PendoError::Conflict`].
    async fn end(&self, conversation_id: &str) -> Result<(Conversation, bool), PendoError>;

    /// Raise the conversation's risk level; never lowers it. Returns the
    /// updated row and whether anything actually changed.
    async fn escalate(
        &self,
        conversation_id: &str,
        level: RiskLevel,
    ) -> Result<(Conversation, bool), PendoError>;

    /// Assigned conversations with no activity since `cutoff` (ISO-8601
    /// string, compared against the latest message timestamp or, for
    /// silent sessions, the last state change).
    async fn stale_assigned(&self, cutoff: &str) -> Result<Vec<Conversation>, PendoError>;
}
