// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types and traits for the Pendo chat/session-routing core.
//!
//! Everything the router, storage, bus, and gateway crates share lives
//! here: the error taxonomy, the conversation/message domain types, and
//! the [`ConversationStore`] trait that decouples routing logic from the
//! SQLite backend.

pub mod error;
pub mod traits;
pub mod types;

pub use error::PendoError;
pub use traits::store::ConversationStore;
pub use types::{
    ChatMessage, Conversation, ConversationState, RiskLevel, SenderRole, VideoNotification,
};

/// Current UTC time as an ISO-8601 string with millisecond precision.
///
/// Matches the `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` format used for
/// SQL-side defaults, so Rust-side and SQL-side timestamps compare
/// lexicographically.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
