// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Pendo chat core.

use thiserror::Error;

/// The primary error type used across the store trait and core operations.
#[derive(Debug, Error)]
pub enum PendoError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced entity does not exist. Surfaced to the caller; not retryable.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// A state-machine guard rejected the operation: a claim raced and lost,
    /// or an operation hit a conversation in the wrong state. This is a
    /// normal outcome of concurrent claiming -- callers refresh their view
    /// and move on.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage backend errors (connection, query failure). Transient from
    /// the caller's perspective; retried with backoff at the calling layer.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Gateway or realtime transport errors (bind failure, closed channel).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PendoError {
    /// Shorthand for a [`PendoError::NotFound`] with an owned id.
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        PendoError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// True for errors that represent an expected race, not a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PendoError::Conflict(_))
    }
}
