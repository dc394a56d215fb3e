// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log operations.
//!
//! Appends assign the per-conversation sequence number and the server
//! timestamp inside one transaction on the single-writer connection, so
//! log order equals append order regardless of client clocks.

use pendo_core::types::{ChatMessage, SenderRole};
use pendo_core::PendoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Map a messages row (id, conversation_id, seq, role, sender_id, content, created_at).
fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(3)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        seq: row.get(2)?,
        role: role.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        sender_id: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

enum AppendOutcome {
    Missing,
    Closed,
    Inserted(ChatMessage),
}

/// Append a message to a conversation's log.
///
/// Whitespace-only content is a no-op returning `Ok(None)`. The log of an
/// ended conversation is closed: appending to it is a Conflict.
pub async fn append(
    db: &Database,
    conversation_id: &str,
    role: SenderRole,
    sender_id: &str,
    content: &str,
) -> Result<Option<ChatMessage>, PendoError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let conv_id = conversation_id.to_string();
    let sender = sender_id.to_string();
    let content = trimmed.to_string();
    let msg_id = uuid::Uuid::new_v4().to_string();

    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let state = match tx.query_row(
                "SELECT state FROM conversations WHERE id = ?1",
                params![conv_id],
                |row| row.get::<_, String>(0),
            ) {
                Ok(s) => s,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    return Ok(AppendOutcome::Missing);
                }
                Err(e) => return Err(e.into()),
            };
            if state == "ended" {
                tx.commit()?;
                return Ok(AppendOutcome::Closed);
            }

            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
                params![conv_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, seq, role, sender_id, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![msg_id, conv_id, seq, role.to_string(), sender, content],
            )?;
            // Appends count as activity for the inactivity sweeper.
            tx.execute(
                "UPDATE conversations
                 SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![conv_id],
            )?;
            let msg = tx.query_row(
                "SELECT id, conversation_id, seq, role, sender_id, content, created_at
                 FROM messages WHERE id = ?1",
                params![msg_id],
                message_from_row,
            )?;
            tx.commit()?;
            Ok(AppendOutcome::Inserted(msg))
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        AppendOutcome::Missing => Err(PendoError::not_found("conversation", conversation_id)),
        AppendOutcome::Closed => Err(PendoError::Conflict(format!(
            "conversation {conversation_id} has ended, its log is closed"
        ))),
        AppendOutcome::Inserted(msg) => Ok(Some(msg)),
    }
}

/// Messages for a conversation in append order.
pub async fn for_conversation(
    db: &Database,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<ChatMessage>, PendoError> {
    let conv_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut messages = Vec::new();
            match limit {
                Some(lim) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, seq, role, sender_id, content, created_at
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY seq ASC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![conv_id, lim], message_from_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, seq, role, sender_id, content, created_at
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY seq ASC",
                    )?;
                    let rows = stmt.query_map(params![conv_id], message_from_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
