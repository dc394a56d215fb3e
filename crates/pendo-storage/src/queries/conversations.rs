// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle operations.
//!
//! The claim and end paths are single conditional UPDATEs: the WHERE
//! clause is the state-machine guard, so of N racing callers exactly one
//! observes a changed row. No caller ever does an unguarded
//! read-then-write on `counsellor_id`.

use pendo_core::types::{Conversation, ConversationState, RiskLevel};
use pendo_core::PendoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

const SELECT_BY_ID: &str =
    "SELECT id, student_id, counsellor_id, state, risk_level, escalated, created_at, updated_at
     FROM conversations WHERE id = ?1";

/// Map a conversations row (column order as in [`SELECT_BY_ID`]).
pub(crate) fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let state: String = row.get(3)?;
    let risk: String = row.get(4)?;
    Ok(Conversation {
        id: row.get(0)?,
        student_id: row.get(1)?,
        counsellor_id: row.get(2)?,
        state: state.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        risk_level: risk.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        escalated: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Return the most recent open conversation for `student_id`, creating
/// one when none exists. The boolean is `true` on creation.
///
/// Find-then-insert runs in one transaction on the single-writer
/// connection; the partial unique index on open conversations backs the
/// same guarantee against any other writer.
pub async fn get_or_create(
    db: &Database,
    student_id: &str,
) -> Result<(Conversation, bool), PendoError> {
    let student_id = student_id.to_string();
    let new_id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing = {
                let mut stmt = tx.prepare(
                    "SELECT id, student_id, counsellor_id, state, risk_level, escalated,
                            created_at, updated_at
                     FROM conversations
                     WHERE student_id = ?1 AND state != 'ended'
                     ORDER BY created_at DESC
                     LIMIT 1",
                )?;
                stmt.query_row(params![student_id], conversation_from_row)
            };
            match existing {
                Ok(conv) => {
                    tx.commit()?;
                    Ok((conv, false))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.execute(
                        "INSERT INTO conversations (id, student_id) VALUES (?1, ?2)",
                        params![new_id, student_id],
                    )?;
                    let conv = tx.query_row(SELECT_BY_ID, params![new_id], conversation_from_row)?;
                    tx.commit()?;
                    Ok((conv, true))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Get a conversation by ID.
pub async fn get(db: &Database, id: &str) -> Result<Option<Conversation>, PendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(SELECT_BY_ID, params![id], conversation_from_row);
            match result {
                Ok(conv) => Ok(Some(conv)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List conversations, optionally filtered by state, newest first.
pub async fn list(
    db: &Database,
    state: Option<ConversationState>,
) -> Result<Vec<Conversation>, PendoError> {
    let state = state.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut conversations = Vec::new();
            match &state {
                Some(state_filter) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, student_id, counsellor_id, state, risk_level, escalated,
                                created_at, updated_at
                         FROM conversations WHERE state = ?1
                         ORDER BY created_at DESC",
                    )?;
                    let rows = stmt.query_map(params![state_filter], conversation_from_row)?;
                    for row in rows {
                        conversations.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, student_id, counsellor_id, state, risk_level, escalated,
                                created_at, updated_at
                         FROM conversations
                         ORDER BY created_at DESC",
                    )?;
                    let rows = stmt.query_map([], conversation_from_row)?;
                    for row in rows {
                        conversations.push(row?);
                    }
                }
            }
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}

/// Snapshot of the waiting queue.
///
/// Escalated and high-risk conversations surface first; within a tier,
/// first-come-first-served. Recomputed per call.
pub async fn list_queue(db: &Database) -> Result<Vec<Conversation>, PendoError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, counsellor_id, state, risk_level, escalated,
                        created_at, updated_at
                 FROM conversations
                 WHERE counsellor_id IS NULL AND state = 'unassigned'
                 ORDER BY escalated DESC,
                          CASE risk_level
                              WHEN 'high' THEN 2
                              WHEN 'medium' THEN 1
                              ELSE 0
                          END DESC,
                          created_at ASC",
            )?;
            let rows = stmt.query_map([], conversation_from_row)?;
            let mut queue = Vec::new();
            for row in rows {
                queue.push(row?);
            }
            Ok(queue)
        })
        .await
        .map_err(map_tr_err)
}

/// Conversations currently assigned to a counsellor (the reconnect query).
pub async fn owned(db: &Database, counsellor_id: &str) -> Result<Vec<Conversation>, PendoError> {
    let counsellor_id = counsellor_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, counsellor_id, state, risk_level, escalated,
                        created_at, updated_at
                 FROM conversations
                 WHERE counsellor_id = ?1 AND state = 'assigned'
                 ORDER BY updated_at DESC",
            )?;
            let rows = stmt.query_map(params![counsellor_id], conversation_from_row)?;
            let mut owned = Vec::new();
            for row in rows {
                owned.push(row?);
            }
            Ok(owned)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim an unassigned conversation for `counsellor_id`.
///
/// The WHERE clause only matches while `counsellor_id IS NULL`, so two
/// concurrent claims produce exactly one updated row; the loser gets a
/// Conflict and should drop the entry from its queue view.
pub async fn claim(
    db: &Database,
    conversation_id: &str,
    counsellor_id: &str,
) -> Result<Conversation, PendoError> {
    let conv_id = conversation_id.to_string();
    let counsellor = counsellor_id.to_string();
    let (updated, row) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE conversations
                 SET counsellor_id = ?1, state = 'assigned',
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND counsellor_id IS NULL AND state = 'unassigned'",
                params![counsellor, conv_id],
            )?;
            let row = match tx.query_row(SELECT_BY_ID, params![conv_id], conversation_from_row) {
                Ok(conv) => Some(conv),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            tx.commit()?;
            Ok((updated, row))
        })
        .await
        .map_err(map_tr_err)?;

    match (updated, row) {
        (_, None) => Err(PendoError::not_found("conversation", conversation_id)),
        (0, Some(conv)) => Err(PendoError::Conflict(format!(
            "conversation {} is already {}",
            conv.id,
            match conv.state {
                ConversationState::Ended => "ended".to_string(),
                _ => format!(
                    "assigned to {}",
                    conv.counsellor_id.as_deref().unwrap_or("another counsellor")
                ),
            }
        ))),
        (_, Some(conv)) => Ok(conv),
    }
}

/// End an assigned conversation. Idempotent: ending an ended
/// conversation returns the current row with `changed = false`.
pub async fn end(db: &Database, conversation_id: &str) -> Result<(Conversation, bool), PendoError> {
    let conv_id = conversation_id.to_string();
    let (updated, row) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE conversations
                 SET state = 'ended',
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND state = 'assigned'",
                params![conv_id],
            )?;
            let row = match tx.query_row(SELECT_BY_ID, params![conv_id], conversation_from_row) {
                Ok(conv) => Some(conv),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            tx.commit()?;
            Ok((updated, row))
        })
        .await
        .map_err(map_tr_err)?;

    match (updated, row) {
        (_, None) => Err(PendoError::not_found("conversation", conversation_id)),
        (0, Some(conv)) if conv.state == ConversationState::Ended => Ok((conv, false)),
        (0, Some(conv)) => Err(PendoError::Conflict(format!(
            "conversation {} is not assigned, cannot end it",
            conv.id
        ))),
        (_, Some(conv)) => Ok((conv, true)),
    }
}

/// Raise the risk level; never lowers it. The escalated flag is set for
/// medium or above and never clears.
///
/// The read-modify-write runs inside one transaction on the single
/// writer, and the new level is `max(current, requested)`, so racing
/// escalations converge to the highest level regardless of order.
pub async fn escalate(
    db: &Database,
    conversation_id: &str,
    level: RiskLevel,
) -> Result<(Conversation, bool), PendoError> {
    let conv_id = conversation_id.to_string();
    let out = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let before = match tx.query_row(SELECT_BY_ID, params![conv_id], conversation_from_row)
            {
                Ok(conv) => conv,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            let new_risk = before.risk_level.max(level);
            let new_escalated = before.escalated || level >= RiskLevel::Medium;
            let changed = new_risk != before.risk_level || new_escalated != before.escalated;

            if changed {
                tx.execute(
                    "UPDATE conversations
                     SET risk_level = ?1, escalated = ?2,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_risk.to_string(), new_escalated, conv_id],
                )?;
            }
            let after = tx.query_row(SELECT_BY_ID, params![conv_id], conversation_from_row)?;
            tx.commit()?;
            Ok(Some((after, changed)))
        })
        .await
        .map_err(map_tr_err)?;

    out.ok_or_else(|| PendoError::not_found("conversation", conversation_id))
}

/// Assigned conversations whose last activity (latest message, or the
/// last state change for silent sessions) predates `cutoff`.
pub async fn stale_assigned(db: &Database, cutoff: &str) -> Result<Vec<Conversation>, PendoError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.student_id, c.counsellor_id, c.state, c.risk_level, c.escalated,
                        c.created_at, c.updated_at
                 FROM conversations c
                 WHERE c.state = 'assigned'
                   AND COALESCE(
                           (SELECT MAX(m.created_at) FROM messages m
                            WHERE m.conversation_id = c.id),
                           c.updated_at
                       ) < ?1
                 ORDER BY c.updated_at ASC",
            )?;
            let rows = stmt.query_map(params![cutoff], conversation_from_row)?;
            let mut stale = Vec::new();
            for row in rows {
                stale.push(row?);
            }
            Ok(stale)
        })
        .await
        .map_err(map_tr_err)
}
