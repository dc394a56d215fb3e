// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the ConversationStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use pendo_config::model::StorageConfig;
use pendo_core::types::{ChatMessage, Conversation, ConversationState, RiskLevel, SenderRole};
use pendo_core::{ConversationStore, PendoError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed conversation store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`SqliteStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`](Self::initialize)
    /// is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database, apply PRAGMAs, and run migrations.
    pub async fn initialize(&self) -> Result<(), PendoError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| PendoError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), PendoError> {
        self.db()?.close().await
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, PendoError> {
        self.db.get().ok_or_else(|| PendoError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_or_create(&self, student_id: &str) -> Result<(Conversation, bool), PendoError> {
        queries::conversations::get_or_create(self.db()?, student_id).await
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>, PendoError> {
        queries::conversations::get(self.db()?, id).await
    }

    async fn list(
        &self,
        state: Option<ConversationState>,
    ) -> Result<Vec<Conversation>, PendoError> {
        queries::conversations::list(self.db()?, state).await
    }

    async fn list_queue(&self) -> Result<Vec<Conversation>, PendoError> {
        queries::conversations::list_queue(self.db()?).await
    }

    async fn owned(&self, counsellor_id: &str) -> Result<Vec<Conversation>, PendoError> {
        queries::conversations::owned(self.db()?, counsellor_id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: SenderRole,
        sender_id: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, PendoError> {
        queries::messages::append(self.db()?, conversation_id, role, sender_id, content).await
    }

    async fn messages(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, PendoError> {
        queries::messages::for_conversation(self.db()?, conversation_id, limit).await
    }

    async fn claim(
        &self,
        conversation_id: &str,
        counsellor_id: &str,
    ) -> Result<Conversation, PendoError> {
        queries::conversations::claim(self.db()?, conversation_id, counsellor_id).await
    }

    async fn end(&self, conversation_id: &str) -> Result<(Conversation, bool), PendoError> {
        queries::conversations::end(self.db()?, conversation_id).await
    }

    async fn escalate(
        &self,
        conversation_id: &str,
        level: RiskLevel,
    ) -> Result<(Conversation, bool), PendoError> {
        queries::conversations::escalate(self.db()?, conversation_id, level).await
    }

    async fn stale_assigned(&self, cutoff: &str) -> Result<Vec<Conversation>, PendoError> {
        queries::conversations::stale_assigned(self.db()?, cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        let result = store.initialize().await;
        assert!(result.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        let result = store.get_or_create("NRB-1234").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn full_conversation_lifecycle_through_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        store.initialize().await.unwrap();

        // Student opens a conversation and says hello.
        let (conv, created) = store.get_or_create("NRB-1234").await.unwrap();
        assert!(created);
        store
            .append_message(&conv.id, SenderRole::Student, "NRB-1234", "I need help")
            .await
            .unwrap()
            .unwrap();

        // It shows up in the queue.
        let queue = store.list_queue().await.unwrap();
        assert_eq!(queue.len(), 1);

        // A counsellor claims it; queue empties.
        let claimed = store.claim(&conv.id, "CNSL-9001").await.unwrap();
        assert_eq!(claimed.state, ConversationState::Assigned);
        assert!(store.list_queue().await.unwrap().is_empty());
        assert_eq!(store.owned("CNSL-9001").await.unwrap().len(), 1);

        // Both sides talk, then the counsellor ends the session.
        store
            .append_message(&conv.id, SenderRole::Counsellor, "CNSL-9001", "I'm here to help")
            .await
            .unwrap()
            .unwrap();
        let (ended, changed) = store.end(&conv.id).await.unwrap();
        assert!(changed);
        assert_eq!(ended.state, ConversationState::Ended);

        // History survives the end.
        let log = store.messages(&conv.id, None).await.unwrap();
        assert_eq!(log.len(), 2);

        store.close().await.unwrap();
    }
}
