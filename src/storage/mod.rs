//! Conversation persistence
//!
//! Two logical tables are kept in a local SQLite database: `chat_messages`
//! and `conversation_metadata`. Every query is scoped to a user id. Writes
//! publish a [`StoreChange`] on a broadcast channel so readers can recompute
//! derived state instead of polling.

use crate::error::{Result, MenteSaError};
use crate::models::{is_new_conversation, Sender};
use anyhow::Context;
use async_trait::async_trait;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

pub mod types;
pub use types::{ConversationMetadata, ConversationSummary, MessageRecord, NewMessage, StoreChange};

/// Capacity of the change-notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Environment variable that overrides the database location
pub const DB_PATH_ENV: &str = "MENTESA_DB";

/// Persistence interface consumed by the chat orchestrator
///
/// Implementations must scope every read and write to the given user id and
/// must publish a [`StoreChange`] after each successful write.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a message and return its row id
    async fn insert_message(&self, message: NewMessage) -> Result<i64>;

    /// All messages of a conversation, oldest first
    async fn messages_for_conversation(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>>;

    /// The newest `limit` messages of a conversation, oldest first
    async fn recent_messages(
        &self,
        user_id: &str,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>>;

    /// Conversations with at least one message, newest activity first
    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    /// Text of the first message the user sent in a conversation
    async fn first_user_message_text(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Option<String>>;

    /// Remove every message of a conversation
    async fn clear_conversation(&self, user_id: &str, conversation_id: i64) -> Result<()>;

    /// Insert or replace the metadata row of a conversation
    async fn upsert_metadata(&self, metadata: ConversationMetadata) -> Result<()>;

    /// Custom title of a conversation, if one was set
    async fn custom_title(&self, user_id: &str, conversation_id: i64) -> Result<Option<String>>;

    /// All metadata rows owned by the user
    async fn metadata_for_user(&self, user_id: &str) -> Result<Vec<ConversationMetadata>>;

    /// Remove the metadata row of a conversation
    async fn delete_metadata(&self, user_id: &str, conversation_id: i64) -> Result<()>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// SQLite-backed conversation store
///
/// A connection is opened per operation; the async trait methods run the
/// blocking work on Tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
    changes: broadcast::Sender<StoreChange>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

fn storage_error(e: impl std::fmt::Display) -> MenteSaError {
    MenteSaError::Storage(e.to_string())
}

impl SqliteStorage {
    /// Create a new storage instance
    ///
    /// Initializes the database file in the user's data directory, unless
    /// `MENTESA_DB` points somewhere else.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var(DB_PATH_ENV) {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "mentesa", "mentesa")
            .ok_or_else(|| MenteSaError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("mentesa.db"))
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use mentesa::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("chat.db")).unwrap();
    /// assert!(storage.db_path().ends_with("chat.db"));
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create parent directory for database")
                    .map_err(storage_error)?;
            }
        }

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let storage = Self { db_path, changes };
        storage.init()?;
        tracing::debug!("Opened conversation store at {}", storage.db_path.display());
        Ok(storage)
    }

    /// Location of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(storage_error)?)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                message_text TEXT NOT NULL,
                sender_type TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                user_id TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS index_chat_messages_user_conversation
                ON chat_messages(user_id, conversation_id);
            CREATE TABLE IF NOT EXISTS conversation_metadata (
                conversation_id INTEGER PRIMARY KEY,
                custom_title TEXT,
                user_id TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS index_conversation_metadata_user_id
                ON conversation_metadata(user_id);",
        )
        .context("Failed to create tables")
        .map_err(storage_error)?;

        Ok(())
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(change);
    }

    /// Persist a message and return its row id
    pub fn insert_message_blocking(&self, message: &NewMessage) -> Result<i64> {
        if is_new_conversation(message.conversation_id) {
            return Err(MenteSaError::InvalidConversation(message.conversation_id).into());
        }

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO chat_messages (conversation_id, message_text, sender_type, timestamp, user_id)
            VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.conversation_id,
                message.text,
                message.sender.as_str(),
                message.timestamp,
                message.user_id
            ],
        )
        .context("Failed to insert message")
        .map_err(storage_error)?;
        let id = conn.last_insert_rowid();

        self.notify(StoreChange::MessageInserted {
            user_id: message.user_id.clone(),
            conversation_id: message.conversation_id,
        });
        Ok(id)
    }

    fn query_messages(
        &self,
        sql: &str,
        user_id: &str,
        conversation_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(sql)
            .context("Failed to prepare statement")
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![user_id, conversation_id, limit], |row| {
                let sender: String = row.get(3)?;
                Ok(MessageRecord {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    text: row.get(2)?,
                    sender: Sender::from_stored(&sender),
                    timestamp: row.get(4)?,
                    user_id: row.get(5)?,
                })
            })
            .context("Failed to query messages")
            .map_err(storage_error)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(storage_error)?);
        }
        Ok(messages)
    }

    /// All messages of a conversation, oldest first
    pub fn messages_blocking(&self, user_id: &str, conversation_id: i64) -> Result<Vec<MessageRecord>> {
        self.query_messages(
            "SELECT id, conversation_id, message_text, sender_type, timestamp, user_id
            FROM chat_messages
            WHERE user_id = ?1 AND conversation_id = ?2
            ORDER BY timestamp ASC, id ASC
            LIMIT ?3",
            user_id,
            conversation_id,
            -1,
        )
    }

    /// The newest `limit` messages of a conversation, oldest first
    pub fn recent_messages_blocking(
        &self,
        user_id: &str,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut messages = self.query_messages(
            "SELECT id, conversation_id, message_text, sender_type, timestamp, user_id
            FROM chat_messages
            WHERE user_id = ?1 AND conversation_id = ?2
            ORDER BY timestamp DESC, id DESC
            LIMIT ?3",
            user_id,
            conversation_id,
            limit,
        )?;
        messages.reverse();
        Ok(messages)
    }

    /// Conversations with at least one message, newest activity first
    pub fn conversations_blocking(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT conversation_id, MAX(timestamp) AS last_timestamp
                FROM chat_messages
                WHERE user_id = ?1
                GROUP BY conversation_id
                ORDER BY last_timestamp DESC, conversation_id DESC",
            )
            .context("Failed to prepare statement")
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ConversationSummary {
                    id: row.get(0)?,
                    last_timestamp: row.get(1)?,
                })
            })
            .context("Failed to query conversations")
            .map_err(storage_error)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row.map_err(storage_error)?);
        }
        Ok(conversations)
    }

    /// Text of the first message the user sent in a conversation
    pub fn first_user_message_blocking(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Option<String>> {
        let conn = self.connect()?;
        let text = conn
            .query_row(
                "SELECT message_text FROM chat_messages
                WHERE user_id = ?1 AND conversation_id = ?2 AND sender_type = 'USER'
                ORDER BY timestamp ASC, id ASC
                LIMIT 1",
                params![user_id, conversation_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query first user message")
            .map_err(storage_error)?;
        Ok(text)
    }

    /// Remove every message of a conversation
    pub fn clear_conversation_blocking(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        let conn = self.connect()?;
        let removed = conn
            .execute(
                "DELETE FROM chat_messages WHERE user_id = ?1 AND conversation_id = ?2",
                params![user_id, conversation_id],
            )
            .context("Failed to delete conversation messages")
            .map_err(storage_error)?;
        tracing::debug!(
            "Removed {} messages from conversation {}",
            removed,
            conversation_id
        );

        self.notify(StoreChange::ConversationCleared {
            user_id: user_id.to_string(),
            conversation_id,
        });
        Ok(())
    }

    /// Insert or replace the metadata row of a conversation
    ///
    /// A row owned by another user is left untouched and the call fails with
    /// [`MenteSaError::InvalidConversation`].
    pub fn upsert_metadata_blocking(&self, metadata: &ConversationMetadata) -> Result<()> {
        if is_new_conversation(metadata.conversation_id) {
            return Err(MenteSaError::InvalidConversation(metadata.conversation_id).into());
        }

        let conn = self.connect()?;
        let changed = conn
            .execute(
                "INSERT INTO conversation_metadata (conversation_id, custom_title, user_id)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(conversation_id) DO UPDATE SET
                    custom_title = excluded.custom_title
                WHERE conversation_metadata.user_id = excluded.user_id",
                params![
                    metadata.conversation_id,
                    metadata.custom_title,
                    metadata.user_id
                ],
            )
            .context("Failed to upsert conversation metadata")
            .map_err(storage_error)?;

        if changed == 0 {
            tracing::warn!(
                conversation_id = metadata.conversation_id,
                "Metadata row belongs to another user"
            );
            return Err(MenteSaError::InvalidConversation(metadata.conversation_id).into());
        }

        self.notify(StoreChange::MetadataChanged {
            user_id: metadata.user_id.clone(),
            conversation_id: metadata.conversation_id,
        });
        Ok(())
    }

    /// Custom title of a conversation, if one was set
    pub fn custom_title_blocking(&self, user_id: &str, conversation_id: i64) -> Result<Option<String>> {
        let conn = self.connect()?;
        let title: Option<Option<String>> = conn
            .query_row(
                "SELECT custom_title FROM conversation_metadata
                WHERE user_id = ?1 AND conversation_id = ?2",
                params![user_id, conversation_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query conversation title")
            .map_err(storage_error)?;
        Ok(title.flatten())
    }

    /// All metadata rows owned by the user
    pub fn metadata_blocking(&self, user_id: &str) -> Result<Vec<ConversationMetadata>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT conversation_id, custom_title, user_id
                FROM conversation_metadata
                WHERE user_id = ?1",
            )
            .context("Failed to prepare statement")
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ConversationMetadata {
                    conversation_id: row.get(0)?,
                    custom_title: row.get(1)?,
                    user_id: row.get(2)?,
                })
            })
            .context("Failed to query conversation metadata")
            .map_err(storage_error)?;

        let mut metadata = Vec::new();
        for row in rows {
            metadata.push(row.map_err(storage_error)?);
        }
        Ok(metadata)
    }

    /// Remove the metadata row of a conversation
    pub fn delete_metadata_blocking(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM conversation_metadata WHERE user_id = ?1 AND conversation_id = ?2",
            params![user_id, conversation_id],
        )
        .context("Failed to delete conversation metadata")
        .map_err(storage_error)?;

        self.notify(StoreChange::MetadataChanged {
            user_id: user_id.to_string(),
            conversation_id,
        });
        Ok(())
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(SqliteStorage) -> Result<T> + Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || op(storage))
            .await
            .map_err(|e| MenteSaError::Storage(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl ConversationStore for SqliteStorage {
    async fn insert_message(&self, message: NewMessage) -> Result<i64> {
        self.run_blocking(move |s| s.insert_message_blocking(&message))
            .await
    }

    async fn messages_for_conversation(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.messages_blocking(&user_id, conversation_id))
            .await
    }

    async fn recent_messages(
        &self,
        user_id: &str,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.recent_messages_blocking(&user_id, conversation_id, limit))
            .await
    }

    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.conversations_blocking(&user_id))
            .await
    }

    async fn first_user_message_text(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Option<String>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.first_user_message_blocking(&user_id, conversation_id))
            .await
    }

    async fn clear_conversation(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.clear_conversation_blocking(&user_id, conversation_id))
            .await
    }

    async fn upsert_metadata(&self, metadata: ConversationMetadata) -> Result<()> {
        self.run_blocking(move |s| s.upsert_metadata_blocking(&metadata))
            .await
    }

    async fn custom_title(&self, user_id: &str, conversation_id: i64) -> Result<Option<String>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.custom_title_blocking(&user_id, conversation_id))
            .await
    }

    async fn metadata_for_user(&self, user_id: &str) -> Result<Vec<ConversationMetadata>> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.metadata_blocking(&user_id))
            .await
    }

    async fn delete_metadata(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        let user_id = user_id.to_string();
        self.run_blocking(move |s| s.delete_metadata_blocking(&user_id, conversation_id))
            .await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
