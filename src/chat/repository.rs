//! Durable key-value slot holding the serialized conversation list.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::errors::ChatResult;
use crate::chat::types::Conversation;

/// Boxed future type for repository operations.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Slot key under which the conversation list is stored.
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Persistence seam for the conversation store.
pub trait ConversationRepository: Send + Sync {
    /// Load the stored conversation list, `None` when nothing was saved yet.
    ///
    /// # Errors
    /// Returns an error if storage access or decoding fails.
    fn load(&self) -> RepoFuture<'_, ChatResult<Option<Vec<Conversation>>>>;

    /// Replace the stored conversation list with a full snapshot.
    ///
    /// # Errors
    /// Returns an error if encoding or storage access fails.
    fn save(&self, conversations: Vec<Conversation>) -> RepoFuture<'_, ChatResult<()>>;
}

/// `SQLite` implementation of the key-value slot.
pub struct SqliteConversationRepository {
    conn: Connection,
    table: String,
    key: String,
}

impl SqliteConversationRepository {
    /// Table name for key-value slots.
    pub const DEFAULT_TABLE: &'static str = "kv_slots";

    /// Open (or create) the database file and the slot table.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        let conn = Connection::open(path.as_ref().to_path_buf()).await?;
        Self::with_connection(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> ChatResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            table,
            key: CONVERSATIONS_KEY.to_string(),
        })
    }

    async fn read_raw(&self) -> ChatResult<Option<String>> {
        let table = self.table.clone();
        let key = self.key.clone();
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        &format!("SELECT value FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn write_raw(&self, value: String) -> ChatResult<()> {
        let table = self.table.clone();
        let key = self.key.clone();
        let now_ms = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                        updated_at = excluded.updated_at"
                    ),
                    rusqlite::params![key, value, now_ms],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl ConversationRepository for SqliteConversationRepository {
    fn load(&self) -> RepoFuture<'_, ChatResult<Option<Vec<Conversation>>>> {
        Box::pin(async move {
            let Some(raw) = self.read_raw().await? else {
                return Ok(None);
            };
            let conversations = serde_json::from_str(&raw)?;
            Ok(Some(conversations))
        })
    }

    fn save(&self, conversations: Vec<Conversation>) -> RepoFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let raw = serde_json::to_string(&conversations)?;
            self.write_raw(raw).await
        })
    }
}

/// In-memory slot, used for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct InMemoryConversationRepository {
    slot: Mutex<Option<String>>,
}

impl InMemoryConversationRepository {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot pre-filled with raw serialized content.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    /// Raw serialized content currently held by the slot.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|guard| guard.clone())
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn load(&self) -> RepoFuture<'_, ChatResult<Option<Vec<Conversation>>>> {
        Box::pin(async move {
            match self.raw() {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
    }

    fn save(&self, conversations: Vec<Conversation>) -> RepoFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let raw = serde_json::to_string(&conversations)?;
            if let Ok(mut guard) = self.slot.lock() {
                *guard = Some(raw);
            }
            Ok(())
        })
    }
}
