//! Persisted sync state repository
//!
//! Every sync store persists itself as one JSON document under its own key.
//! There are no cross references between documents beyond record IDs.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

use super::Database;

/// Key of an independently persisted sync document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    SyncConfig,
    OfflineQueue,
    SyncConflicts,
    SyncHistory,
    DeviceIdentity,
}

impl StateKey {
    /// Storage key
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncConfig => "sync_config",
            Self::OfflineQueue => "offline_queue",
            Self::SyncConflicts => "sync_conflicts",
            Self::SyncHistory => "sync_history",
            Self::DeviceIdentity => "device_identity",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for keyed sync state storage
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Load the raw document stored under `key`
    async fn load(&self, key: StateKey) -> Result<Option<String>>;

    /// Replace the document stored under `key`
    async fn save(&self, key: StateKey, value: &str) -> Result<()>;

    /// Remove the document stored under `key`
    async fn remove(&self, key: StateKey) -> Result<()>;
}

/// Load and deserialize the document stored under `key`
pub async fn load_json<T: DeserializeOwned>(
    repo: &dyn StateRepository,
    key: StateKey,
) -> Result<Option<T>> {
    match repo.load(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and store `value` under `key`
pub async fn save_json<T: Serialize + Sync + ?Sized>(
    repo: &dyn StateRepository,
    key: StateKey,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    repo.save(key, &raw).await
}

/// libSQL implementation of `StateRepository`
#[derive(Clone)]
pub struct LibSqlStateRepository {
    db: Arc<tokio::sync::Mutex<Database>>,
}

impl LibSqlStateRepository {
    /// Create a new repository owning the given database
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(tokio::sync::Mutex::new(db)),
        }
    }

    /// Open (or create) the state database at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }
}

#[async_trait]
impl StateRepository for LibSqlStateRepository {
    async fn load(&self, key: StateKey) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT value FROM sync_state WHERE key = ?", [key.as_str()])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn save(&self, key: StateKey, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value, updated_at) VALUES (?, ?, ?)",
                libsql::params![key.as_str(), value, crate::util::unix_millis_now()],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: StateKey) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM sync_state WHERE key = ?", [key.as_str()])
            .await?;
        Ok(())
    }
}

/// In-memory implementation of `StateRepository` for tests and ephemeral hosts
#[derive(Clone, Default)]
pub struct MemoryStateRepository {
    entries: Arc<Mutex<HashMap<StateKey, String>>>,
}

impl MemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateRepository for MemoryStateRepository {
    async fn load(&self, key: StateKey) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key).cloned())
    }

    async fn save(&self, key: StateKey, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: StateKey) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&key);
        Ok(())
    }
}
