//! Persist-then-commit cell shared by the sync stores.

use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{load_json, save_json, StateKey, StateRepository};
use crate::error::Result;

/// A value mirrored to one `StateKey`.
///
/// Readers see the last committed snapshot without waiting on writers.
/// Writers are serialized, mutate a copy, persist it, and only then commit.
pub(crate) struct PersistedCell<T> {
    key: StateKey,
    repo: Arc<dyn StateRepository>,
    committed: RwLock<T>,
    writer: tokio::sync::Mutex<()>,
}

impl<T> PersistedCell<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Load the persisted value, falling back to `T::default()` without writing.
    pub(crate) async fn load(repo: Arc<dyn StateRepository>, key: StateKey) -> Result<Self>
    where
        T: Default,
    {
        let value = load_json(repo.as_ref(), key).await?.unwrap_or_default();
        Ok(Self::with_value(repo, key, value))
    }

    /// Load the persisted value, persisting `init()` when nothing is stored yet.
    pub(crate) async fn load_or_init(
        repo: Arc<dyn StateRepository>,
        key: StateKey,
        init: impl FnOnce() -> T + Send,
    ) -> Result<Self> {
        if let Some(value) = load_json(repo.as_ref(), key).await? {
            return Ok(Self::with_value(repo, key, value));
        }

        let value = init();
        save_json(repo.as_ref(), key, &value).await?;
        tracing::debug!("Initialized persisted sync state for {}", key);
        Ok(Self::with_value(repo, key, value))
    }

    fn with_value(repo: Arc<dyn StateRepository>, key: StateKey, value: T) -> Self {
        Self {
            key,
            repo,
            committed: RwLock::new(value),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    /// Read the committed snapshot
    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let committed = self.committed.read().unwrap_or_else(PoisonError::into_inner);
        f(&committed)
    }

    /// Mutate, persist and commit
    pub(crate) async fn update<R: Send>(&self, f: impl FnOnce(&mut T) -> R + Send) -> Result<R> {
        let _writer = self.writer.lock().await;

        let mut next = self.read(T::clone);
        let outcome = f(&mut next);
        self.commit(next).await?;
        Ok(outcome)
    }

    /// Like `update`, but skips persisting when `f` returns `None`
    pub(crate) async fn update_if<R: Send>(
        &self,
        f: impl FnOnce(&mut T) -> Option<R> + Send,
    ) -> Result<Option<R>> {
        let _writer = self.writer.lock().await;

        let mut next = self.read(T::clone);
        let Some(outcome) = f(&mut next) else {
            return Ok(None);
        };
        self.commit(next).await?;
        Ok(Some(outcome))
    }

    async fn commit(&self, next: T) -> Result<()> {
        save_json(self.repo.as_ref(), self.key, &next).await?;
        *self.committed.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }
}
