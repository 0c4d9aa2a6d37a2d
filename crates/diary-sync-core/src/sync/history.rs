//! Bounded sync audit trail, newest first.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::db::{StateKey, StateRepository};
use crate::error::Result;
use crate::models::SyncHistoryEntry;

use super::persisted::PersistedCell;

/// Persisted ring of the most recent sync events
#[derive(Clone)]
pub struct SyncHistoryLog {
    cell: Arc<PersistedCell<VecDeque<SyncHistoryEntry>>>,
    capacity: usize,
}

impl SyncHistoryLog {
    pub async fn load(repo: Arc<dyn StateRepository>, capacity: usize) -> Result<Self> {
        let cell = PersistedCell::load(repo, StateKey::SyncHistory).await?;
        Ok(Self {
            cell: Arc::new(cell),
            capacity: capacity.max(1),
        })
    }

    /// Insert at the head and evict past capacity
    pub async fn append(&self, entry: SyncHistoryEntry) -> Result<()> {
        let capacity = self.capacity;
        self.cell
            .update(move |entries| {
                entries.push_front(entry);
                entries.truncate(capacity);
            })
            .await
    }

    /// Up to `limit` entries, newest first
    pub fn list(&self, limit: usize) -> Vec<SyncHistoryEntry> {
        self.cell
            .read(|entries| entries.iter().take(limit).cloned().collect())
    }

    /// Newest entry, if any
    pub fn latest(&self) -> Option<SyncHistoryEntry> {
        self.cell.read(|entries| entries.front().cloned())
    }

    pub fn len(&self) -> usize {
        self.cell.read(VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn clear(&self) -> Result<()> {
        self.cell.update(VecDeque::clear).await
    }
}
