//! Offline change queue
//!
//! FIFO log of local mutations waiting for the remote. Entries leave the
//! queue only through `acknowledge` (after the remote confirmed them) or
//! `clear`, so a crash between push and acknowledge replays them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::db::{StateKey, StateRepository};
use crate::error::{Error, Result};
use crate::models::{ChangeAction, ChangeId, QueuedChange, Record, RecordId};

use super::persisted::PersistedCell;
use super::status::StatusHandle;

/// Size-bounded, persisted queue of local mutations
#[derive(Clone)]
pub struct OfflineChangeQueue {
    cell: Arc<PersistedCell<VecDeque<QueuedChange>>>,
    status: StatusHandle,
    capacity: usize,
}

impl OfflineChangeQueue {
    /// Load the persisted queue
    pub async fn load(
        repo: Arc<dyn StateRepository>,
        status: StatusHandle,
        capacity: usize,
    ) -> Result<Self> {
        let cell = PersistedCell::load(repo, StateKey::OfflineQueue).await?;
        let queue = Self {
            cell: Arc::new(cell),
            status,
            capacity: capacity.max(1),
        };
        queue.publish_len();
        Ok(queue)
    }

    /// Append a mutation; evicts the oldest entry when at capacity
    pub async fn enqueue(&self, action: ChangeAction, payload: Record) -> Result<QueuedChange> {
        if payload.id.as_str().trim().is_empty() {
            return Err(Error::InvalidInput(
                "queued change needs a record id".to_string(),
            ));
        }
        let change = QueuedChange::new(action, payload);
        let entry = change.clone();
        let capacity = self.capacity;

        let evicted = self
            .cell
            .update(move |queue| {
                queue.push_back(entry);
                let overflow = queue.len().saturating_sub(capacity);
                queue.drain(..overflow).collect::<Vec<_>>()
            })
            .await?;

        for dropped in &evicted {
            tracing::warn!(
                "Offline queue full ({} entries); evicted oldest change {} ({:?} {})",
                capacity,
                dropped.id,
                dropped.action,
                dropped.payload.id
            );
        }

        tracing::debug!(
            "Queued {:?} for record {} as change {}",
            change.action,
            change.payload.id,
            change.id
        );
        self.publish_len();
        Ok(change)
    }

    /// Snapshot of every queued change in enqueue order; nothing is removed
    pub fn drain(&self) -> Vec<QueuedChange> {
        self.cell.read(|queue| queue.iter().cloned().collect())
    }

    /// Remove changes the remote confirmed; returns how many were removed
    pub async fn acknowledge(&self, ids: &[ChangeId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<ChangeId> = ids.iter().copied().collect();

        let removed = self
            .cell
            .update_if(move |queue| {
                let before = queue.len();
                queue.retain(|change| !ids.contains(&change.id));
                let removed = before - queue.len();
                (removed > 0).then_some(removed)
            })
            .await?
            .unwrap_or(0);

        self.publish_len();
        Ok(removed)
    }

    /// Flag changes as handed to the remote; persisted before the push goes out
    pub async fn mark_attempted(&self, ids: &[ChangeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: HashSet<ChangeId> = ids.iter().copied().collect();

        self.cell
            .update_if(move |queue| {
                let mut marked = false;
                for change in queue.iter_mut() {
                    if !change.attempted && ids.contains(&change.id) {
                        change.attempted = true;
                        marked = true;
                    }
                }
                marked.then_some(())
            })
            .await?;
        Ok(())
    }

    /// Drop every queued change
    pub async fn clear(&self) -> Result<()> {
        self.cell.update(VecDeque::clear).await?;
        tracing::info!("Offline queue cleared");
        self.publish_len();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cell.read(VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn publish_len(&self) {
        let len = self.len();
        self.status.update(|status| status.pending_changes = len);
    }
}

/// Queue contents reduced to one effective change per record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coalesced {
    /// Effective changes, ordered by each record's first queued change
    pub changes: Vec<QueuedChange>,
    /// Queued changes absorbed into a later change for the same record
    pub folded: Vec<ChangeId>,
}

/// Fold queued changes so the last writer per record wins.
///
/// A create followed by updates stays a create carrying the latest payload.
/// A create followed by a delete cancels out, unless the create was already
/// handed to the remote; then the delete still has to go out.
pub fn coalesce(changes: &[QueuedChange]) -> Coalesced {
    let mut slots: Vec<Option<QueuedChange>> = Vec::new();
    let mut index: HashMap<RecordId, usize> = HashMap::new();
    let mut folded = Vec::new();

    for change in changes {
        let Some(&slot) = index.get(&change.payload.id) else {
            index.insert(change.payload.id.clone(), slots.len());
            slots.push(Some(change.clone()));
            continue;
        };

        let merged = match slots[slot].take() {
            None => Some(change.clone()),
            Some(previous) => {
                folded.push(previous.id);
                let attempted = previous.attempted || change.attempted;
                match (previous.action, change.action) {
                    (ChangeAction::Create, ChangeAction::Delete) if !attempted => {
                        folded.push(change.id);
                        None
                    }
                    (ChangeAction::Create, ChangeAction::Update) => Some(QueuedChange {
                        action: ChangeAction::Create,
                        attempted,
                        ..change.clone()
                    }),
                    _ => Some(QueuedChange {
                        attempted,
                        ..change.clone()
                    }),
                }
            }
        };
        slots[slot] = merged;
    }

    Coalesced {
        changes: slots.into_iter().flatten().collect(),
        folded,
    }
}
