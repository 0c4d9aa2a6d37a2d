//! Conflict store
//!
//! Holds detected conflicts and their write-once resolutions. Resolved
//! conflicts are never reopened; a new divergence is recorded as a new
//! conflict.

use std::collections::HashSet;
use std::sync::Arc;

use crate::db::{StateKey, StateRepository};
use crate::error::Result;
use crate::models::{
    ConflictId, HistoryAction, Record, RecordId, Resolution, SyncConflict, SyncHistoryEntry,
};

use super::history::SyncHistoryLog;
use super::persisted::PersistedCell;

/// Filter for `ConflictStore::list`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictFilter {
    /// `Some(false)` for open conflicts, `Some(true)` for resolved, `None` for all
    pub resolved: Option<bool>,
}

impl ConflictFilter {
    pub const ALL: Self = Self { resolved: None };
    pub const OPEN: Self = Self {
        resolved: Some(false),
    };
    pub const RESOLVED: Self = Self {
        resolved: Some(true),
    };

    const fn matches(self, conflict: &SyncConflict) -> bool {
        match self.resolved {
            Some(resolved) => conflict.resolved == resolved,
            None => true,
        }
    }
}

/// Persisted list of sync conflicts
#[derive(Clone)]
pub struct ConflictStore {
    cell: Arc<PersistedCell<Vec<SyncConflict>>>,
    history: SyncHistoryLog,
}

impl ConflictStore {
    pub async fn load(repo: Arc<dyn StateRepository>, history: SyncHistoryLog) -> Result<Self> {
        let cell = PersistedCell::load(repo, StateKey::SyncConflicts).await?;
        Ok(Self {
            cell: Arc::new(cell),
            history,
        })
    }

    /// Store a newly detected conflict
    pub async fn record(&self, conflict: SyncConflict) -> Result<ConflictId> {
        let id = conflict.id;
        tracing::info!(
            "Recorded {:?} conflict {} on record {}",
            conflict.conflict_type,
            id,
            conflict.record_id
        );
        self.cell.update(move |conflicts| conflicts.push(conflict)).await?;
        Ok(id)
    }

    /// Conflicts matching `filter`, oldest first
    pub fn list(&self, filter: ConflictFilter) -> Vec<SyncConflict> {
        self.cell.read(|conflicts| {
            conflicts
                .iter()
                .filter(|conflict| filter.matches(conflict))
                .cloned()
                .collect()
        })
    }

    pub fn get(&self, id: ConflictId) -> Option<SyncConflict> {
        self.cell
            .read(|conflicts| conflicts.iter().find(|c| c.id == id).cloned())
    }

    /// Number of unresolved conflicts
    pub fn open_count(&self) -> usize {
        self.cell
            .read(|conflicts| conflicts.iter().filter(|c| !c.resolved).count())
    }

    /// Records that have at least one unresolved conflict
    pub fn open_record_ids(&self) -> HashSet<RecordId> {
        self.cell.read(|conflicts| {
            conflicts
                .iter()
                .filter(|c| !c.resolved)
                .map(|c| c.record_id.clone())
                .collect()
        })
    }

    /// Unresolved conflicts on one record, oldest first
    pub fn open_for(&self, record_id: &RecordId) -> Vec<ConflictId> {
        self.cell.read(|conflicts| {
            conflicts
                .iter()
                .filter(|c| !c.resolved && &c.record_id == record_id)
                .map(|c| c.id)
                .collect()
        })
    }

    /// Unresolved conflict holding exactly these two versions
    pub fn find_open(&self, local: &Record, remote: &Record) -> Option<ConflictId> {
        self.cell.read(|conflicts| {
            conflicts
                .iter()
                .find(|c| !c.resolved && &c.local_version == local && &c.remote_version == remote)
                .map(|c| c.id)
        })
    }

    /// Latest decision taken against this exact remote copy of a record
    pub fn decision_for(&self, remote: &Record) -> Option<Resolution> {
        self.cell.read(|conflicts| {
            conflicts
                .iter()
                .rev()
                .filter(|c| c.resolved && c.record_id == remote.id)
                .find(|c| &c.remote_version == remote)
                .and_then(|c| c.resolution)
        })
    }

    /// Resolve a conflict once.
    ///
    /// Returns `false` when the ID is unknown or the conflict is already
    /// resolved; the stored resolution is left untouched in both cases.
    pub async fn resolve(&self, id: ConflictId, resolution: Resolution) -> Result<bool> {
        let resolved = self
            .cell
            .update_if(move |conflicts| {
                let conflict = conflicts.iter_mut().find(|c| c.id == id && !c.resolved)?;
                conflict.resolved = true;
                conflict.resolution = Some(resolution);
                conflict.resolved_at = Some(crate::util::unix_millis_now());
                Some(conflict.clone())
            })
            .await?;

        let Some(conflict) = resolved else {
            tracing::debug!("Ignored resolution for unknown or resolved conflict {}", id);
            return Ok(false);
        };

        self.history
            .append(SyncHistoryEntry::new(
                HistoryAction::ConflictResolved,
                format!(
                    "Resolved {:?} conflict on record {} with {:?}",
                    conflict.conflict_type, conflict.record_id, resolution
                ),
            ))
            .await?;
        Ok(true)
    }

    /// Delete resolved conflicts; returns how many were removed
    pub async fn clear_resolved(&self) -> Result<usize> {
        Ok(self
            .cell
            .update_if(|conflicts| {
                let before = conflicts.len();
                conflicts.retain(|c| !c.resolved);
                let removed = before - conflicts.len();
                (removed > 0).then_some(removed)
            })
            .await?
            .unwrap_or(0))
    }
}
