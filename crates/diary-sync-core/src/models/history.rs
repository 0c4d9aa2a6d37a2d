//! Sync history model

use serde::{Deserialize, Serialize};

use super::ids::HistoryEntryId;

/// Audited sync event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    SyncStart,
    SyncSuccess,
    SyncError,
    ConflictDetected,
    ConflictResolved,
}

/// One entry of the sync audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub id: HistoryEntryId,
    /// Append timestamp (Unix ms)
    pub timestamp: i64,
    pub action: HistoryAction,
    pub details: String,
    /// Bytes exchanged with the remote
    pub data_size: u64,
    pub duration_ms: u64,
}

impl SyncHistoryEntry {
    /// Entry stamped with the current time
    pub fn new(action: HistoryAction, details: impl Into<String>) -> Self {
        Self {
            id: HistoryEntryId::new(),
            timestamp: crate::util::unix_millis_now(),
            action,
            details: details.into(),
            data_size: 0,
            duration_ms: 0,
        }
    }

    #[must_use]
    pub const fn with_data_size(mut self, data_size: u64) -> Self {
        self.data_size = data_size;
        self
    }

    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
