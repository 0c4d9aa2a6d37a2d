//! Queued local mutation model

use serde::{Deserialize, Serialize};

use super::ids::ChangeId;
use super::record::Record;

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// New record
    Create,
    /// Edited record
    Update,
    /// Removed record
    Delete,
}

/// A local mutation waiting to be applied remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedChange {
    /// Unique change identifier; the remote deduplicates on it
    pub id: ChangeId,
    /// Mutation kind
    pub action: ChangeAction,
    /// Record snapshot at mutation time
    pub payload: Record,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    /// Handed to the remote at least once; it may have been applied
    #[serde(default)]
    pub attempted: bool,
}

impl QueuedChange {
    /// Create a new change stamped with the current time
    #[must_use]
    pub fn new(action: ChangeAction, payload: Record) -> Self {
        Self {
            id: ChangeId::new(),
            action,
            payload,
            enqueued_at: crate::util::unix_millis_now(),
            attempted: false,
        }
    }

    /// Record as it should look after this change is applied
    ///
    /// Deletes become tombstones so reconciliation can compare them.
    #[must_use]
    pub fn effective_record(&self) -> Record {
        if self.action == ChangeAction::Delete && !self.payload.deleted {
            self.payload.tombstone(self.payload.updated_at)
        } else {
            self.payload.clone()
        }
    }
}

/// Remote confirmation that a change was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Confirmed change
    pub change_id: ChangeId,
}
