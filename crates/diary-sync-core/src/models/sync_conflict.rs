//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::ids::ConflictId;
use super::record::{Record, RecordId};

/// Kind of divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Local create collided with an existing remote record
    Create,
    /// Both sides edited the record
    Update,
    /// One side deleted, the other edited
    Delete,
}

/// Decision taken for a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Local copy wins and is pushed
    KeepLocal,
    /// Remote copy wins and is applied locally
    KeepRemote,
    /// Both copies are merged
    Merge,
    /// Neither copy is propagated
    Discard,
}

/// Divergent local and remote versions of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict identifier
    pub id: ConflictId,
    /// Kind of divergence
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    /// Record involved in the conflict
    pub record_id: RecordId,
    /// Local copy when detected
    pub local_version: Record,
    /// Remote copy when detected
    pub remote_version: Record,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    /// Write-once resolution flag
    pub resolved: bool,
    /// Decision, set together with `resolved`
    pub resolution: Option<Resolution>,
    /// Resolution timestamp (Unix ms)
    #[serde(default)]
    pub resolved_at: Option<i64>,
}

impl SyncConflict {
    /// New unresolved conflict
    #[must_use]
    pub fn new(conflict_type: ConflictType, local_version: Record, remote_version: Record) -> Self {
        Self {
            id: ConflictId::new(),
            conflict_type,
            record_id: local_version.id.clone(),
            local_version,
            remote_version,
            detected_at: crate::util::unix_millis_now(),
            resolved: false,
            resolution: None,
            resolved_at: None,
        }
    }
}
