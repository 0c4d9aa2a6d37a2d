//! Reconciliation and conflict resolution policy
//!
//! Pure functions over record snapshots. Two copies of a record are equal
//! only when their serialized forms match; there is no field-level diff.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::{ConflictResolutionMode, ConflictType, Record, RecordBody, RecordId, Resolution};

/// Local and remote copies of a record that diverged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCandidate {
    pub conflict_type: ConflictType,
    pub local: Record,
    pub remote: Record,
}

/// Outcome of comparing the local and remote record sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Present on both sides with different content
    pub conflicts: Vec<ConflictCandidate>,
    /// Present only locally
    pub to_push: Vec<Record>,
    /// Present only remotely
    pub to_pull: Vec<Record>,
    /// Present on both sides with identical content
    pub in_sync: Vec<RecordId>,
}

/// Compare local and remote records.
///
/// Local order is preserved for `conflicts` and `to_push`, remote order for
/// `to_pull`. When the remote returns a record twice the last copy wins.
pub fn reconcile(local: &[Record], remote: &[Record]) -> Result<Reconciliation> {
    let remote_index: HashMap<&RecordId, &Record> =
        remote.iter().map(|record| (&record.id, record)).collect();
    let local_ids: HashSet<&RecordId> = local.iter().map(|record| &record.id).collect();

    let mut outcome = Reconciliation::default();
    for record in local {
        let Some(&theirs) = remote_index.get(&record.id) else {
            outcome.to_push.push(record.clone());
            continue;
        };

        if record.fingerprint()? == theirs.fingerprint()? || (record.deleted && theirs.deleted) {
            outcome.in_sync.push(record.id.clone());
            continue;
        }

        let conflict_type = if record.deleted || theirs.deleted {
            ConflictType::Delete
        } else {
            ConflictType::Update
        };
        outcome.conflicts.push(ConflictCandidate {
            conflict_type,
            local: record.clone(),
            remote: theirs.clone(),
        });
    }

    let mut pulled = HashSet::new();
    for record in remote.iter().rev() {
        if !local_ids.contains(&record.id) && pulled.insert(&record.id) {
            outcome.to_pull.push(record.clone());
        }
    }
    outcome.to_pull.reverse();

    Ok(outcome)
}

/// Decide a conflict under `mode`; `None` leaves it for the user.
pub fn apply_resolution_policy(
    mode: ConflictResolutionMode,
    local: &Record,
    remote: &Record,
) -> Option<Resolution> {
    match mode {
        ConflictResolutionMode::Manual => None,
        ConflictResolutionMode::ServerWins => Some(Resolution::KeepRemote),
        ConflictResolutionMode::ClientWins => Some(Resolution::KeepLocal),
        ConflictResolutionMode::Automatic if local.updated_at > remote.updated_at => {
            Some(Resolution::KeepLocal)
        }
        ConflictResolutionMode::Automatic => Some(Resolution::KeepRemote),
    }
}

/// Field-level merge of two copies of a record.
///
/// For diary entries the newer copy supplies title, body and mood, and tags
/// are unioned. Anything else falls back to the newer copy. Ties go to the
/// remote copy.
pub fn merge_records(local: &Record, remote: &Record) -> Record {
    let (newer, older) = if local.updated_at > remote.updated_at {
        (local, remote)
    } else {
        (remote, local)
    };

    let mut merged = newer.clone();
    merged.updated_at = local.updated_at.max(remote.updated_at);

    if let (RecordBody::Diary(entry), Some(other)) = (&mut merged.body, older.as_diary()) {
        for tag in &other.tags {
            if !entry.tags.contains(tag) {
                entry.tags.push(tag.clone());
            }
        }
        if entry.mood.is_none() {
            entry.mood.clone_from(&other.mood);
        }
    }
    merged
}
