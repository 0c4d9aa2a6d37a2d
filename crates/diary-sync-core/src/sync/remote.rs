//! Collaborators the engine talks to but does not own.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Ack, DeviceIdentity, QueuedChange, Record};

/// Batch of local changes sent to the remote
#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    /// Origin device, so the remote can attribute changes
    pub device: &'a DeviceIdentity,
    pub changes: &'a [QueuedChange],
    pub encryption: bool,
    pub compression: bool,
}

/// Backend that holds the shared copy of the diary.
///
/// `push` must be idempotent by `QueuedChange::id`: a change replayed after
/// a crash-before-acknowledge is acknowledged again without being applied
/// twice.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Records changed since `since` (Unix ms), or everything when `None`
    async fn pull(&self, since: Option<i64>) -> Result<Vec<Record>>;

    /// Apply changes; returns one `Ack` per applied or already-known change
    async fn push(&self, request: PushRequest<'_>) -> Result<Vec<Ack>>;
}

/// Local diary CRUD store
#[async_trait]
pub trait DiaryStore: Send + Sync {
    /// Every record currently held locally, tombstones included
    async fn list_local(&self) -> Result<Vec<Record>>;

    /// Overwrite the local copy with a record coming from the remote
    async fn apply_remote(&self, record: &Record) -> Result<()>;
}
