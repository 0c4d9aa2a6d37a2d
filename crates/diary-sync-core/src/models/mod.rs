//! Data models for diary sync

mod device;
mod history;
mod ids;
mod queued_change;
mod record;
mod status;
mod sync_config;
mod sync_conflict;

pub use device::DeviceIdentity;
pub use history::{HistoryAction, SyncHistoryEntry};
pub use ids::{ChangeId, ConflictId, HistoryEntryId};
pub use queued_change::{Ack, ChangeAction, QueuedChange};
pub use record::{DiaryEntry, Record, RecordBody, RecordId};
pub use status::{EngineState, SyncStatus};
pub use sync_config::{ConflictResolutionMode, SyncConfig, SyncFrequency};
pub use sync_conflict::{ConflictType, Resolution, SyncConflict};
