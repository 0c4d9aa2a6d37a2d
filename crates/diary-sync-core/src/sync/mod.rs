//! Multi-device sync: persisted stores, reconciliation and the engine

mod config_store;
mod conflicts;
mod device;
mod engine;
mod history;
mod persisted;
mod queue;
mod reconcile;
mod remote;
mod status;

pub use config_store::SyncConfigStore;
pub use conflicts::{ConflictFilter, ConflictStore};
pub use device::{derive_device_identity, load_device_identity};
pub use engine::{CycleReport, ForceSyncOutcome, SyncEngine};
pub use history::SyncHistoryLog;
pub use queue::{coalesce, Coalesced, OfflineChangeQueue};
pub use reconcile::{
    apply_resolution_policy, merge_records, reconcile, ConflictCandidate, Reconciliation,
};
pub use remote::{DiaryStore, PushRequest, RemoteStore};
pub use status::StatusHandle;
