//! diary-sync-core - Multi-device synchronization engine for a personal diary
//!
//! This crate keeps diary data consistent across devices that go offline:
//! it queues local mutations, reconciles them with a remote store on a
//! schedule, and resolves or surfaces conflicting edits.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use config::EngineOptions;
pub use error::{Error, Result};
pub use models::{Record, RecordId, SyncConfig, SyncStatus};
pub use sync::{ForceSyncOutcome, SyncEngine};
