//! Engine state and status snapshot types.

use serde::{Deserialize, Serialize};

/// Sync engine state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Stopped,
    Idle,
    Syncing,
    ConflictPending,
    Error,
}

impl EngineState {
    /// Whether a scheduled or forced trigger may start a cycle from here
    pub const fn accepts_trigger(self) -> bool {
        matches!(self, Self::Idle | Self::ConflictPending | Self::Error)
    }
}

/// Snapshot of the engine's condition for status views
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: EngineState,
    /// Engine running and host online
    pub connected: bool,
    /// A cycle is in flight
    pub syncing: bool,
    /// Last successful cycle (Unix ms)
    pub last_sync: Option<i64>,
    /// Next scheduled trigger (Unix ms)
    pub next_sync: Option<i64>,
    /// Current offline queue length
    pub pending_changes: usize,
    /// Coarse cycle progress, 0..=100
    pub progress_percent: u8,
    /// Human-readable cause of the last failure
    pub last_error: Option<String>,
    /// Unresolved conflicts awaiting a decision
    pub open_conflicts: usize,
}
