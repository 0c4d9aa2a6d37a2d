//! Shared, observable `SyncStatus`.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::SyncStatus;

/// Handle to the single status instance of an engine.
///
/// Cloning shares the instance. Observers either take snapshots or
/// subscribe to every committed change.
#[derive(Clone, Debug)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<SyncStatus>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::default());
        Self { tx: Arc::new(tx) }
    }

    /// Last committed status
    pub fn snapshot(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.tx.send_modify(f);
    }
}
