//! Persisted user sync policy.

use std::sync::Arc;

use crate::db::{StateKey, StateRepository};
use crate::error::Result;
use crate::models::SyncConfig;

use super::persisted::PersistedCell;

/// Store for the user's `SyncConfig`
#[derive(Clone)]
pub struct SyncConfigStore {
    cell: Arc<PersistedCell<SyncConfig>>,
}

impl SyncConfigStore {
    /// Load the stored config, persisting defaults on first use
    pub async fn load(repo: Arc<dyn StateRepository>) -> Result<Self> {
        let cell =
            PersistedCell::load_or_init(repo, StateKey::SyncConfig, SyncConfig::default).await?;
        Ok(Self {
            cell: Arc::new(cell),
        })
    }

    /// Committed config snapshot
    pub fn current(&self) -> SyncConfig {
        self.cell.read(SyncConfig::clone)
    }

    /// Validate and persist a new config
    pub async fn save(&self, config: SyncConfig) -> Result<()> {
        config.validate()?;
        tracing::debug!(
            "Saving sync config: enabled={}, frequency={:?}, interval={}s, resolution={:?}",
            config.enabled,
            config.frequency,
            config.interval_seconds,
            config.conflict_resolution
        );
        self.cell.update(move |current| *current = config).await
    }
}
