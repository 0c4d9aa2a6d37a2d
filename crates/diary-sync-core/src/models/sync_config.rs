//! Synchronization policy model

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// How often the scheduler fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncFrequency {
    /// Short poll at the engine's realtime period
    Realtime,
    /// Fixed interval of `interval_seconds`
    #[default]
    Interval,
}

/// Policy for divergent edits of the same record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolutionMode {
    /// Park conflicts until the user decides
    #[default]
    Manual,
    /// Most recently updated copy wins
    Automatic,
    /// Remote copy always wins
    ServerWins,
    /// Local copy always wins
    ClientWins,
}

/// User-chosen synchronization policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master switch
    pub enabled: bool,
    /// Scheduler mode
    pub frequency: SyncFrequency,
    /// Period for `SyncFrequency::Interval`
    pub interval_seconds: u32,
    /// Keep queuing local changes and skip cycles quietly while offline
    pub offline_support: bool,
    /// Conflict policy
    pub conflict_resolution: ConflictResolutionMode,
    /// Ask the remote to encrypt pushed payloads
    pub encryption: bool,
    /// Ask the remote to compress pushed payloads
    pub compression: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: SyncFrequency::Interval,
            interval_seconds: 300,
            offline_support: true,
            conflict_resolution: ConflictResolutionMode::Manual,
            encryption: false,
            compression: false,
        }
    }
}

impl SyncConfig {
    /// Interval-mode config with the given period
    pub fn every(interval_seconds: u32) -> Self {
        Self {
            interval_seconds,
            ..Self::default()
        }
    }

    /// Set the conflict policy
    #[must_use]
    pub const fn with_conflict_resolution(mut self, mode: ConflictResolutionMode) -> Self {
        self.conflict_resolution = mode;
        self
    }

    /// Switch to realtime short polling
    #[must_use]
    pub const fn realtime(mut self) -> Self {
        self.frequency = SyncFrequency::Realtime;
        self
    }

    /// Check invariants before the config is persisted or armed
    pub fn validate(&self) -> Result<()> {
        if self.frequency == SyncFrequency::Interval && self.interval_seconds == 0 {
            return Err(Error::ConfigInvalid(
                "interval_seconds must be greater than 0 in interval mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Scheduler period, using `realtime_poll` for realtime mode
    pub fn period(&self, realtime_poll: Duration) -> Duration {
        match self.frequency {
            SyncFrequency::Realtime => realtime_poll,
            SyncFrequency::Interval => Duration::from_secs(u64::from(self.interval_seconds)),
        }
    }
}
