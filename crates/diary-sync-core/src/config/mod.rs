//! Engine tuning options.
//!
//! These are host-provisioned knobs (timeouts, capacities, poll periods),
//! separate from the user's persisted `SyncConfig` policy.

#![allow(clippy::cast_possible_truncation)] // u64 milliseconds cover any realistic duration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REALTIME_POLL_MS: u64 = 5_000;
const DEFAULT_PROGRESS_GRACE_MS: u64 = 1_500;
const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Tuning options for a `SyncEngine`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Upper bound for every remote `pull`/`push` call
    pub remote_timeout_ms: u64,
    /// Short-poll period used for realtime frequency
    pub realtime_poll_ms: u64,
    /// Delay before a finished cycle's progress drops back to 0
    pub progress_grace_ms: u64,
    /// Offline queue bound; oldest entries are evicted past it
    pub queue_capacity: usize,
    /// History bound; oldest entries are evicted past it
    pub history_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            realtime_poll_ms: DEFAULT_REALTIME_POLL_MS,
            progress_grace_ms: DEFAULT_PROGRESS_GRACE_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl EngineOptions {
    /// Parse options from a JSON document; missing fields keep their defaults.
    pub fn parse(payload: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(payload)
            .map_err(|error| Error::ConfigInvalid(format!("invalid engine options: {error}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Set the remote call timeout
    #[must_use]
    pub const fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the realtime poll period
    #[must_use]
    pub const fn with_realtime_poll(mut self, period: Duration) -> Self {
        self.realtime_poll_ms = period.as_millis() as u64;
        self
    }

    /// Set the progress reset grace period
    #[must_use]
    pub const fn with_progress_grace(mut self, grace: Duration) -> Self {
        self.progress_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Set the offline queue bound
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the history bound
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub const fn realtime_poll(&self) -> Duration {
        Duration::from_millis(self.realtime_poll_ms)
    }

    pub const fn progress_grace(&self) -> Duration {
        Duration::from_millis(self.progress_grace_ms)
    }

    /// Reject values that would stall or disable the engine
    pub fn validate(&self) -> Result<()> {
        if self.remote_timeout_ms == 0 {
            return Err(Error::ConfigInvalid(
                "remote_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.realtime_poll_ms == 0 {
            return Err(Error::ConfigInvalid(
                "realtime_poll_ms must be greater than 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 || self.history_capacity == 0 {
            return Err(Error::ConfigInvalid(
                "queue_capacity and history_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
