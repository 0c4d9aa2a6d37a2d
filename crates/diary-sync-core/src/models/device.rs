//! Device identity model

use serde::{Deserialize, Serialize};

/// Stable identity of the current client installation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable identifier, derived once and persisted
    pub device_id: String,
    /// Human-readable label
    pub device_name: String,
    /// Operating system family (e.g., "linux", "macos")
    pub platform: String,
}
