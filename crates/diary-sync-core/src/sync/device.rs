//! Device identity derivation and persistence.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::{load_json, save_json, StateKey, StateRepository};
use crate::error::Result;
use crate::models::DeviceIdentity;
use crate::util::normalize_text_option;

/// Derive an identity from stable host characteristics.
///
/// The same host, OS and architecture always yield the same `device_id`.
pub fn derive_device_identity() -> DeviceIdentity {
    let host = hostname::get()
        .ok()
        .and_then(|name| normalize_text_option(Some(name.to_string_lossy().into_owned())))
        .unwrap_or_else(|| "unknown-host".to_string());
    identity_for(&host, std::env::consts::OS, std::env::consts::ARCH)
}

fn identity_for(host: &str, platform: &str, arch: &str) -> DeviceIdentity {
    let fingerprint = format!("diary-sync:{host}:{platform}:{arch}");
    DeviceIdentity {
        device_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string(),
        device_name: format!("{host} ({platform})"),
        platform: platform.to_string(),
    }
}

/// Load the persisted identity, deriving and persisting it on first use.
///
/// Once stored the identity never changes, even if the hostname does.
pub async fn load_device_identity(repo: &Arc<dyn StateRepository>) -> Result<DeviceIdentity> {
    if let Some(identity) = load_json(repo.as_ref(), StateKey::DeviceIdentity).await? {
        return Ok(identity);
    }

    let identity = derive_device_identity();
    save_json(repo.as_ref(), StateKey::DeviceIdentity, &identity).await?;
    tracing::info!(
        "Registered device {} as {}",
        identity.device_name,
        identity.device_id
    );
    Ok(identity)
}
