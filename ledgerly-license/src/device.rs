//! Device identity for license binding.
//!
//! A license is bound to one device identifier. The identifier is a hash of
//! stable hardware/OS identifiers, persisted after first use so that it
//! survives hostname changes, and replaced by a random UUID when no
//! machine-specific identifier can be found.

use crate::error::{LicenseError, LicenseResult};
use crate::store::{keys, SecureStore};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use tracing::{debug, warn};

/// Supplies the identifier this device presents to the license authority.
pub trait DeviceIdentity: Send + Sync {
    /// Returns a stable identifier for this device.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::DeviceIdentity`] when no identifier is available.
    fn device_id(&self) -> LicenseResult<String>;
}

/// A stable fingerprint that identifies this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    /// The fingerprint ID (hash of hardware identifiers).
    id: String,
    /// When the fingerprint was generated.
    generated_at: chrono::DateTime<chrono::Utc>,
}

impl DeviceFingerprint {
    /// Generates a fingerprint for the current device.
    ///
    /// # Errors
    ///
    /// Fails when neither a hostname nor a machine id is available, since
    /// OS and architecture alone are shared by every device.
    pub fn try_generate() -> LicenseResult<Self> {
        let components = collect_hardware_ids();
        if components.machine_specific == 0 {
            return Err(LicenseError::DeviceIdentity(
                "no machine-specific identifier available".to_string(),
            ));
        }
        Ok(Self::from_components(&components.ids))
    }

    /// Builds a fingerprint from explicit components.
    #[must_use]
    pub fn from_components<S: AsRef<str>>(components: &[S]) -> Self {
        let combined = components
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("|");

        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        let hash = hasher.finalize();

        Self {
            id: URL_SAFE_NO_PAD.encode(&hash[..16]),
            generated_at: chrono::Utc::now(),
        }
    }

    /// Returns the fingerprint ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the fingerprint was generated.
    #[must_use]
    pub fn generated_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.generated_at
    }
}

/// Identity from the hardware fingerprint of the current machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintIdentity;

impl DeviceIdentity for FingerprintIdentity {
    fn device_id(&self) -> LicenseResult<String> {
        DeviceFingerprint::try_generate().map(|fp| format!("dev-{}", fp.id()))
    }
}

/// A fixed, caller-supplied identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity(pub String);

impl DeviceIdentity for StaticIdentity {
    fn device_id(&self) -> LicenseResult<String> {
        if self.0.trim().is_empty() {
            return Err(LicenseError::DeviceIdentity("empty device id".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Returns this device's id, creating and persisting it on first use.
///
/// Order: the id stored under [`keys::DEVICE_ID`], then `provider`, then a
/// random UUID. Never fails; storage errors are logged and the computed id is
/// still returned.
pub fn resolve_device_id(provider: &dyn DeviceIdentity, store: &dyn SecureStore) -> String {
    match store.get(keys::DEVICE_ID) {
        Ok(Some(id)) if !id.trim().is_empty() => return id,
        Ok(_) => {}
        Err(e) => warn!("Could not read stored device id: {e}"),
    }

    let id = match provider.device_id() {
        Ok(id) => id,
        Err(e) => {
            warn!("Device identity unavailable, using random id: {e}");
            format!("rnd-{}", uuid::Uuid::new_v4())
        }
    };

    if let Err(e) = store.set(keys::DEVICE_ID, &id) {
        warn!("Could not persist device id: {e}");
    } else {
        debug!("Persisted new device id");
    }
    id
}

struct HardwareIds {
    ids: Vec<String>,
    machine_specific: usize,
}

/// Collects hardware identifiers for fingerprinting.
fn collect_hardware_ids() -> HardwareIds {
    let mut ids = vec![env::consts::OS.to_string(), env::consts::ARCH.to_string()];
    let mut machine_specific = 0;

    if let Some(hostname) = get_hostname() {
        ids.push(hostname);
        machine_specific += 1;
    }

    if let Some(machine_id) = get_machine_id() {
        ids.push(machine_id);
        machine_specific += 1;
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        ids.push(user);
    }

    HardwareIds {
        ids,
        machine_specific,
    }
}

fn get_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.trim().is_empty())
}

/// Gets the machine ID (platform-specific unique identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "android")))]
    {
        None
    }
}
