//! Shared pieces of the `ledgerly-license` command line tool.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ledgerly_license::{
    AuthorityConfig, EncryptedFileStore, LicenseConfig, LicensePhase, LicenseSnapshot,
    WarningLevel,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Subdirectory of the data dir holding encrypted entries.
pub const STORE_DIR: &str = "license";

/// Per-install key material for the encrypted store.
pub const INSTALL_ID_FILE: &str = "install.id";

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub license: LicenseConfig,
    pub authority: AuthorityConfig,
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl FileConfig {
    /// Reads and validates `path`, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config
            .license
            .validate()
            .with_context(|| format!("Invalid license settings in {}", path.display()))?;
        Ok(config)
    }

    /// Applies command line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(url) = overrides.api_url {
            self.authority.base_url = url;
        }
        if let Some(key) = overrides.api_key.filter(|k| !k.is_empty()) {
            self.authority.api_key = Some(key);
        }
        self
    }
}

/// Picks the data directory: explicit flag, else the platform default.
pub fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(ledgerly_license::default_data_dir)
        .context("No data directory available; pass --data-dir")
}

/// Key material for the encrypted store: a random id created on first use
/// and kept in `install.id` next to the store.
///
/// Nothing here depends on the hostname or the current user, so the store
/// stays readable when either changes.
pub fn store_key_material(data_dir: &Path) -> Result<String> {
    let path = data_dir.join(INSTALL_ID_FILE);
    match fs::read_to_string(&path) {
        Ok(existing) if !existing.trim().is_empty() => return Ok(existing.trim().to_string()),
        Ok(_) => warn!("Empty install id at {}, creating a new one", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Creating install id at {}", path.display());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    }

    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let id = uuid::Uuid::new_v4().to_string();
    fs::write(&path, &id).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(id)
}

/// Opens the encrypted license store under `data_dir`.
pub fn open_store(data_dir: &Path) -> Result<EncryptedFileStore> {
    let material = store_key_material(data_dir)?;
    EncryptedFileStore::open(data_dir.join(STORE_DIR), &material)
        .with_context(|| format!("Failed to open license store in {}", data_dir.display()))
}

/// One-line human summary of a snapshot.
#[must_use]
pub fn describe(snapshot: &LicenseSnapshot, now: DateTime<Utc>) -> String {
    let mut line = match snapshot.phase {
        LicensePhase::Uninitialized => "starting".to_string(),
        LicensePhase::NoLicense => "no license".to_string(),
        LicensePhase::Activating => "activating".to_string(),
        LicensePhase::Valid => match snapshot.time_until_expiry(now) {
            Some(left) => format!("valid, expires in {}", human_duration(left)),
            None => "valid".to_string(),
        },
        LicensePhase::GracePeriod => match snapshot.grace_time_remaining(now) {
            Some(left) => format!("expired, grace period ends in {}", human_duration(left)),
            None => "expired, grace period".to_string(),
        },
        LicensePhase::Blocked => format!(
            "blocked ({})",
            snapshot.block_reason().map_or("UNKNOWN", |r| r.code())
        ),
    };

    if let Some(info) = snapshot.license_info.as_ref().filter(|i| i.offline_mode) {
        line.push_str(&format!(
            " [offline, {} day(s) left]",
            info.offline_days_remaining.unwrap_or(0)
        ));
    }
    if snapshot.should_show_warning() {
        let level = match snapshot.warning_level {
            WarningLevel::Hours => "HOURS",
            _ => "DAYS",
        };
        line.push_str(&format!(" [warning: {level}]"));
    }
    line
}

/// Formats a duration as `Xd Yh`, `Xh Ym` or `Xm Ys`.
#[must_use]
pub fn human_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    let (days, hours, mins) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m {}s", secs % 60)
    }
}
