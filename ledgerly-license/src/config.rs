//! Tunables for license enforcement and the remote authority.

use crate::error::{LicenseError, LicenseResult};
use crate::warning::WarningThresholds;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest period any setting may express, in days.
pub const MAX_PERIOD_DAYS: u32 = 3650;

const MAX_PERIOD_SECS: u64 = MAX_PERIOD_DAYS as u64 * 86_400;
const MAX_PERIOD_HOURS: u32 = MAX_PERIOD_DAYS * 24;

/// Timing policy for the license controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Cap on the remote validation performed at startup (ms).
    pub startup_timeout_ms: u64,
    /// Local re-check interval in normal operation (seconds).
    pub check_interval_secs: u64,
    /// Local re-check interval when less than a day is left (seconds).
    pub hours_check_interval_secs: u64,
    /// Local re-check interval during the grace period (seconds).
    pub grace_check_interval_secs: u64,
    /// Length of the grace period after local expiry detection (seconds).
    pub grace_period_secs: u64,
    /// How long a cached validation may be trusted without network (days).
    pub offline_trust_days: u32,
    /// Minimum time between remote revalidations on foreground (seconds).
    pub revalidate_after_secs: u64,
    /// Days before expiry at which the `DAYS` warning starts.
    pub days_warning_threshold: u32,
    /// Hours before expiry at which the `HOURS` warning starts.
    pub hours_warning_threshold: u32,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 5_000,
            check_interval_secs: 5 * 60,
            hours_check_interval_secs: 60,
            grace_check_interval_secs: 20,
            grace_period_secs: 15 * 60,
            offline_trust_days: 7,
            revalidate_after_secs: 60 * 60,
            days_warning_threshold: 3,
            hours_warning_threshold: 24,
        }
    }
}

impl LicenseConfig {
    /// Rejects settings the controller cannot honor.
    ///
    /// Re-check intervals must be non-zero and every period must fit within
    /// [`MAX_PERIOD_DAYS`]. The accessors clamp, so an unvalidated config
    /// still never panics.
    pub fn validate(&self) -> LicenseResult<()> {
        let intervals = [
            ("check_interval_secs", self.check_interval_secs),
            ("hours_check_interval_secs", self.hours_check_interval_secs),
            ("grace_check_interval_secs", self.grace_check_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(LicenseError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }

        let periods = [
            ("grace_period_secs", self.grace_period_secs, MAX_PERIOD_SECS),
            ("revalidate_after_secs", self.revalidate_after_secs, MAX_PERIOD_SECS),
            ("offline_trust_days", self.offline_trust_days.into(), MAX_PERIOD_DAYS.into()),
            ("days_warning_threshold", self.days_warning_threshold.into(), MAX_PERIOD_DAYS.into()),
            ("hours_warning_threshold", self.hours_warning_threshold.into(), MAX_PERIOD_HOURS.into()),
        ];
        for (name, value, max) in periods {
            if value > max {
                return Err(LicenseError::InvalidConfig(format!(
                    "{name} is {value}, the maximum is {max}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    #[must_use]
    pub fn hours_check_interval(&self) -> Duration {
        Duration::from_secs(self.hours_check_interval_secs)
    }

    #[must_use]
    pub fn grace_check_interval(&self) -> Duration {
        Duration::from_secs(self.grace_check_interval_secs)
    }

    #[must_use]
    pub fn grace_period(&self) -> chrono::Duration {
        clamped_secs(self.grace_period_secs)
    }

    #[must_use]
    pub fn offline_trust_window(&self) -> chrono::Duration {
        clamped_days(self.offline_trust_days)
    }

    #[must_use]
    pub fn revalidate_after(&self) -> chrono::Duration {
        clamped_secs(self.revalidate_after_secs)
    }

    /// Warning thresholds derived from the day/hour settings.
    #[must_use]
    pub fn warning_thresholds(&self) -> WarningThresholds {
        WarningThresholds {
            days: clamped_days(self.days_warning_threshold),
            hours: chrono::Duration::hours(i64::from(
                self.hours_warning_threshold.min(MAX_PERIOD_HOURS),
            )),
        }
    }
}

fn clamped_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs.min(MAX_PERIOD_SECS)).unwrap_or_default())
}

fn clamped_days(days: u32) -> chrono::Duration {
    chrono::Duration::days(i64::from(days.min(MAX_PERIOD_DAYS)))
}

/// Where and how to reach the license authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base URL of the license service (e.g. `https://api.ledgerly.app`).
    pub base_url: String,
    /// API key sent as `apikey` and bearer token, if the service needs one.
    pub api_key: Option<String>,
    /// Per-request timeout (seconds).
    pub request_timeout_secs: u64,
    /// Path of the activation endpoint.
    pub activate_path: String,
    /// Path of the validation endpoint.
    pub validate_path: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.ledgerly.app".to_string(),
            api_key: None,
            request_timeout_secs: 15,
            activate_path: "/rpc/activate_license".to_string(),
            validate_path: "/rpc/validate_license".to_string(),
        }
    }
}

impl AuthorityConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Default directory for Ledgerly's local license data.
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("ledgerly"))
}
