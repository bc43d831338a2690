//! License records as persisted and reported to callers.

use crate::code::LicenseCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a license is not currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseReason {
    /// No license code has been stored on this device.
    NoCode,
    /// Offline validation was requested but nothing is cached.
    NoCache,
    /// The cached record belongs to a different code.
    CodeMismatch,
    /// The cached record is older than the offline trust window.
    CacheExpired,
    /// The license end date has passed.
    LicenseExpired,
    /// The license was blocked by the issuer.
    LicenseBlocked,
    /// The license is bound to a different device.
    DeviceMismatch,
    /// The license could not be validated.
    ValidationError,
    /// Local license storage could not be read or written.
    CacheError,
}

impl LicenseReason {
    /// Every reason, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::NoCode,
        Self::NoCache,
        Self::CodeMismatch,
        Self::CacheExpired,
        Self::LicenseExpired,
        Self::LicenseBlocked,
        Self::DeviceMismatch,
        Self::ValidationError,
        Self::CacheError,
    ];

    /// Returns the wire code (`LICENSE_EXPIRED`, ...).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCode => "NO_CODE",
            Self::NoCache => "NO_CACHE",
            Self::CodeMismatch => "CODE_MISMATCH",
            Self::CacheExpired => "CACHE_EXPIRED",
            Self::LicenseExpired => "LICENSE_EXPIRED",
            Self::LicenseBlocked => "LICENSE_BLOCKED",
            Self::DeviceMismatch => "DEVICE_MISMATCH",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::CacheError => "CACHE_ERROR",
        }
    }

    /// Parses a wire code sent by the license authority.
    ///
    /// Unknown codes map to [`LicenseReason::ValidationError`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(code.trim()))
            .unwrap_or(Self::ValidationError)
    }

    /// Human-readable explanation shown to the user.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoCode => "No license code has been entered on this device.",
            Self::NoCache => "No saved license was found. Connect to the internet to validate.",
            Self::CodeMismatch => "The saved license does not match the entered code.",
            Self::CacheExpired => {
                "The license has not been verified for too long. Connect to the internet to continue."
            }
            Self::LicenseExpired => "The license has expired. Please renew to continue.",
            Self::LicenseBlocked => "The license has been blocked. Contact support.",
            Self::DeviceMismatch => "The license is already in use on another device.",
            Self::ValidationError => {
                "The license could not be validated. Check your connection and try again."
            }
            Self::CacheError => "The saved license could not be read. Please activate again.",
        }
    }
}

/// The last known state of a license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// License code this record describes, if one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<LicenseCode>,
    /// Whether the license currently permits use.
    pub valid: bool,
    /// License expiry. Always present when `valid` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Why the license is invalid. Present when `valid` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<LicenseReason>,
    /// Human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when this record was produced from the local cache.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub offline_mode: bool,
    /// Whole days of offline trust left, set together with `offline_mode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_days_remaining: Option<u32>,
}

impl LicenseRecord {
    /// A valid record expiring at `end_date`.
    #[must_use]
    pub fn valid(code: LicenseCode, end_date: DateTime<Utc>) -> Self {
        Self {
            code: Some(code),
            valid: true,
            end_date: Some(end_date),
            reason: None,
            message: None,
            offline_mode: false,
            offline_days_remaining: None,
        }
    }

    /// An invalid record carrying `reason` and its default message.
    #[must_use]
    pub fn invalid(code: Option<LicenseCode>, reason: LicenseReason) -> Self {
        Self {
            code,
            valid: false,
            end_date: None,
            reason: Some(reason),
            message: Some(reason.message().to_string()),
            offline_mode: false,
            offline_days_remaining: None,
        }
    }

    /// Keeps the end date on an invalid record (useful for display).
    #[must_use]
    pub fn with_end_date(mut self, end_date: Option<DateTime<Utc>>) -> Self {
        self.end_date = end_date;
        self
    }

    /// Replaces the message, if one is given.
    #[must_use]
    pub fn with_message(mut self, message: Option<String>) -> Self {
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            self.message = Some(message);
        }
        self
    }

    /// The message to show the user: explicit message, else the reason text.
    #[must_use]
    pub fn display_message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.reason.map(|r| r.message().to_string()))
    }
}

/// A license record as persisted in secure storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLicense {
    /// The persisted record. Its `code` is the device's stored license code.
    #[serde(flatten)]
    pub record: LicenseRecord,
    /// When the record was written.
    pub cached_at: DateTime<Utc>,
}

impl CachedLicense {
    /// Stamps `record` with the time it is being cached.
    #[must_use]
    pub fn new(record: LicenseRecord, cached_at: DateTime<Utc>) -> Self {
        Self { record, cached_at }
    }

    /// The stored license code.
    #[must_use]
    pub fn code(&self) -> Option<&LicenseCode> {
        self.record.code.as_ref()
    }
}
