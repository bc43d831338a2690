//! Error types for the licensing module.

use crate::record::LicenseReason;
use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// License code does not match `XXXX-XXXX-XXXX`.
    #[error("invalid license code format: {0}")]
    InvalidCodeFormat(String),

    /// Network error while talking to the license authority.
    #[error("network error: {0}")]
    Network(String),

    /// The license authority did not answer in time.
    #[error("license authority timed out")]
    Timeout,

    /// The license authority answered with an unusable response.
    #[error("license authority error (status {status}): {message}")]
    Remote {
        /// HTTP status code, or 0 when not applicable.
        status: u16,
        /// Body or description of the failure.
        message: String,
    },

    /// Secure storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored data failed authentication (wrong key or modified on disk).
    #[error("stored license data was tampered with or is unreadable")]
    Tampered,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device identifier could not be determined.
    #[error("device identity unavailable: {0}")]
    DeviceIdentity(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[cfg(feature = "online")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LicenseError {
    /// Maps this error onto the reason code reported to callers.
    ///
    /// Errors originating in local storage become `CACHE_ERROR`; everything
    /// else is reported as `VALIDATION_ERROR`.
    #[must_use]
    pub fn reason(&self) -> LicenseReason {
        match self {
            Self::Storage(_) | Self::Tampered | Self::Serialization(_) | Self::Io(_) => {
                LicenseReason::CacheError
            }
            _ => LicenseReason::ValidationError,
        }
    }

    /// Returns true if the authority could not be reached at all.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            #[cfg(feature = "online")]
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
