//! Licensing and activation for Ledgerly.
//!
//! This crate handles:
//! - Activation of license codes against the remote license authority
//! - Device binding through a stable device identifier
//! - Periodic local expiry checks with graduated warnings
//! - A short grace period after local expiry detection
//! - Offline validation of the cached record within a bounded trust window
//!
//! # Design Principles
//!
//! - **Unreachable is not invalid**: network failures fall back to the cache
//! - **Bounded offline trust**: a cached answer is honored for 7 days at most
//! - **Fail safe storage**: an unreadable cache means "not activated"
//! - **Single owner**: [`LicenseController`] mutates state, observers
//!   subscribe to [`LicenseSnapshot`]s
//!
//! # License Code Format
//!
//! Codes are three groups of four uppercase letters or digits:
//! `ABCD-1234-WXYZ`.
//!
//! # Example
//!
//! ```no_run
//! use ledgerly_license::{
//!     AuthorityConfig, HttpAuthority, LicenseConfig, LicenseController, MemoryStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = HttpAuthority::new(AuthorityConfig::default())?;
//! let controller = LicenseController::new(
//!     LicenseConfig::default(),
//!     Arc::new(authority),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let state = controller.initialize().await;
//! if !state.is_activated {
//!     let outcome = controller.activate("ABCD-1234-WXYZ").await;
//!     println!("activated: {}", outcome.success);
//! }
//! # Ok(())
//! # }
//! ```

mod clock;
mod code;
mod config;
mod controller;
mod device;
mod error;
mod offline;
mod record;
mod remote;
mod scheduler;
mod state;
mod store;
mod warning;

pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{LicenseCode, CODE_GROUPS, GROUP_LEN};
pub use config::{default_data_dir, AuthorityConfig, LicenseConfig, MAX_PERIOD_DAYS};
pub use controller::{LicenseController, INVALID_CODE_MESSAGE};
pub use device::{
    resolve_device_id, DeviceFingerprint, DeviceIdentity, FingerprintIdentity, StaticIdentity,
};
pub use error::{LicenseError, LicenseResult};
pub use offline::validate_offline;
pub use record::{CachedLicense, LicenseReason, LicenseRecord};
pub use remote::{LicenseAuthority, RemoteVerdict};
pub use scheduler::check_interval;
pub use state::{LicensePhase, LicenseSnapshot, OperationOutcome};
pub use store::{keys, EncryptedFileStore, LicenseCache, MemoryStore, SecureStore};
pub use warning::{warning_level, GracePeriod, WarningLevel, WarningThresholds};

#[cfg(feature = "online")]
pub use remote::HttpAuthority;
