//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ledgerly_license::{
    CachedLicense, LicenseAuthority, LicenseCache, LicenseCode, LicenseConfig, LicenseController,
    LicenseError, LicenseRecord, LicenseResult, ManualClock, MemoryStore, RemoteVerdict,
    SecureStore, StaticIdentity,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CODE: &str = "ABCD-1234-WXYZ";
pub const OTHER_CODE: &str = "QRST-5678-MNOP";
pub const DEVICE: &str = "dev-test-device";

/// Fixed starting instant for every test clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn code() -> LicenseCode {
    LicenseCode::parse(CODE).unwrap()
}

pub fn other_code() -> LicenseCode {
    LicenseCode::parse(OTHER_CODE).unwrap()
}

/// What the fake authority does when called.
#[derive(Debug, Clone)]
pub enum Script {
    Answer(RemoteVerdict),
    Fail,
    Hang,
}

/// A license authority driven by scripts.
pub struct FakeAuthority {
    activate: Mutex<Script>,
    validate: Mutex<Script>,
    delay: Mutex<Option<std::time::Duration>>,
    pub activate_calls: AtomicUsize,
    pub validate_calls: AtomicUsize,
    pub last_device_id: Mutex<Option<String>>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            activate: Mutex::new(Script::Fail),
            validate: Mutex::new(Script::Fail),
            delay: Mutex::new(None),
            activate_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            last_device_id: Mutex::new(None),
        }
    }

    pub fn on_activate(&self, script: Script) {
        *self.activate.lock().unwrap() = script;
    }

    pub fn on_validate(&self, script: Script) {
        *self.validate.lock().unwrap() = script;
    }

    /// Delays every answer by `delay` (Tokio time).
    pub fn with_delay(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn activate_count(&self) -> usize {
        self.activate_calls.load(Ordering::SeqCst)
    }

    pub fn validate_count(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    async fn run(&self, script: Script, device_id: &str) -> LicenseResult<RemoteVerdict> {
        *self.last_device_id.lock().unwrap() = Some(device_id.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match script {
            Script::Answer(verdict) => Ok(verdict),
            Script::Fail => Err(LicenseError::Network("connection refused".to_string())),
            Script::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl LicenseAuthority for FakeAuthority {
    async fn activate(&self, _code: &LicenseCode, device_id: &str) -> LicenseResult<RemoteVerdict> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.activate.lock().unwrap().clone();
        self.run(script, device_id).await
    }

    async fn validate(&self, _code: &LicenseCode, device_id: &str) -> LicenseResult<RemoteVerdict> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.validate.lock().unwrap().clone();
        self.run(script, device_id).await
    }
}

/// A controller wired to fakes.
pub struct Harness {
    pub controller: LicenseController,
    pub authority: Arc<FakeAuthority>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LicenseConfig::default())
    }

    pub fn with_config(config: LicenseConfig) -> Self {
        let authority = Arc::new(FakeAuthority::new());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let controller = LicenseController::with_parts(
            config,
            authority.clone(),
            store.clone(),
            Arc::new(StaticIdentity(DEVICE.to_string())),
            clock.clone(),
        );
        Self {
            controller,
            authority,
            store,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        ledgerly_license::Clock::now(self.clock.as_ref())
    }

    pub fn cache(&self) -> LicenseCache {
        let store: Arc<dyn SecureStore> = self.store.clone();
        LicenseCache::new(store)
    }

    /// Stores a valid record for [`CODE`] ending at `end`, cached at `cached_at`.
    pub fn seed_valid(&self, end: DateTime<Utc>, cached_at: DateTime<Utc>) {
        let record = LicenseRecord::valid(code(), end);
        self.cache()
            .save(&CachedLicense::new(record, cached_at))
            .unwrap();
    }

    pub fn cached(&self) -> Option<CachedLicense> {
        self.cache().load().unwrap()
    }

    /// Activates [`CODE`] with a license ending `valid_for` from now.
    pub async fn activate_for(&self, valid_for: Duration) {
        let end = self.now() + valid_for;
        self.authority
            .on_activate(Script::Answer(RemoteVerdict::valid_until(end)));
        let outcome = self.controller.activate(CODE).await;
        assert!(outcome.success, "activation failed: {outcome:?}");
    }
}
