//! License lifecycle controller.
//!
//! The controller is the single owner of license state. It activates codes,
//! revalidates against the authority (falling back to the offline validator
//! when the authority cannot be reached), derives warning levels, runs the
//! grace period after local expiry, and publishes a [`LicenseSnapshot`] to
//! observers after every change.
//!
//! Activation and validity are independent: a stored code always means
//! "activated", whatever the validation outcome.
//!
//! Overlapping triggers (scheduled check, foreground event, user refresh)
//! each take the state lock for a short synchronous update; the later write
//! wins.

use crate::clock::{Clock, SystemClock};
use crate::code::LicenseCode;
use crate::config::LicenseConfig;
use crate::device::{resolve_device_id, DeviceIdentity, FingerprintIdentity};
use crate::offline::validate_offline;
use crate::record::{CachedLicense, LicenseReason, LicenseRecord};
use crate::remote::{LicenseAuthority, RemoteVerdict};
use crate::scheduler::{check_interval, CheckScheduler};
use crate::state::{
    mark_expired, ControllerState, LicensePhase, LicenseSnapshot, OperationOutcome,
    RecordSource,
};
use crate::store::{LicenseCache, SecureStore};
use crate::warning::{warning_level, GracePeriod, WarningLevel, WarningThresholds};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shown when `activate` is given something that is not a license code.
pub const INVALID_CODE_MESSAGE: &str = "License codes look like XXXX-XXXX-XXXX.";

/// Handle to the license controller. Clones share the same state.
#[derive(Clone)]
pub struct LicenseController {
    inner: Arc<Inner>,
}

struct Inner {
    config: LicenseConfig,
    authority: Arc<dyn LicenseAuthority>,
    cache: LicenseCache,
    device: Arc<dyn DeviceIdentity>,
    clock: Arc<dyn Clock>,
    device_id: OnceCell<String>,
    state: RwLock<ControllerState>,
    updates: watch::Sender<LicenseSnapshot>,
    scheduler: CheckScheduler,
}

impl LicenseController {
    /// Creates a controller using the hardware fingerprint and system clock.
    #[must_use]
    pub fn new(
        config: LicenseConfig,
        authority: Arc<dyn LicenseAuthority>,
        store: Arc<dyn SecureStore>,
    ) -> Self {
        Self::with_parts(
            config,
            authority,
            store,
            Arc::new(FingerprintIdentity),
            Arc::new(SystemClock),
        )
    }

    /// Creates a controller from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: LicenseConfig,
        authority: Arc<dyn LicenseAuthority>,
        store: Arc<dyn SecureStore>,
        device: Arc<dyn DeviceIdentity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = ControllerState::default();
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Inner {
                config,
                authority,
                cache: LicenseCache::new(store),
                device,
                clock,
                device_id: OnceCell::new(),
                state: RwLock::new(state),
                updates,
                scheduler: CheckScheduler::default(),
            }),
        }
    }

    /// The timing policy in use.
    #[must_use]
    pub fn config(&self) -> &LicenseConfig {
        &self.inner.config
    }

    /// The current state.
    #[must_use]
    pub fn snapshot(&self) -> LicenseSnapshot {
        self.inner.updates.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LicenseSnapshot> {
        self.inner.updates.subscribe()
    }

    /// The identifier this device presents to the authority.
    pub async fn device_id(&self) -> String {
        self.inner.device_id().await.to_string()
    }

    /// Delay of the pending expiry check, if one is scheduled.
    #[must_use]
    pub fn next_check_in(&self) -> Option<Duration> {
        self.inner.scheduler.pending_delay()
    }

    /// Startup: loads the stored code and validates it.
    ///
    /// Remote validation is capped by the startup timeout; on failure or
    /// timeout the cached record is validated offline instead. An abandoned
    /// remote call is dropped and its result never applied.
    pub async fn initialize(&self) -> LicenseSnapshot {
        let inner = &self.inner;
        inner.update(|s| s.is_loading = true).await;

        let cached = inner.load_cache();
        match cached.as_ref().and_then(|c| c.code().cloned()) {
            None => {
                info!("No stored license code");
                inner
                    .update(|s| {
                        s.is_activated = false;
                        s.activation_confirmed = false;
                        s.record = None;
                        s.grace = None;
                        s.warning_level = WarningLevel::None;
                    })
                    .await;
            }
            Some(code) => {
                inner
                    .update(|s| {
                        s.is_activated = true;
                        s.activation_confirmed = true;
                    })
                    .await;

                let timeout = inner.config.startup_timeout();
                let device_id = inner.device_id().await.to_string();
                let remote =
                    tokio::time::timeout(timeout, inner.authority.validate(&code, &device_id))
                        .await;

                match remote {
                    Ok(Ok(verdict)) => {
                        inner.apply_verdict(code, verdict).await;
                    }
                    Ok(Err(e)) => {
                        warn!("Startup validation failed, using cached license: {e}");
                        inner.apply_offline(cached.as_ref(), &code).await;
                    }
                    Err(_) => {
                        warn!("Startup validation timed out after {timeout:?}, using cached license");
                        inner.apply_offline(cached.as_ref(), &code).await;
                    }
                }

                inner.check_expiration().await;
            }
        }

        let snapshot = inner
            .update(|s| {
                s.initialized = true;
                s.is_loading = false;
                s.snapshot()
            })
            .await;
        inner.reschedule();
        info!("License state after startup: {:?}", snapshot.phase);
        snapshot
    }

    /// Activates `code` on this device.
    ///
    /// Network and server failures are reported in the outcome, never as an
    /// error. A failed activation leaves the current state untouched.
    pub async fn activate(&self, code: &str) -> OperationOutcome {
        let code = match LicenseCode::parse(code) {
            Ok(code) => code,
            Err(e) => {
                debug!("Rejected license code input: {e}");
                return OperationOutcome::failed(None, INVALID_CODE_MESSAGE);
            }
        };

        let inner = &self.inner;
        info!("Activating license {}", code.masked());
        inner
            .update(|s| {
                s.activating = true;
                s.is_loading = true;
            })
            .await;

        let device_id = inner.device_id().await.to_string();
        let result = inner.authority.activate(&code, &device_id).await;
        let now = inner.clock.now();

        let verdict = match result {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Activation of {} failed: {e}", code.masked());
                inner.finish_activation().await;
                let reason = e.reason();
                return OperationOutcome::failed(Some(reason), reason.message());
            }
        };

        let record = verdict.into_record(code.clone());
        if !record.valid {
            warn!(
                "Activation of {} rejected: {}",
                code.masked(),
                record.reason.map_or("UNKNOWN", |r| r.code())
            );
            inner.finish_activation().await;
            let message = record
                .display_message()
                .unwrap_or_else(|| LicenseReason::ValidationError.message().to_string());
            return OperationOutcome::failed(record.reason, message);
        }

        inner.save_cache(&record, now);
        inner
            .update(move |s| {
                s.initialized = true;
                s.activating = false;
                s.is_loading = false;
                s.is_activated = true;
                s.activation_confirmed = false;
                s.record = Some(record);
                s.grace = None;
                s.grace_spent_for = None;
                s.warning_level = WarningLevel::None;
                s.warning_dismissed = false;
                s.grace_modal_dismissed = false;
                s.last_remote_check = Some(now);
            })
            .await;
        info!("License {} activated", code.masked());

        inner.check_expiration().await;
        inner.reschedule();
        OperationOutcome::succeeded()
    }

    /// Marks a fresh activation as acknowledged. Idempotent.
    pub async fn confirm_activation(&self) {
        self.inner
            .update(|s| {
                if s.is_activated {
                    s.activation_confirmed = true;
                }
            })
            .await;
    }

    /// Revalidates the stored code and returns the raw result.
    ///
    /// Falls back to offline validation when the authority cannot be reached.
    pub async fn refresh_license(&self) -> LicenseRecord {
        let inner = &self.inner;
        let cached = inner.load_cache();

        let code = match cached.as_ref().and_then(|c| c.code().cloned()) {
            Some(code) => Some(code),
            None => {
                // Activated this session but the cache write failed.
                let state = inner.state.read().await;
                state
                    .record
                    .as_ref()
                    .filter(|_| state.is_activated)
                    .and_then(|r| r.code.clone())
            }
        };
        let Some(code) = code else {
            debug!("Refresh requested without a stored license code");
            return LicenseRecord::invalid(None, LicenseReason::NoCode);
        };

        let device_id = inner.device_id().await.to_string();
        let record = match inner.authority.validate(&code, &device_id).await {
            Ok(verdict) => inner.apply_verdict(code, verdict).await,
            Err(e) => {
                if e.is_unreachable() {
                    info!("License authority unreachable, validating offline: {e}");
                } else {
                    warn!("License validation failed, validating offline: {e}");
                }
                inner.apply_offline(cached.as_ref(), &code).await
            }
        };

        inner.check_expiration().await;
        inner.reschedule();
        record
    }

    /// Removes the license from this device and resets all state.
    pub async fn remove_license(&self) -> OperationOutcome {
        let inner = &self.inner;
        inner.scheduler.cancel();
        let cleared = inner.cache.clear();

        inner
            .update(|s| {
                *s = ControllerState {
                    initialized: true,
                    ..ControllerState::default()
                };
            })
            .await;

        match cleared {
            Ok(()) => {
                info!("License removed");
                OperationOutcome::succeeded()
            }
            Err(e) => {
                warn!("License state reset but cache could not be cleared: {e}");
                OperationOutcome::failed(
                    Some(e.reason()),
                    "The saved license could not be deleted from this device.",
                )
            }
        }
    }

    /// Runs the local expiry check now and reschedules the next one.
    pub async fn check_now(&self) -> LicensePhase {
        let phase = self.inner.check_expiration().await;
        self.inner.reschedule();
        phase
    }

    /// Host application came to the foreground.
    ///
    /// Runs the local check immediately. If the last successful remote check
    /// is older than the revalidation interval, a revalidation is spawned and
    /// its handle returned; the caller need not await it.
    pub async fn on_foreground(&self) -> Option<JoinHandle<LicenseRecord>> {
        let inner = &self.inner;
        inner.check_expiration().await;
        inner.reschedule();

        let now = inner.clock.now();
        let revalidate_after = inner.config.revalidate_after();
        let due = {
            let state = inner.state.read().await;
            state.is_activated
                && state
                    .last_remote_check
                    .is_none_or(|last| now - last > revalidate_after)
        };
        if !due {
            return None;
        }

        debug!("Revalidating license after returning to foreground");
        let controller = self.clone();
        Some(tokio::spawn(async move { controller.refresh_license().await }))
    }

    /// Hides the pre-expiry banner.
    pub async fn dismiss_warning(&self) {
        self.inner.update(|s| s.warning_dismissed = true).await;
    }

    /// Hides the grace-period modal.
    pub async fn dismiss_grace_modal(&self) {
        self.inner.update(|s| s.grace_modal_dismissed = true).await;
    }

    /// Shows the grace-period modal again.
    pub async fn show_grace_modal(&self) {
        self.inner.update(|s| s.grace_modal_dismissed = false).await;
    }

    /// Cancels the pending expiry check.
    pub fn shutdown(&self) {
        self.inner.scheduler.cancel();
        debug!("License controller stopped");
    }
}

impl std::fmt::Debug for LicenseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseController")
            .field("config", &self.inner.config)
            .field("phase", &self.inner.updates.borrow().phase)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Mutates state and publishes the resulting snapshot.
    async fn update<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        let mut state = self.state.write().await;
        let out = f(&mut state);
        self.updates.send_replace(state.snapshot());
        out
    }

    /// Resolves the device id once, on the blocking pool: fingerprinting
    /// may spawn processes and the store does file IO.
    async fn device_id(&self) -> &str {
        self.device_id
            .get_or_init(|| async {
                let device = Arc::clone(&self.device);
                let store = Arc::clone(self.cache.store());
                tokio::task::spawn_blocking(move || {
                    resolve_device_id(device.as_ref(), store.as_ref())
                })
                .await
                .unwrap_or_else(|e| {
                    warn!("Device id resolution failed ({e}), using a random id");
                    format!("rnd-{}", uuid::Uuid::new_v4())
                })
            })
            .await
    }

    /// Reads the cache; unreadable storage counts as "nothing stored".
    fn load_cache(&self) -> Option<CachedLicense> {
        match self.cache.load() {
            Ok(cached) => cached,
            Err(e) => {
                warn!(
                    "License cache unreadable ({}), treating as not activated: {e}",
                    e.reason().code()
                );
                None
            }
        }
    }

    fn save_cache(&self, record: &LicenseRecord, now: DateTime<Utc>) {
        if let Err(e) = self.cache.save(&CachedLicense::new(record.clone(), now)) {
            warn!("Failed to cache license record: {e}");
        }
    }

    /// Applies an authority answer. Every answer, valid or not, is cached.
    async fn apply_verdict(&self, code: LicenseCode, verdict: RemoteVerdict) -> LicenseRecord {
        let now = self.clock.now();
        let masked = code.masked();
        let record = verdict.into_record(code);
        self.save_cache(&record, now);

        match (record.valid, record.end_date, record.reason) {
            (true, Some(end), _) => info!("License {masked} valid until {end}"),
            (_, _, reason) => warn!(
                "License {masked} rejected: {}",
                reason.map_or("UNKNOWN", |r| r.code())
            ),
        }

        let applied = record.clone();
        self.update(move |s| {
            s.last_remote_check = Some(now);
            s.apply_record(applied, now, RecordSource::Authority);
        })
        .await;
        record
    }

    /// Validates the cached record offline. The result is not written back,
    /// so the trust window keeps counting from the last authority answer.
    async fn apply_offline(
        &self,
        cached: Option<&CachedLicense>,
        code: &LicenseCode,
    ) -> LicenseRecord {
        let now = self.clock.now();
        let record = validate_offline(cached, Some(code), now, self.config.offline_trust_window());

        if record.valid {
            info!(
                "Using cached license offline, {} day(s) of offline use left",
                record.offline_days_remaining.unwrap_or(0)
            );
        } else {
            warn!(
                "Offline validation failed: {}",
                record.reason.map_or("UNKNOWN", |r| r.code())
            );
        }

        let applied = record.clone();
        self.update(move |s| s.apply_record(applied, now, RecordSource::Cache))
            .await;
        record
    }

    /// The periodic local check: warning level, grace entry and grace expiry.
    async fn check_expiration(&self) -> LicensePhase {
        let now = self.clock.now();
        let thresholds = self.config.warning_thresholds();
        let grace_length = self.config.grace_period();

        self.update(|s| {
            if s.is_valid() {
                evaluate_expiry(s, now, thresholds, grace_length);
            }
            s.phase()
        })
        .await
    }

    /// Replaces the pending check with one matching the current state.
    fn reschedule(self: &Arc<Self>) {
        let (active, delay) = {
            let snapshot = self.updates.borrow();
            (
                snapshot.is_valid,
                check_interval(
                    &self.config,
                    snapshot.warning_level,
                    snapshot.is_in_grace_period,
                ),
            )
        };

        if !active {
            self.scheduler.cancel();
            return;
        }

        let weak = Arc::downgrade(self);
        self.scheduler.schedule(delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.check_expiration().await;
                inner.reschedule();
            }
        });
        debug!("Next expiry check in {delay:?}");
    }

    async fn finish_activation(&self) {
        self.update(|s| {
            s.activating = false;
            s.is_loading = false;
        })
        .await;
    }
}

/// One local expiry evaluation on a valid license.
fn evaluate_expiry(
    s: &mut ControllerState,
    now: DateTime<Utc>,
    thresholds: WarningThresholds,
    grace_length: ChronoDuration,
) {
    if let Some(grace) = s.grace {
        if grace.has_elapsed(now) {
            info!("Grace period ended at {}, license blocked", grace.ends_at());
            s.grace = None;
            s.warning_level = WarningLevel::Expired;
            if let Some(record) = s.record.as_mut() {
                s.grace_spent_for = record.end_date;
                mark_expired(record);
            }
        }
        return;
    }

    let Some(end) = s.record.as_ref().and_then(|r| r.end_date) else {
        return;
    };

    match warning_level(end, now, thresholds) {
        WarningLevel::Expired if s.grace_spent(end) => {
            info!("License expired at {end} and its grace period is used up, license blocked");
            s.warning_level = WarningLevel::Expired;
            if let Some(record) = s.record.as_mut() {
                mark_expired(record);
            }
        }
        WarningLevel::Expired => {
            let grace = GracePeriod::start(now, grace_length);
            info!(
                "License expired at {end}, grace period until {}",
                grace.ends_at()
            );
            s.grace = Some(grace);
            s.warning_level = WarningLevel::Expired;
            s.warning_dismissed = false;
            s.grace_modal_dismissed = false;
        }
        level => {
            if level != s.warning_level {
                info!("Expiry warning level {:?} -> {level:?}", s.warning_level);
            }
            s.warning_level = level;
        }
    }
}
