//! Observable license state.

use crate::record::{LicenseReason, LicenseRecord};
use crate::warning::{GracePeriod, WarningLevel};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Where the license lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicensePhase {
    /// Startup has not finished.
    Uninitialized,
    /// No license code is stored.
    NoLicense,
    /// An activation request is in flight.
    Activating,
    /// Activated and valid.
    Valid,
    /// Expired locally, still honored until the grace period ends.
    GracePeriod,
    /// Activated but not usable.
    Blocked,
}

/// What observers see. Published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSnapshot {
    pub phase: LicensePhase,
    pub is_valid: bool,
    pub is_activated: bool,
    /// The user acknowledged a fresh activation.
    pub activation_confirmed: bool,
    pub is_loading: bool,
    pub license_info: Option<LicenseRecord>,
    pub warning_level: WarningLevel,
    pub is_in_grace_period: bool,
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    pub is_warning_dismissed: bool,
    pub is_grace_modal_dismissed: bool,
    /// Last time the authority answered.
    pub last_remote_check: Option<DateTime<Utc>>,
}

impl LicenseSnapshot {
    /// True when a pre-expiry banner should be visible.
    #[must_use]
    pub fn should_show_warning(&self) -> bool {
        self.is_valid
            && !self.is_in_grace_period
            && self.warning_level.is_pre_expiry()
            && !self.is_warning_dismissed
    }

    /// True when the grace-period modal should be visible.
    #[must_use]
    pub fn should_show_grace_modal(&self) -> bool {
        self.is_in_grace_period && !self.is_grace_modal_dismissed
    }

    /// Countdown for the grace period, clamped at zero.
    #[must_use]
    pub fn grace_time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.grace_period_ends_at
            .map(|ends| (ends - now).max(Duration::zero()))
    }

    /// Time until the license end date, negative once past.
    #[must_use]
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.license_info
            .as_ref()
            .and_then(|r| r.end_date)
            .map(|end| end - now)
    }

    /// Reason the license is not usable, if it is not.
    #[must_use]
    pub fn block_reason(&self) -> Option<LicenseReason> {
        if self.is_valid {
            None
        } else {
            self.license_info.as_ref().and_then(|r| r.reason)
        }
    }
}

/// Result of a user-initiated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<LicenseReason>,
}

impl OperationOutcome {
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            message: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn failed(reason: Option<LicenseReason>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            reason,
        }
    }
}

/// Where a record applied to the state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordSource {
    Authority,
    Cache,
}

/// Mutable controller state. Only the controller touches this.
#[derive(Debug, Default)]
pub(crate) struct ControllerState {
    pub initialized: bool,
    pub activating: bool,
    pub is_loading: bool,
    pub is_activated: bool,
    pub activation_confirmed: bool,
    pub record: Option<LicenseRecord>,
    pub warning_level: WarningLevel,
    pub grace: Option<GracePeriod>,
    /// End date whose grace period has already run out.
    pub grace_spent_for: Option<DateTime<Utc>>,
    pub warning_dismissed: bool,
    pub grace_modal_dismissed: bool,
    pub last_remote_check: Option<DateTime<Utc>>,
}

impl ControllerState {
    pub fn is_valid(&self) -> bool {
        self.is_activated && self.record.as_ref().is_some_and(|r| r.valid)
    }

    pub fn phase(&self) -> LicensePhase {
        if self.activating {
            LicensePhase::Activating
        } else if !self.initialized {
            LicensePhase::Uninitialized
        } else if !self.is_activated {
            LicensePhase::NoLicense
        } else if self.grace.is_some() {
            LicensePhase::GracePeriod
        } else if self.is_valid() {
            LicensePhase::Valid
        } else {
            LicensePhase::Blocked
        }
    }

    /// Applies a record from the authority or the offline validator.
    ///
    /// A renewal (end date in the future) ends a running grace period. An
    /// unchanged past end date leaves it running with its original deadline.
    /// An offline `LICENSE_EXPIRED` during grace is ignored: the grace
    /// deadline already covers that expiry. A valid record whose past end
    /// date already used up its grace period is applied as expired.
    pub fn apply_record(
        &mut self,
        mut record: LicenseRecord,
        now: DateTime<Utc>,
        source: RecordSource,
    ) {
        self.is_activated = true;

        if record.valid {
            match record.end_date {
                Some(end) if end > now => {
                    self.grace = None;
                    self.grace_spent_for = None;
                }
                Some(end) if self.grace.is_none() && self.grace_spent(end) => {
                    mark_expired(&mut record);
                    self.warning_level = WarningLevel::Expired;
                }
                _ => {}
            }
        } else if self.grace.is_some()
            && source == RecordSource::Cache
            && record.reason == Some(LicenseReason::LicenseExpired)
        {
            return;
        } else {
            self.grace = None;
            self.warning_level = if record.reason == Some(LicenseReason::LicenseExpired) {
                WarningLevel::Expired
            } else {
                WarningLevel::None
            };
        }

        self.record = Some(record);
    }

    /// True when `end` is covered by a grace period that already ran out.
    pub fn grace_spent(&self, end: DateTime<Utc>) -> bool {
        self.grace_spent_for.is_some_and(|spent| end <= spent)
    }

    pub fn snapshot(&self) -> LicenseSnapshot {
        LicenseSnapshot {
            phase: self.phase(),
            is_valid: self.is_valid(),
            is_activated: self.is_activated,
            activation_confirmed: self.activation_confirmed,
            is_loading: self.is_loading,
            license_info: self.record.clone(),
            warning_level: self.warning_level,
            is_in_grace_period: self.grace.is_some(),
            grace_period_ends_at: self.grace.map(|g| g.ends_at()),
            is_warning_dismissed: self.warning_dismissed,
            is_grace_modal_dismissed: self.grace_modal_dismissed,
            last_remote_check: self.last_remote_check,
        }
    }
}

/// Turns `record` into a `LICENSE_EXPIRED` block, keeping code and dates.
pub(crate) fn mark_expired(record: &mut LicenseRecord) {
    record.valid = false;
    record.reason = Some(LicenseReason::LicenseExpired);
    record.message = Some(LicenseReason::LicenseExpired.message().to_string());
    record.offline_mode = false;
    record.offline_days_remaining = None;
}
