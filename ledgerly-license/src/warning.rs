//! Expiry warning levels and the post-expiry grace period.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How urgently the user should be told about the coming expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningLevel {
    /// Nothing to show.
    #[default]
    None,
    /// Expiry within the day threshold (3 days by default).
    Days,
    /// Expiry within the hour threshold (24 hours by default).
    Hours,
    /// Past the end date, running on grace.
    Expired,
}

impl WarningLevel {
    /// Returns true for the levels that show a pre-expiry banner.
    #[must_use]
    pub fn is_pre_expiry(&self) -> bool {
        matches!(self, Self::Days | Self::Hours)
    }
}

/// Thresholds used by [`warning_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningThresholds {
    /// Remaining time at or below which the level is `DAYS`.
    pub days: Duration,
    /// Remaining time at or below which the level is `HOURS`.
    pub hours: Duration,
}

impl Default for WarningThresholds {
    fn default() -> Self {
        Self {
            days: Duration::days(3),
            hours: Duration::hours(24),
        }
    }
}

/// Classifies the time left until `end_date`.
///
/// `EXPIRED` once `end_date <= now`, `HOURS` when at most the hour threshold
/// is left, `DAYS` when at most the day threshold is left, `NONE` otherwise.
#[must_use]
pub fn warning_level(
    end_date: DateTime<Utc>,
    now: DateTime<Utc>,
    thresholds: WarningThresholds,
) -> WarningLevel {
    let left = end_date - now;
    if left <= Duration::zero() {
        WarningLevel::Expired
    } else if left <= thresholds.hours {
        WarningLevel::Hours
    } else if left <= thresholds.days {
        WarningLevel::Days
    } else {
        WarningLevel::None
    }
}

/// A running grace period. `ends_at` never moves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GracePeriod {
    started_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl GracePeriod {
    /// Starts a grace period of `length` at `now`.
    #[must_use]
    pub fn start(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            started_at: now,
            ends_at: now + length,
        }
    }

    /// When grace began.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When grace ends.
    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    /// True once `now` has reached the end.
    #[must_use]
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    /// Time left, clamped at zero.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.ends_at - now).max(Duration::zero())
    }
}
