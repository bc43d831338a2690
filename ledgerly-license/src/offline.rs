//! Offline validation against the cached license record.
//!
//! When the license authority is unreachable the last cached record is
//! trusted for a bounded window (7 days by default). Checks run in order and
//! the first failure decides the result:
//!
//! 1. nothing cached → `NO_CACHE`
//! 2. cached code differs from the expected code → `CODE_MISMATCH`
//! 3. cache older than the trust window → `CACHE_EXPIRED`
//! 4. cached end date in the past → `LICENSE_EXPIRED`
//! 5. cached record was itself invalid → its stored reason
//!
//! Otherwise the record is valid in offline mode, with the whole days of
//! trust left attached for display.

use crate::code::LicenseCode;
use crate::record::{CachedLicense, LicenseReason, LicenseRecord};
use chrono::{DateTime, Duration, Utc};

/// Validates a cached record without network access.
///
/// Pure given its inputs: `now` and `trust_window` are passed in.
#[must_use]
pub fn validate_offline(
    cached: Option<&CachedLicense>,
    expected_code: Option<&LicenseCode>,
    now: DateTime<Utc>,
    trust_window: Duration,
) -> LicenseRecord {
    let Some(cached) = cached else {
        return LicenseRecord::invalid(expected_code.cloned(), LicenseReason::NoCache);
    };

    if let Some(expected) = expected_code
        && cached.code() != Some(expected)
    {
        return LicenseRecord::invalid(Some(expected.clone()), LicenseReason::CodeMismatch);
    }

    let code = cached.code().cloned();
    let end_date = cached.record.end_date;

    // A cache stamped in the future counts as fresh, never as extra trust.
    let since_cache = (now - cached.cached_at).max(Duration::zero());
    if since_cache > trust_window {
        return LicenseRecord::invalid(code, LicenseReason::CacheExpired).with_end_date(end_date);
    }

    let Some(end) = end_date else {
        let reason = cached.record.reason.unwrap_or(LicenseReason::CacheError);
        return LicenseRecord::invalid(code, reason);
    };

    if end < now {
        return LicenseRecord::invalid(code, LicenseReason::LicenseExpired).with_end_date(end_date);
    }

    if !cached.record.valid {
        let reason = cached.record.reason.unwrap_or(LicenseReason::ValidationError);
        return LicenseRecord::invalid(code, reason)
            .with_end_date(end_date)
            .with_message(cached.record.message.clone());
    }

    let days_remaining = (trust_window - since_cache).num_days().max(0);

    LicenseRecord {
        code,
        valid: true,
        end_date: Some(end),
        reason: None,
        message: None,
        offline_mode: true,
        offline_days_remaining: Some(u32::try_from(days_remaining).unwrap_or(u32::MAX)),
    }
}
