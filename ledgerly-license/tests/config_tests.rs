mod common;

use chrono::Duration;
use common::Harness;
use ledgerly_license::{LicenseConfig, LicenseError, LicensePhase, MAX_PERIOD_DAYS};
use pretty_assertions::assert_eq;

fn max_period() -> Duration {
    Duration::days(i64::from(MAX_PERIOD_DAYS))
}

#[test]
fn defaults_are_valid() {
    assert!(LicenseConfig::default().validate().is_ok());
}

#[test]
fn huge_revalidate_interval_is_clamped() {
    let config = LicenseConfig {
        revalidate_after_secs: 10_000_000_000_000_000,
        ..LicenseConfig::default()
    };

    assert_eq!(config.revalidate_after(), max_period());
    let err = config.validate().unwrap_err();
    assert!(matches!(err, LicenseError::InvalidConfig(_)));
    assert!(err.to_string().contains("revalidate_after_secs"));
}

#[test]
fn max_grace_period_stays_positive() {
    let config = LicenseConfig {
        grace_period_secs: u64::MAX,
        ..LicenseConfig::default()
    };

    assert_eq!(config.grace_period(), max_period());
    assert!(config.validate().unwrap_err().to_string().contains("grace_period_secs"));
}

#[test]
fn day_and_hour_settings_are_clamped() {
    let config = LicenseConfig {
        offline_trust_days: u32::MAX,
        days_warning_threshold: u32::MAX,
        hours_warning_threshold: u32::MAX,
        ..LicenseConfig::default()
    };

    assert_eq!(config.offline_trust_window(), max_period());
    let thresholds = config.warning_thresholds();
    assert_eq!(thresholds.days, max_period());
    assert_eq!(thresholds.hours, max_period());
    assert!(config.validate().is_err());
}

#[test]
fn zero_check_interval_is_rejected() {
    let config = LicenseConfig {
        grace_check_interval_secs: 0,
        ..LicenseConfig::default()
    };

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("grace_check_interval_secs"));
}

#[test]
fn limits_are_inclusive() {
    let config = LicenseConfig {
        grace_period_secs: u64::from(MAX_PERIOD_DAYS) * 86_400,
        offline_trust_days: MAX_PERIOD_DAYS,
        hours_warning_threshold: MAX_PERIOD_DAYS * 24,
        ..LicenseConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn controller_survives_out_of_range_grace() {
    let h = Harness::with_config(LicenseConfig {
        grace_period_secs: u64::MAX,
        ..LicenseConfig::default()
    });
    h.controller.initialize().await;
    h.activate_for(Duration::minutes(1)).await;
    h.clock.advance(Duration::minutes(2));

    assert_eq!(h.controller.check_now().await, LicensePhase::GracePeriod);
    let snap = h.controller.snapshot();
    assert_eq!(snap.grace_period_ends_at, Some(h.now() + max_period()));
}
