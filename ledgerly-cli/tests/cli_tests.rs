use chrono::{Duration, TimeZone, Utc};
use ledgerly_cli::{
    describe, human_duration, open_store, resolve_data_dir, store_key_material, FileConfig,
    Overrides, INSTALL_ID_FILE,
};
use ledgerly_license::{
    keys, LicenseCode, LicenseConfig, LicensePhase, LicenseReason, LicenseRecord,
    LicenseSnapshot, SecureStore, WarningLevel,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tempfile::TempDir;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn snapshot(phase: LicensePhase) -> LicenseSnapshot {
    LicenseSnapshot {
        phase,
        is_valid: matches!(phase, LicensePhase::Valid | LicensePhase::GracePeriod),
        is_activated: !matches!(phase, LicensePhase::NoLicense | LicensePhase::Uninitialized),
        activation_confirmed: true,
        is_loading: false,
        license_info: None,
        warning_level: WarningLevel::None,
        is_in_grace_period: phase == LicensePhase::GracePeriod,
        grace_period_ends_at: None,
        is_warning_dismissed: false,
        is_grace_modal_dismissed: false,
        last_remote_check: None,
    }
}

// ── Config ───────────────────────────────────────────────────────

#[test]
fn no_config_file_means_defaults() {
    assert_eq!(FileConfig::load(None).unwrap(), FileConfig::default());
}

#[test]
fn config_file_is_partial() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledgerly.json");
    std::fs::write(
        &path,
        r#"{ "license": { "grace_period_secs": 60 }, "authority": { "api_key": "k" } }"#,
    )
    .unwrap();

    let config = FileConfig::load(Some(path.as_path())).unwrap();

    assert_eq!(config.license.grace_period_secs, 60);
    assert_eq!(config.license.check_interval_secs, LicenseConfig::default().check_interval_secs);
    assert_eq!(config.authority.api_key.as_deref(), Some("k"));
}

#[test]
fn bad_config_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{").unwrap();

    let err = FileConfig::load(Some(path.as_path())).unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"));

    let missing = FileConfig::load(Some(dir.path().join("nope.json").as_path())).unwrap_err();
    assert!(format!("{missing:#}").contains("nope.json"));
}

#[test]
fn out_of_range_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    for (name, body) in [
        ("revalidate.json", r#"{ "license": { "revalidate_after_secs": 10000000000000000 } }"#),
        ("grace.json", r#"{ "license": { "grace_period_secs": 18446744073709551615 } }"#),
        ("interval.json", r#"{ "license": { "check_interval_secs": 0 } }"#),
    ] {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();

        let err = FileConfig::load(Some(path.as_path())).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains(name), "{msg}");
        assert!(msg.contains("invalid configuration"), "{msg}");
    }
}

#[test]
fn flags_override_file() {
    let mut config = FileConfig::default();
    config.authority.api_key = Some("from-file".into());

    let config = config.with_overrides(Overrides {
        api_url: Some("http://localhost:8080".into()),
        api_key: Some(String::new()),
    });

    assert_eq!(config.authority.base_url, "http://localhost:8080");
    // An empty flag does not clear the file value.
    assert_eq!(config.authority.api_key.as_deref(), Some("from-file"));
}

#[test]
fn explicit_data_dir_wins() {
    let dir = PathBuf::from("/tmp/ledgerly-test");
    assert_eq!(resolve_data_dir(Some(dir.clone())).unwrap(), dir);
}

// ── Store ────────────────────────────────────────────────────────

#[test]
fn key_material_is_stable() {
    let dir = TempDir::new().unwrap();
    let first = store_key_material(dir.path()).unwrap();
    let second = store_key_material(dir.path()).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn existing_install_id_is_the_key_material() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(INSTALL_ID_FILE), "install-1234\n").unwrap();

    assert_eq!(store_key_material(dir.path()).unwrap(), "install-1234");
}

#[test]
fn key_material_is_created_once() {
    let dir = TempDir::new().unwrap();
    let created = store_key_material(dir.path()).unwrap();

    let on_disk = std::fs::read_to_string(dir.path().join(INSTALL_ID_FILE)).unwrap();
    assert_eq!(on_disk.trim(), created);
}

#[test]
fn store_survives_user_change() {
    let dir = TempDir::new().unwrap();
    open_store(dir.path()).unwrap().set(keys::LICENSE_CACHE, "ABCD-1234-WXYZ").unwrap();

    let user = std::env::var_os("USER");
    // SAFETY: no other test in this binary reads USER.
    unsafe { std::env::set_var("USER", "someone-else") };
    let reopened = open_store(dir.path()).unwrap().get(keys::LICENSE_CACHE);
    match user {
        Some(user) => unsafe { std::env::set_var("USER", user) },
        None => unsafe { std::env::remove_var("USER") },
    }

    assert_eq!(reopened.unwrap().as_deref(), Some("ABCD-1234-WXYZ"));
}

#[test]
fn store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    open_store(dir.path()).unwrap().set(keys::DEVICE_ID, "dev-1").unwrap();

    let reopened = open_store(dir.path()).unwrap();
    assert_eq!(reopened.get(keys::DEVICE_ID).unwrap().as_deref(), Some("dev-1"));
}

// ── Output ───────────────────────────────────────────────────────

#[test]
fn describe_phases() {
    assert_eq!(describe(&snapshot(LicensePhase::NoLicense), now()), "no license");

    let mut valid = snapshot(LicensePhase::Valid);
    let code = LicenseCode::parse("ABCD-1234-WXYZ").unwrap();
    valid.license_info = Some(LicenseRecord::valid(
        code.clone(),
        now() + Duration::days(2) + Duration::hours(3),
    ));
    valid.warning_level = WarningLevel::Days;
    assert_eq!(describe(&valid, now()), "valid, expires in 2d 3h [warning: DAYS]");

    let mut grace = snapshot(LicensePhase::GracePeriod);
    grace.grace_period_ends_at = Some(now() + Duration::minutes(12));
    assert_eq!(describe(&grace, now()), "expired, grace period ends in 12m 0s");

    let mut blocked = snapshot(LicensePhase::Blocked);
    blocked.license_info = Some(LicenseRecord::invalid(Some(code), LicenseReason::CacheExpired));
    assert_eq!(describe(&blocked, now()), "blocked (CACHE_EXPIRED)");
}

#[test]
fn describe_marks_offline_mode() {
    let mut valid = snapshot(LicensePhase::Valid);
    let mut record = LicenseRecord::valid(
        LicenseCode::parse("ABCD-1234-WXYZ").unwrap(),
        now() + Duration::days(40),
    );
    record.offline_mode = true;
    record.offline_days_remaining = Some(3);
    valid.license_info = Some(record);

    assert_eq!(
        describe(&valid, now()),
        "valid, expires in 40d 0h [offline, 3 day(s) left]"
    );
}

#[test]
fn human_duration_units() {
    assert_eq!(human_duration(Duration::seconds(59)), "0m 59s");
    assert_eq!(human_duration(Duration::minutes(90)), "1h 30m");
    assert_eq!(human_duration(Duration::hours(49)), "2d 1h");
    assert_eq!(human_duration(-Duration::hours(1)), "0m 0s");
}
