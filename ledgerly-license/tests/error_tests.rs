use ledgerly_license::{LicenseError, LicenseReason};

#[test]
fn error_display_invalid_code_format() {
    let err = LicenseError::InvalidCodeFormat("bad format".into());
    assert!(format!("{err}").contains("invalid license code format"));
}

#[test]
fn error_display_network() {
    let err = LicenseError::Network("connection refused".into());
    let msg = format!("{err}");
    assert!(msg.contains("network error"));
    assert!(msg.contains("connection refused"));
}

#[test]
fn error_display_remote() {
    let err = LicenseError::Remote {
        status: 503,
        message: "maintenance".into(),
    };
    let msg = format!("{err}");
    assert!(msg.contains("503"));
    assert!(msg.contains("maintenance"));
}

#[test]
fn error_display_tampered() {
    assert!(format!("{}", LicenseError::Tampered).contains("tampered"));
}

#[test]
fn error_from_serde_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let err: LicenseError = json_err.into();
    assert!(format!("{err}").contains("serialization error"));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: LicenseError = io_err.into();
    assert!(format!("{err}").contains("IO error"));
}

#[test]
fn storage_errors_map_to_cache_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    for err in [
        LicenseError::Storage("disk full".into()),
        LicenseError::Tampered,
        LicenseError::Io(io_err),
    ] {
        assert_eq!(err.reason(), LicenseReason::CacheError, "{err}");
    }
}

#[test]
fn remote_errors_map_to_validation_error() {
    for err in [
        LicenseError::Network("reset".into()),
        LicenseError::Timeout,
        LicenseError::Remote {
            status: 500,
            message: String::new(),
        },
        LicenseError::InvalidCodeFormat("x".into()),
        LicenseError::DeviceIdentity("x".into()),
    ] {
        assert_eq!(err.reason(), LicenseReason::ValidationError, "{err}");
    }
}

#[test]
fn only_transport_failures_are_unreachable() {
    assert!(LicenseError::Network("reset".into()).is_unreachable());
    assert!(LicenseError::Timeout.is_unreachable());
    assert!(!LicenseError::Remote {
        status: 502,
        message: String::new()
    }
    .is_unreachable());
    assert!(!LicenseError::Tampered.is_unreachable());
}

#[test]
fn error_debug() {
    let err = LicenseError::Timeout;
    assert!(format!("{err:?}").contains("Timeout"));
}
