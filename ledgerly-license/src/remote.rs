//! Remote license authority.
//!
//! The authority decides whether a `(license code, device id)` pair is
//! allowed. Its answers are [`RemoteVerdict`]s; failing to get an answer is a
//! [`LicenseError`], which callers treat as "unreachable" rather than
//! "invalid".

use crate::code::LicenseCode;
use crate::error::LicenseResult;
use crate::record::{LicenseReason, LicenseRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An answer from the license authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVerdict {
    /// Whether the license permits use on this device.
    pub valid: bool,
    /// License expiry, required when `valid` is true.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Reason code when invalid (`LICENSE_BLOCKED`, ...).
    #[serde(default)]
    pub reason: Option<String>,
    /// Explanation supplied by the authority.
    #[serde(default)]
    pub message: Option<String>,
}

impl RemoteVerdict {
    /// A valid verdict expiring at `end_date`.
    #[must_use]
    pub fn valid_until(end_date: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            end_date: Some(end_date),
            reason: None,
            message: None,
        }
    }

    /// An invalid verdict with `reason`.
    #[must_use]
    pub fn rejected(reason: LicenseReason) -> Self {
        Self {
            valid: false,
            end_date: None,
            reason: Some(reason.code().to_string()),
            message: None,
        }
    }

    /// Converts the verdict into a record for `code`.
    ///
    /// A valid verdict without an end date cannot be enforced and becomes
    /// `VALIDATION_ERROR`.
    #[must_use]
    pub fn into_record(self, code: LicenseCode) -> LicenseRecord {
        match (self.valid, self.end_date) {
            (true, Some(end)) => LicenseRecord::valid(code, end),
            (true, None) => LicenseRecord::invalid(Some(code), LicenseReason::ValidationError),
            (false, end_date) => {
                let reason = self
                    .reason
                    .as_deref()
                    .map(LicenseReason::from_code)
                    .unwrap_or(LicenseReason::ValidationError);
                LicenseRecord::invalid(Some(code), reason)
                    .with_end_date(end_date)
                    .with_message(self.message)
            }
        }
    }
}

/// The remote service that activates and validates license codes.
#[async_trait]
pub trait LicenseAuthority: Send + Sync {
    /// Binds `code` to `device_id` and returns the resulting verdict.
    async fn activate(&self, code: &LicenseCode, device_id: &str) -> LicenseResult<RemoteVerdict>;

    /// Re-checks an already activated `code` for `device_id`.
    async fn validate(&self, code: &LicenseCode, device_id: &str) -> LicenseResult<RemoteVerdict>;
}

#[cfg(feature = "online")]
pub use http::HttpAuthority;

#[cfg(feature = "online")]
mod http {
    use super::{LicenseAuthority, RemoteVerdict};
    use crate::code::LicenseCode;
    use crate::config::AuthorityConfig;
    use crate::error::{LicenseError, LicenseResult};
    use async_trait::async_trait;
    use reqwest::Client;
    use serde::Serialize;
    use tracing::debug;

    /// Longest response body kept in error messages.
    const MAX_ERROR_BODY: usize = 256;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct VerdictRequest<'a> {
        license_code: &'a str,
        device_id: &'a str,
    }

    /// License authority reached over HTTPS.
    #[derive(Debug, Clone)]
    pub struct HttpAuthority {
        config: AuthorityConfig,
        client: Client,
    }

    impl HttpAuthority {
        /// Creates a client for the configured service.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be built.
        pub fn new(config: AuthorityConfig) -> LicenseResult<Self> {
            let client = Client::builder()
                .timeout(config.request_timeout())
                .user_agent(concat!("ledgerly-license/", env!("CARGO_PKG_VERSION")))
                .build()?;
            Ok(Self { config, client })
        }

        /// The configuration in use.
        #[must_use]
        pub fn config(&self) -> &AuthorityConfig {
            &self.config
        }

        async fn call(
            &self,
            path: &str,
            code: &LicenseCode,
            device_id: &str,
        ) -> LicenseResult<RemoteVerdict> {
            let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
            debug!("POST {url} for {}", code.masked());

            let mut request = self.client.post(&url).json(&VerdictRequest {
                license_code: code.as_str(),
                device_id,
            });
            if let Some(key) = &self.config.api_key {
                request = request.header("apikey", key).bearer_auth(key);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    LicenseError::Timeout
                } else {
                    LicenseError::Network(e.to_string())
                }
            })?;

            let status = response.status();
            let body = response.text().await?;

            if status.is_server_error() {
                return Err(LicenseError::Remote {
                    status: status.as_u16(),
                    message: truncate(&body),
                });
            }

            serde_json::from_str::<RemoteVerdict>(&body).map_err(|e| LicenseError::Remote {
                status: status.as_u16(),
                message: format!("unexpected response ({e}): {}", truncate(&body)),
            })
        }
    }

    fn truncate(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((idx, _)) => format!("{}…", &body[..idx]),
            None => body.to_string(),
        }
    }

    #[async_trait]
    impl LicenseAuthority for HttpAuthority {
        async fn activate(
            &self,
            code: &LicenseCode,
            device_id: &str,
        ) -> LicenseResult<RemoteVerdict> {
            self.call(&self.config.activate_path, code, device_id).await
        }

        async fn validate(
            &self,
            code: &LicenseCode,
            device_id: &str,
        ) -> LicenseResult<RemoteVerdict> {
            self.call(&self.config.validate_path, code, device_id).await
        }
    }
}
