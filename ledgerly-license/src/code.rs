//! License code parsing.
//!
//! License codes use the format `XXXX-XXXX-XXXX`: three groups of four
//! uppercase ASCII letters or digits, separated by dashes. User input is
//! trimmed and uppercased before validation.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of dash-separated groups in a license code.
pub const CODE_GROUPS: usize = 3;

/// Number of characters in each group.
pub const GROUP_LEN: usize = 4;

/// A syntactically valid license code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseCode(String);

impl LicenseCode {
    /// Parses user input into a license code.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidCodeFormat`] if the input is not three
    /// groups of four alphanumeric characters.
    pub fn parse(input: &str) -> LicenseResult<Self> {
        let normalized = input.trim().to_ascii_uppercase();

        let groups: Vec<&str> = normalized.split('-').collect();
        if groups.len() != CODE_GROUPS {
            return Err(LicenseError::InvalidCodeFormat(format!(
                "expected {CODE_GROUPS} groups separated by '-', got {}",
                groups.len()
            )));
        }

        for group in &groups {
            if group.len() != GROUP_LEN {
                return Err(LicenseError::InvalidCodeFormat(format!(
                    "group '{group}' must be {GROUP_LEN} characters"
                )));
            }
            if !group.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
                return Err(LicenseError::InvalidCodeFormat(format!(
                    "group '{group}' contains characters other than A-Z and 0-9"
                )));
            }
        }

        Ok(Self(normalized))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the code with everything but the first group hidden, for logs.
    #[must_use]
    pub fn masked(&self) -> String {
        let first = &self.0[..GROUP_LEN];
        format!("{first}-****-****")
    }
}

impl fmt::Display for LicenseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LicenseCode {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LicenseCode {
    type Error = LicenseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LicenseCode> for String {
    fn from(code: LicenseCode) -> Self {
        code.0
    }
}
