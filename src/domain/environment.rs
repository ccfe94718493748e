// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deployment environment labels.
//!
//! The environment is resolved outside this crate and handed in as a trusted
//! label. This module only gives it a type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pre-resolved deployment environment.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::Environment;
///
/// let env: Environment = "production".parse().unwrap();
/// assert_eq!(env, Environment::Production);
/// assert_eq!(env.to_string(), "production");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    Development,
    /// Pre-production staging
    Staging,
    /// Production
    Production,
}

impl Environment {
    /// All environments, in promotion order.
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::Staging,
        Environment::Production,
    ];

    /// Returns the lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Returns `true` for the production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown environment label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown environment: {0}")]
pub struct ParseEnvironmentError(pub String);

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}
