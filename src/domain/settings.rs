// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tunables for the trust pipeline.
//!
//! Every manager takes a settings struct whose `Default` carries the standard
//! limits. [`TrustSettings`] bundles them and can be loaded from YAML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "yaml")]
use crate::domain::errors::{Result, TrustError};
#[cfg(feature = "yaml")]
use std::path::Path;

/// Maximum accepted settings file size (1 MiB).
#[cfg(feature = "yaml")]
const MAX_SETTINGS_FILE_SIZE: u64 = 1024 * 1024;

/// Sanitizer limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SanitizerSettings {
    /// Largest accepted serialized document, in bytes
    pub max_document_size: usize,
    /// Hosts (and their subdomains) URLs may point at
    pub allowed_domains: Vec<String>,
    /// Default strictness when the caller does not choose
    pub strict_mode: bool,
}

impl Default for SanitizerSettings {
    fn default() -> Self {
        Self {
            max_document_size: 1024 * 1024,
            allowed_domains: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            strict_mode: true,
        }
    }
}

impl SanitizerSettings {
    /// Sets the largest accepted document size in bytes.
    pub fn with_max_document_size(mut self, bytes: usize) -> Self {
        self.max_document_size = bytes;
        self
    }

    /// Replaces the URL host allow-list.
    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the default strictness.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }
}

/// Encryption engine parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncryptionSettings {
    /// PBKDF2 rounds for new blobs
    pub iterations: u32,
    /// Fewest rounds a blob may declare and still be opened
    pub min_iterations: u32,
    /// Most rounds a blob may declare and still be opened
    pub max_iterations: u32,
    /// Days a rotated-out key keeps decrypting
    pub key_grace_days: i64,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            min_iterations: 1_000,
            max_iterations: 1_000_000,
            key_grace_days: 30,
        }
    }
}

impl EncryptionSettings {
    /// Sets the PBKDF2 rounds used for new blobs.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the fewest rounds a blob may declare.
    pub fn with_min_iterations(mut self, min_iterations: u32) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    /// Sets the most rounds a blob may declare.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the rotated-key grace window in days.
    pub fn with_key_grace_days(mut self, days: i64) -> Self {
        self.key_grace_days = days;
        self
    }
}

/// Configuration cache parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheSettings {
    /// Time-to-live of cached configurations, in seconds
    pub ttl_seconds: u64,
}

impl CacheSettings {
    /// Sets the TTL in seconds.
    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    /// The TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

/// Access control parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessSettings {
    /// Most recent audit entries retained
    pub max_audit_entries: usize,
    /// Default session lifetime in minutes
    pub session_minutes: i64,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            max_audit_entries: 10_000,
            session_minutes: 480,
        }
    }
}

impl AccessSettings {
    /// Sets the audit log cap.
    pub fn with_max_audit_entries(mut self, entries: usize) -> Self {
        self.max_audit_entries = entries;
        self
    }

    /// Sets the default session lifetime in minutes.
    pub fn with_session_minutes(mut self, minutes: i64) -> Self {
        self.session_minutes = minutes;
        self
    }
}

/// All pipeline settings.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::TrustSettings;
///
/// let settings = TrustSettings::default();
/// assert_eq!(settings.encryption.iterations, 100_000);
/// assert_eq!(settings.access.max_audit_entries, 10_000);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSettings {
    /// Sanitizer limits
    pub sanitizer: SanitizerSettings,
    /// Encryption parameters
    pub encryption: EncryptionSettings,
    /// Cache parameters
    pub cache: CacheSettings,
    /// Access control parameters
    pub access: AccessSettings,
}

#[cfg(feature = "yaml")]
impl TrustSettings {
    /// Parses settings from YAML. Missing fields take their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use trustcfg::domain::TrustSettings;
    ///
    /// let settings = TrustSettings::from_yaml_str("cache:\n  ttlSeconds: 60\n").unwrap();
    /// assert_eq!(settings.cache.ttl_seconds, 60);
    /// assert_eq!(settings.encryption.iterations, 100_000);
    /// ```
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| TrustError::SettingsError {
            message: format!("Failed to parse YAML: {}", e),
            source: Some(Box::new(e)),
        })
    }

    /// Reads settings from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if metadata.len() > MAX_SETTINGS_FILE_SIZE {
            return Err(TrustError::SettingsError {
                message: format!(
                    "Settings file too large: {} bytes (max {} bytes)",
                    metadata.len(),
                    MAX_SETTINGS_FILE_SIZE
                ),
                source: None,
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = TrustSettings::default();
        assert_eq!(settings.sanitizer.max_document_size, 1024 * 1024);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(300));
        assert_eq!(settings.encryption.key_grace_days, 30);
        assert_eq!(settings.encryption.max_iterations, 1_000_000);
        assert_eq!(settings.access.session_minutes, 480);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml_partial() {
        let yaml = "sanitizer:\n  allowedDomains: [example.com]\naccess:\n  maxAuditEntries: 5\n";
        let settings = TrustSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.sanitizer.allowed_domains, vec!["example.com".to_string()]);
        assert!(settings.sanitizer.strict_mode);
        assert_eq!(settings.access.max_audit_entries, 5);
        assert_eq!(settings.access.session_minutes, 480);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml_invalid() {
        let err = TrustSettings::from_yaml_str("cache: [unclosed").unwrap_err();
        assert!(matches!(err, TrustError::SettingsError { .. }));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "encryption:\n  iterations: 2000").unwrap();
        let settings = TrustSettings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.encryption.iterations, 2000);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_from_yaml_file_missing() {
        let err = TrustSettings::from_yaml_file("/nonexistent/trust.yaml").unwrap_err();
        assert!(matches!(err, TrustError::IoError(_)));
    }
}
