// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted blob and key records.

use crate::domain::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algorithm label for AES-256-GCM blobs.
pub const AES_256_GCM: &str = "aes-256-gcm";
/// Current blob format version.
pub const BLOB_VERSION: u32 = 1;
/// Key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;
/// IV length in bytes (96 bits).
pub const IV_LEN: usize = 12;
/// Authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;
/// Salt length in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// An encrypted configuration document.
///
/// All binary fields are standard base64. `timestamp` is Unix milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Cipher label
    pub algorithm: String,
    /// Ciphertext
    pub data: String,
    /// Nonce
    pub iv: String,
    /// Authentication tag
    pub tag: String,
    /// Key-derivation salt
    pub salt: String,
    /// Key-derivation rounds
    pub iterations: u32,
    /// Encryption time, bound into the AAD
    pub timestamp: i64,
    /// Blob format version
    pub version: u32,
}

/// The context a blob is bound to.
///
/// Every field participates in the additional authenticated data, so a blob
/// sealed for one context cannot be opened in another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionContext {
    /// Target environment
    pub environment: Environment,
    /// Target tenant
    #[serde(default)]
    pub tenant: Option<String>,
    /// Configuration type (schema type)
    pub config_type: String,
    /// Explicit timestamp; when absent, the blob's own stamp is used
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EncryptionContext {
    /// Creates a context without tenant or explicit timestamp.
    pub fn new(environment: Environment, config_type: impl Into<String>) -> Self {
        Self {
            environment,
            tenant: None,
            config_type: config_type.into(),
            timestamp: None,
        }
    }

    /// Sets the tenant.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Sets an explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Raw master key material.
///
/// `Debug` output never shows the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    /// Wraps existing key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        MasterKey(bytes.into())
    }

    /// Exposes the key bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for an empty key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(__REDACTED__)")
    }
}

/// Bookkeeping for a generated master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    /// Key id
    pub key_id: String,
    /// What the key is for
    pub purpose: String,
    /// Owning environment
    pub environment: Environment,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Whether this is the current key
    pub is_active: bool,
    /// End of the grace window for a rotated-out key
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Position in the environment's key history, starting at 1
    pub version: u32,
    /// SHA-256 fingerprint of the key material, hex
    pub fingerprint: String,
}

impl KeyMetadata {
    /// Returns `true` if the key may still decrypt at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active || self.expires_at.map(|exp| now < exp).unwrap_or(false)
    }
}

/// Metadata returned alongside a decrypted document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    /// Cipher label
    pub algorithm: String,
    /// Blob format version
    pub version: u32,
    /// Encryption time
    pub encrypted_at: DateTime<Utc>,
    /// Environment the blob was bound to
    pub environment: Environment,
    /// Tenant the blob was bound to
    pub tenant: Option<String>,
    /// Configuration type the blob was bound to
    pub config_type: String,
}

/// A decrypted document and its metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct DecryptedDocument {
    /// The plaintext document
    pub data: serde_json::Value,
    /// Blob metadata
    pub metadata: BlobMetadata,
}

/// Outcome of a structural blob check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// `true` when no problems were found
    pub is_valid: bool,
    /// Problems found
    pub problems: Vec<String>,
}
