// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated encryption of configuration documents.
//!
//! Documents are serialized to JSON and sealed with AES-256-GCM under a key
//! stretched from the caller's master key with PBKDF2-HMAC-SHA256. A fresh
//! salt and IV are drawn for every blob. The [`EncryptionContext`] is bound
//! into the authentication tag as additional authenticated data, so a blob
//! only opens under the exact environment, tenant and configuration type it
//! was sealed for.
//!
//! Every decryption failure surfaces as [`TrustError::DecryptionFailed`],
//! whatever the underlying cause.

use crate::adapters::SystemClock;
use crate::domain::crypto::{AES_256_GCM, BLOB_VERSION, IV_LEN, KEY_LEN, SALT_LEN, TAG_LEN};
use crate::domain::{
    BlobMetadata, DecryptedDocument, EncryptedBlob, EncryptionContext, EncryptionSettings,
    Environment, IntegrityReport, KeyMetadata, MasterKey, Result, TrustError,
};
use crate::ports::Clock;
use crate::service::key_store::{fingerprint, KeyStore};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{json, Value};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Seals and opens configuration documents.
///
/// # Examples
///
/// ```rust
/// use trustcfg::domain::{EncryptionContext, EncryptionSettings, Environment};
/// use trustcfg::service::EncryptionEngine;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> trustcfg::domain::Result<()> {
/// let engine = EncryptionEngine::new(EncryptionSettings::default().with_iterations(1_000));
/// let (key, _metadata) = engine.generate_master_key(Environment::Production)?;
/// let context = EncryptionContext::new(Environment::Production, "runtime");
///
/// let blob = engine.encrypt(&json!({ "api": { "timeout": 5000 } }), &key, &context).await?;
/// let opened = engine.decrypt(&blob, &key, &context).await?;
/// assert_eq!(opened.data["api"]["timeout"], 5000);
/// # Ok(())
/// # }
/// ```
pub struct EncryptionEngine {
    settings: EncryptionSettings,
    keys: KeyStore,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
}

impl fmt::Debug for EncryptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for EncryptionEngine {
    fn default() -> Self {
        Self::new(EncryptionSettings::default())
    }
}

impl EncryptionEngine {
    /// Creates an engine using the system clock.
    pub fn new(settings: EncryptionSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Creates an engine using `clock` for timestamps and grace windows.
    pub fn with_clock(settings: EncryptionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            keys: KeyStore::new(),
            clock,
            rng: SystemRandom::new(),
        }
    }

    /// The active settings.
    pub fn settings(&self) -> &EncryptionSettings {
        &self.settings
    }

    /// Encrypts `document` for `context`.
    pub async fn encrypt(
        &self,
        document: &Value,
        master_key: &MasterKey,
        context: &EncryptionContext,
    ) -> Result<EncryptedBlob> {
        if master_key.is_empty() {
            return Err(TrustError::EncryptionFailed {
                message: "Master key is empty".to_string(),
            });
        }
        if let Some(record) = self.keys.find(&fingerprint(master_key)) {
            if !record.is_active {
                return Err(TrustError::EncryptionFailed {
                    message: format!("Key {} has been rotated out", record.key_id),
                });
            }
        }

        let iterations = self.settings.iterations;
        let timestamp = context.timestamp.unwrap_or_else(|| self.clock.now());
        let timestamp_ms = timestamp.timestamp_millis();

        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        self.fill_random(&mut salt)?;
        self.fill_random(&mut iv)?;

        let key = derive_key(master_key, &salt, iterations)
            .await
            .ok_or_else(|| TrustError::EncryptionFailed {
                message: "Key derivation failed".to_string(),
            })?;
        let sealing_key = aead_key(&key).ok_or_else(|| TrustError::EncryptionFailed {
            message: "Invalid derived key".to_string(),
        })?;

        let mut in_out = serde_json::to_vec(document)?;
        let aad = associated_data(context, timestamp_ms);
        let tag = sealing_key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(iv),
                Aad::from(aad.as_slice()),
                &mut in_out,
            )
            .map_err(|_| TrustError::EncryptionFailed {
                message: "Sealing failed".to_string(),
            })?;

        tracing::debug!(
            environment = %context.environment,
            config_type = %context.config_type,
            bytes = in_out.len(),
            "encrypted configuration"
        );

        Ok(EncryptedBlob {
            algorithm: AES_256_GCM.to_string(),
            data: STANDARD.encode(&in_out),
            iv: STANDARD.encode(iv),
            tag: STANDARD.encode(tag.as_ref()),
            salt: STANDARD.encode(salt),
            iterations,
            timestamp: timestamp_ms,
            version: BLOB_VERSION,
        })
    }

    /// Decrypts `blob` under `context`.
    ///
    /// Fails with [`TrustError::DecryptionFailed`] on any mismatch: wrong
    /// key, tampered bytes, a different context, an unsupported algorithm or
    /// a key whose grace window has ended.
    pub async fn decrypt(
        &self,
        blob: &EncryptedBlob,
        master_key: &MasterKey,
        context: &EncryptionContext,
    ) -> Result<DecryptedDocument> {
        // Checked before key derivation.
        if blob.algorithm != AES_256_GCM {
            return Err(self.reject("unsupported algorithm"));
        }
        let report = self.validate_integrity(blob);
        if !report.is_valid {
            return Err(self.reject("malformed blob"));
        }
        if let Some(record) = self.keys.find(&fingerprint(master_key)) {
            if !record.is_usable(self.clock.now()) {
                return Err(self.reject("key grace window elapsed"));
            }
        }

        let (Ok(mut in_out), Ok(tag), Ok(iv), Ok(salt)) = (
            STANDARD.decode(&blob.data),
            STANDARD.decode(&blob.tag),
            STANDARD.decode(&blob.iv),
            STANDARD.decode(&blob.salt),
        ) else {
            return Err(self.reject("undecodable field"));
        };

        let key = derive_key(master_key, &salt, blob.iterations)
            .await
            .ok_or_else(|| self.reject("key derivation failed"))?;
        let opening_key = aead_key(&key).ok_or_else(|| self.reject("invalid derived key"))?;
        let nonce =
            Nonce::try_assume_unique_for_key(&iv).map_err(|_| self.reject("invalid iv"))?;

        let bound_ms = context
            .timestamp
            .map(|t| t.timestamp_millis())
            .unwrap_or(blob.timestamp);
        let aad = associated_data(context, bound_ms);

        in_out.extend_from_slice(&tag);
        let plaintext = opening_key
            .open_in_place(nonce, Aad::from(aad.as_slice()), &mut in_out)
            .map_err(|_| self.reject("authentication failed"))?;
        let data: Value =
            serde_json::from_slice(plaintext).map_err(|_| self.reject("invalid plaintext"))?;

        Ok(DecryptedDocument {
            data,
            metadata: BlobMetadata {
                algorithm: blob.algorithm.clone(),
                version: blob.version,
                encrypted_at: blob_time(blob).unwrap_or_default(),
                environment: context.environment,
                tenant: context.tenant.clone(),
                config_type: context.config_type.clone(),
            },
        })
    }

    /// Generates a fresh 256-bit master key and records it as active.
    pub fn generate_master_key(&self, environment: Environment) -> Result<(MasterKey, KeyMetadata)> {
        let mut bytes = vec![0u8; KEY_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| TrustError::key_management("Random number generator failure"))?;
        let key = MasterKey::from_bytes(bytes);
        let metadata = self.keys.record(environment, &key, self.clock.now());
        tracing::info!(
            environment = %environment,
            key_id = %metadata.key_id,
            version = metadata.version,
            "generated master key"
        );
        Ok((key, metadata))
    }

    /// Replaces `old_key` with a fresh key.
    ///
    /// The old key's record is kept but marked inactive, and it keeps
    /// decrypting until its grace window ends.
    pub fn rotate_key(
        &self,
        environment: Environment,
        old_key: &MasterKey,
    ) -> Result<(MasterKey, KeyMetadata)> {
        let now = self.clock.now();
        let expires_at = Duration::try_days(self.settings.key_grace_days)
            .and_then(|grace| now.checked_add_signed(grace))
            .ok_or_else(|| {
                TrustError::key_management(format!(
                    "Grace window of {} days is out of range",
                    self.settings.key_grace_days
                ))
            })?;
        let old_fingerprint = fingerprint(old_key);

        let retired = match self.keys.retire(environment, &old_fingerprint, expires_at) {
            Some(retired) => retired,
            None if self.keys.has_active(environment) => {
                tracing::warn!(environment = %environment, "rotation refused: key is not active");
                return Err(TrustError::key_management(format!(
                    "Key is not the active key for {}",
                    environment
                )));
            }
            None => self.keys.record_retired(environment, old_key, now, expires_at),
        };

        let (key, metadata) = self.generate_master_key(environment)?;
        tracing::info!(
            environment = %environment,
            retired_key = %retired.key_id,
            new_key = %metadata.key_id,
            grace_until = %expires_at,
            "rotated master key"
        );
        Ok((key, metadata))
    }

    /// The newest active key record for `environment`.
    pub fn active_key_metadata(&self, environment: Environment) -> Option<KeyMetadata> {
        self.keys.active(environment)
    }

    /// Every key record for `environment`, oldest first.
    pub fn key_history(&self, environment: Environment) -> Vec<KeyMetadata> {
        self.keys.history(environment)
    }

    /// Checks the blob's structure without decrypting it.
    pub fn validate_integrity(&self, blob: &EncryptedBlob) -> IntegrityReport {
        let mut problems = Vec::new();

        if blob.algorithm != AES_256_GCM {
            problems.push(format!("Unsupported algorithm: {}", blob.algorithm));
        }
        if blob.version != BLOB_VERSION {
            problems.push(format!("Unsupported version: {}", blob.version));
        }
        let (min, max) = self.iteration_bounds();
        if blob.iterations < min || blob.iterations > max {
            problems.push(format!(
                "Iteration count {} outside {}..={}",
                blob.iterations, min, max
            ));
        }
        if blob.data.is_empty() {
            problems.push("Missing field: data".to_string());
        } else if STANDARD.decode(&blob.data).is_err() {
            problems.push("Field data is not valid base64".to_string());
        }
        for (name, value, expected) in [
            ("iv", &blob.iv, IV_LEN),
            ("tag", &blob.tag, TAG_LEN),
            ("salt", &blob.salt, SALT_LEN),
        ] {
            if value.is_empty() {
                problems.push(format!("Missing field: {}", name));
                continue;
            }
            match STANDARD.decode(value) {
                Ok(bytes) if bytes.len() == expected => {}
                Ok(bytes) => problems.push(format!(
                    "Field {} has {} bytes, expected {}",
                    name,
                    bytes.len(),
                    expected
                )),
                Err(_) => problems.push(format!("Field {} is not valid base64", name)),
            }
        }

        IntegrityReport {
            is_valid: problems.is_empty(),
            problems,
        }
    }

    /// Rounds a blob may declare. The ceiling never falls below the rounds
    /// this engine seals with, and the floor is at least one.
    fn iteration_bounds(&self) -> (u32, u32) {
        let min = self.settings.min_iterations.max(1);
        let max = self.settings.max_iterations.max(self.settings.iterations);
        (min, max)
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        self.rng.fill(buf).map_err(|_| TrustError::EncryptionFailed {
            message: "Random number generator failure".to_string(),
        })
    }

    fn reject(&self, cause: &str) -> TrustError {
        tracing::debug!(cause, "decryption rejected");
        TrustError::DecryptionFailed
    }
}

/// Stretches `master_key` on the blocking pool.
async fn derive_key(master_key: &MasterKey, salt: &[u8], iterations: u32) -> Option<[u8; KEY_LEN]> {
    let rounds = NonZeroU32::new(iterations)?;
    let secret = master_key.clone();
    let salt = salt.to_vec();
    tokio::task::spawn_blocking(move || {
        let mut out = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            rounds,
            &salt,
            secret.expose(),
            &mut out,
        );
        out
    })
    .await
    .ok()
}

fn aead_key(key: &[u8; KEY_LEN]) -> Option<LessSafeKey> {
    UnboundKey::new(&aead::AES_256_GCM, key)
        .ok()
        .map(LessSafeKey::new)
}

fn associated_data(context: &EncryptionContext, timestamp_ms: i64) -> Vec<u8> {
    json!({
        "environment": context.environment.as_str(),
        "tenant": context.tenant,
        "configType": context.config_type,
        "timestamp": timestamp_ms,
    })
    .to_string()
    .into_bytes()
}

/// Converts a blob timestamp to a `DateTime`.
pub fn blob_time(blob: &EncryptedBlob) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(blob.timestamp).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ManualClock;

    fn engine() -> EncryptionEngine {
        EncryptionEngine::new(EncryptionSettings::default().with_iterations(1_000))
    }

    fn context(environment: Environment) -> EncryptionContext {
        EncryptionContext::new(environment, "runtime")
    }

    #[tokio::test]
    async fn test_round_trip() {
        let engine = engine();
        let (key, _) = engine.generate_master_key(Environment::Production).unwrap();
        let doc = json!({ "api": { "baseUrl": "https://api.example.com" }, "n": [1, 2, 3] });
        let ctx = context(Environment::Production).with_tenant("tenant12345");

        let blob = engine.encrypt(&doc, &key, &ctx).await.unwrap();
        assert_eq!(blob.algorithm, AES_256_GCM);
        assert_eq!(blob.version, BLOB_VERSION);
        assert_eq!(blob.iterations, 1_000);
        assert!(engine.validate_integrity(&blob).is_valid);

        let opened = engine.decrypt(&blob, &key, &ctx).await.unwrap();
        assert_eq!(opened.data, doc);
        assert_eq!(opened.metadata.tenant.as_deref(), Some("tenant12345"));
        assert_eq!(Some(opened.metadata.encrypted_at), blob_time(&blob));
    }

    #[tokio::test]
    async fn test_fresh_salt_and_iv() {
        let engine = engine();
        let key = MasterKey::from_bytes(vec![3u8; 32]);
        let ctx = context(Environment::Staging);
        let a = engine.encrypt(&json!({}), &key, &ctx).await.unwrap();
        let b = engine.encrypt(&json!({}), &key, &ctx).await.unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.salt, b.salt);
    }

    #[tokio::test]
    async fn test_context_binding() {
        let engine = engine();
        let key = MasterKey::from_bytes(vec![9u8; 32]);
        let blob = engine
            .encrypt(&json!({ "a": 1 }), &key, &context(Environment::Production))
            .await
            .unwrap();

        let err = engine
            .decrypt(&blob, &key, &context(Environment::Staging))
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::DecryptionFailed));

        let other_type = EncryptionContext::new(Environment::Production, "tenant");
        assert!(engine.decrypt(&blob, &key, &other_type).await.is_err());

        let other_tenant = context(Environment::Production).with_tenant("tenant12345");
        assert!(engine.decrypt(&blob, &key, &other_tenant).await.is_err());
    }

    #[tokio::test]
    async fn test_explicit_timestamp_is_bound() {
        let engine = engine();
        let key = MasterKey::from_bytes(vec![4u8; 32]);
        let stamp = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let ctx = context(Environment::Development).with_timestamp(stamp);
        let blob = engine.encrypt(&json!(1), &key, &ctx).await.unwrap();
        assert_eq!(blob.timestamp, 1_700_000_000_000);

        assert!(engine.decrypt(&blob, &key, &ctx).await.is_ok());
        let shifted = context(Environment::Development).with_timestamp(stamp + Duration::seconds(1));
        assert!(engine.decrypt(&blob, &key, &shifted).await.is_err());
        // Without a context timestamp the blob's own stamp is used.
        assert!(engine
            .decrypt(&blob, &key, &context(Environment::Development))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_key_and_tampering() {
        let engine = engine();
        let key = MasterKey::from_bytes(vec![1u8; 32]);
        let ctx = context(Environment::Production);
        let blob = engine.encrypt(&json!({ "x": "y" }), &key, &ctx).await.unwrap();

        let wrong = MasterKey::from_bytes(vec![2u8; 32]);
        assert!(engine.decrypt(&blob, &wrong, &ctx).await.is_err());

        let mut tampered = blob.clone();
        let mut bytes = STANDARD.decode(&tampered.data).unwrap();
        bytes[0] ^= 0x01;
        tampered.data = STANDARD.encode(bytes);
        assert!(matches!(
            engine.decrypt(&tampered, &key, &ctx).await,
            Err(TrustError::DecryptionFailed)
        ));

        let mut shifted_iv = blob.clone();
        let mut iv = STANDARD.decode(&shifted_iv.iv).unwrap();
        iv[IV_LEN - 1] ^= 0x80;
        shifted_iv.iv = STANDARD.encode(iv);
        assert!(engine.validate_integrity(&shifted_iv).is_valid);
        assert!(matches!(
            engine.decrypt(&shifted_iv, &key, &ctx).await,
            Err(TrustError::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_algorithm_and_iteration_checks() {
        let engine = engine();
        let key = MasterKey::from_bytes(vec![1u8; 32]);
        let ctx = context(Environment::Production);
        let blob = engine.encrypt(&json!({}), &key, &ctx).await.unwrap();

        let mut other = blob.clone();
        other.algorithm = "aes-128-cbc".to_string();
        assert!(matches!(
            engine.decrypt(&other, &key, &ctx).await,
            Err(TrustError::DecryptionFailed)
        ));

        let mut weak = blob.clone();
        weak.iterations = 10;
        assert!(engine.decrypt(&weak, &key, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_excessive_iterations_rejected_before_derivation() {
        let engine = engine();
        let key = MasterKey::from_bytes(vec![1u8; 32]);
        let ctx = context(Environment::Production);
        let mut blob = engine.encrypt(&json!({ "a": 1 }), &key, &ctx).await.unwrap();
        blob.iterations = u32::MAX;

        let report = engine.validate_integrity(&blob);
        assert!(!report.is_valid);
        assert!(report.problems[0].starts_with("Iteration count"));

        // Stretching u32::MAX rounds would take hours; the bound check
        // answers immediately.
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.decrypt(&blob, &key, &ctx),
        )
        .await
        .expect("decrypt returned without deriving a key");
        assert!(matches!(result, Err(TrustError::DecryptionFailed)));
    }

    #[tokio::test]
    async fn test_configured_iterations_above_ceiling_still_open() {
        let engine = EncryptionEngine::new(
            EncryptionSettings::default()
                .with_iterations(2_000)
                .with_max_iterations(1_500),
        );
        let key = MasterKey::from_bytes(vec![6u8; 32]);
        let ctx = context(Environment::Staging);
        let blob = engine.encrypt(&json!({ "b": 2 }), &key, &ctx).await.unwrap();
        assert!(engine.decrypt(&blob, &key, &ctx).await.is_ok());
    }

    #[test]
    fn test_rotation_rejects_unrepresentable_grace_window() {
        let engine = EncryptionEngine::new(
            EncryptionSettings::default()
                .with_iterations(1_000)
                .with_key_grace_days(i64::MAX),
        );
        let (key, _) = engine.generate_master_key(Environment::Staging).unwrap();
        assert!(matches!(
            engine.rotate_key(Environment::Staging, &key),
            Err(TrustError::KeyManagement { .. })
        ));
        // The active key is untouched by the failed rotation.
        assert_eq!(engine.key_history(Environment::Staging).len(), 1);
        assert!(engine.active_key_metadata(Environment::Staging).is_some());
    }

    #[test]
    fn test_validate_integrity_reports_problems() {
        let engine = engine();
        let blob = EncryptedBlob {
            algorithm: "rot13".to_string(),
            data: String::new(),
            iv: STANDARD.encode([0u8; 8]),
            tag: "***".to_string(),
            salt: STANDARD.encode([0u8; SALT_LEN]),
            iterations: 0,
            timestamp: 0,
            version: 2,
        };
        let report = engine.validate_integrity(&blob);
        assert!(!report.is_valid);
        assert_eq!(report.problems.len(), 6);
    }

    #[test]
    fn test_generate_records_metadata() {
        let engine = engine();
        let (key, metadata) = engine.generate_master_key(Environment::Staging).unwrap();
        assert_eq!(key.len(), KEY_LEN);
        assert!(metadata.is_active);
        assert_eq!(metadata.environment, Environment::Staging);
        assert_eq!(metadata.fingerprint, fingerprint(&key));
        assert_eq!(engine.active_key_metadata(Environment::Staging), Some(metadata));
    }

    #[tokio::test]
    async fn test_rotation_grace_window() {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = EncryptionEngine::with_clock(
            EncryptionSettings::default().with_iterations(1_000),
            clock.clone(),
        );
        let ctx = context(Environment::Production);
        let (old_key, old_meta) = engine.generate_master_key(Environment::Production).unwrap();
        let blob = engine.encrypt(&json!({ "v": 1 }), &old_key, &ctx).await.unwrap();

        let (new_key, new_meta) = engine.rotate_key(Environment::Production, &old_key).unwrap();
        assert_ne!(new_key, old_key);
        assert_eq!(new_meta.version, 2);

        let history = engine.key_history(Environment::Production);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].key_id, old_meta.key_id);
        assert!(!history[0].is_active);
        assert!(history[0].expires_at.is_some());

        // Old key still opens historical blobs but cannot seal new ones.
        assert!(engine.decrypt(&blob, &old_key, &ctx).await.is_ok());
        assert!(engine.encrypt(&json!({}), &old_key, &ctx).await.is_err());

        clock.advance(Duration::days(31));
        assert!(matches!(
            engine.decrypt(&blob, &old_key, &ctx).await,
            Err(TrustError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_rotate_with_unknown_key_rejected() {
        let engine = engine();
        engine.generate_master_key(Environment::Production).unwrap();
        let stranger = MasterKey::from_bytes(vec![5u8; 32]);
        assert!(matches!(
            engine.rotate_key(Environment::Production, &stranger),
            Err(TrustError::KeyManagement { .. })
        ));
    }

    #[test]
    fn test_rotate_untracked_key() {
        let engine = engine();
        let external = MasterKey::from_bytes(vec![6u8; 32]);
        let (_, metadata) = engine.rotate_key(Environment::Development, &external).unwrap();
        assert_eq!(metadata.version, 2);
        assert!(!engine.key_history(Environment::Development)[0].is_active);
    }
}
