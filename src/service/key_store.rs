// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only registry of master key metadata.
//!
//! The store never holds key material. It records a SHA-256 fingerprint per
//! key so that the engine can recognise a presented key and decide whether
//! it is still allowed to decrypt.

use crate::domain::{Environment, KeyMetadata, MasterKey};
use chrono::{DateTime, Utc};
use ring::digest;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Purpose label recorded for every configuration key.
pub const KEY_PURPOSE: &str = "configuration-encryption";

/// Returns the hex SHA-256 fingerprint of `key`.
pub fn fingerprint(key: &MasterKey) -> String {
    hex::encode(digest::digest(&digest::SHA256, key.expose()).as_ref())
}

/// Versioned key history per environment.
///
/// Records are only ever appended or retired; nothing is removed.
#[derive(Debug, Default)]
pub struct KeyStore {
    history: RwLock<HashMap<Environment, Vec<KeyMetadata>>>,
}

impl KeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an active record for `key`.
    pub fn record(&self, environment: Environment, key: &MasterKey, now: DateTime<Utc>) -> KeyMetadata {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let records = history.entry(environment).or_default();
        let metadata = KeyMetadata {
            key_id: Uuid::new_v4().to_string(),
            purpose: KEY_PURPOSE.to_string(),
            environment,
            created_at: now,
            is_active: true,
            expires_at: None,
            version: records.len() as u32 + 1,
            fingerprint: fingerprint(key),
        };
        records.push(metadata.clone());
        metadata
    }

    /// Appends an already-retired record for a key created elsewhere.
    pub fn record_retired(
        &self,
        environment: Environment,
        key: &MasterKey,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> KeyMetadata {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let records = history.entry(environment).or_default();
        let metadata = KeyMetadata {
            key_id: Uuid::new_v4().to_string(),
            purpose: KEY_PURPOSE.to_string(),
            environment,
            created_at: now,
            is_active: false,
            expires_at: Some(expires_at),
            version: records.len() as u32 + 1,
            fingerprint: fingerprint(key),
        };
        records.push(metadata.clone());
        metadata
    }

    /// Marks the active record with `fingerprint` inactive until `expires_at`.
    ///
    /// Returns the retired record, or `None` if no active record matched.
    pub fn retire(
        &self,
        environment: Environment,
        fingerprint: &str,
        expires_at: DateTime<Utc>,
    ) -> Option<KeyMetadata> {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let record = history
            .get_mut(&environment)?
            .iter_mut()
            .find(|m| m.is_active && m.fingerprint == fingerprint)?;
        record.is_active = false;
        record.expires_at = Some(expires_at);
        Some(record.clone())
    }

    /// The most recent active record for `environment`.
    pub fn active(&self, environment: Environment) -> Option<KeyMetadata> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&environment)
            .and_then(|records| records.iter().rev().find(|m| m.is_active).cloned())
    }

    /// Returns `true` when `environment` has an active record.
    pub fn has_active(&self, environment: Environment) -> bool {
        self.active(environment).is_some()
    }

    /// All records for `environment`, oldest first.
    pub fn history(&self, environment: Environment) -> Vec<KeyMetadata> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&environment)
            .cloned()
            .unwrap_or_default()
    }

    /// Finds the newest record with `fingerprint` in any environment.
    pub fn find(&self, fingerprint: &str) -> Option<KeyMetadata> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|records| records.iter())
            .filter(|m| m.fingerprint == fingerprint)
            .max_by_key(|m| m.created_at)
            .cloned()
    }
}
