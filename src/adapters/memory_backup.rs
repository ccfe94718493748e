// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backup store.

use crate::domain::Result;
use crate::ports::BackupStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

const SCHEME: &str = "memory://";

/// Keeps backups in process memory.
///
/// Paths look like `memory://<label>/<uuid>`. Backups live as long as the
/// store.
#[derive(Debug, Default)]
pub struct MemoryBackupStore {
    backups: RwLock<HashMap<String, Value>>,
}

impl MemoryBackupStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored backups.
    pub fn len(&self) -> usize {
        self.backups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, label: &str, document: &Value) -> Result<String> {
        let path = format!("{}{}/{}", SCHEME, label, Uuid::new_v4());
        self.backups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), document.clone());
        Ok(path)
    }

    async fn load(&self, path: &str) -> Result<Option<Value>> {
        if !path.starts_with(SCHEME) {
            return Ok(None);
        }
        Ok(self
            .backups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned())
    }
}
