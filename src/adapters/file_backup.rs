// SPDX-License-Identifier: MIT OR Apache-2.0

//! File system backup store.
//!
//! Writes each backup as a pretty-printed JSON file in a single directory.

use crate::domain::{Result, TrustError};
use crate::ports::BackupStore;
use async_trait::async_trait;
use directories::ProjectDirs;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Maximum size of a backup file accepted by `load` (10MB)
const MAX_BACKUP_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Stores backups as JSON files under a directory.
///
/// `load` only reads files that live directly inside that directory, so a
/// caller-supplied path cannot reach elsewhere on disk.
///
/// # Examples
///
/// ```rust,no_run
/// use trustcfg::adapters::FileBackupStore;
///
/// let store = FileBackupStore::new("/var/lib/myapp/backups");
/// let store = FileBackupStore::from_default_location("myapp", "com.example").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    directory: PathBuf,
}

impl FileBackupStore {
    /// Creates a store writing into `directory`. The directory is created on
    /// first save.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Creates a store in the OS-appropriate data directory for the
    /// application, under `backups/`.
    pub fn from_default_location(app_name: &str, qualifier: &str) -> Result<Self> {
        let dirs = ProjectDirs::from(qualifier, "", app_name).ok_or_else(|| {
            TrustError::backup(format!(
                "Could not determine data directory for {}",
                app_name
            ))
        })?;
        Ok(Self::new(dirs.data_dir().join("backups")))
    }

    /// The backup directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(label: &str) -> String {
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "{}-{}-{}.json",
            label,
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4()
        )
    }

    /// Resolves `path` to a file inside the backup directory, or `None`.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }
        if candidate.extension().and_then(|e| e.to_str()) != Some("json") {
            return None;
        }
        let file_name = candidate.file_name()?;
        let parent = candidate.parent()?;
        if parent != self.directory.as_path() {
            return None;
        }
        Some(self.directory.join(file_name))
    }
}

#[async_trait]
impl BackupStore for FileBackupStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, label: &str, document: &Value) -> Result<String> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| TrustError::BackupError {
                message: format!("Failed to create {}", self.directory.display()),
                source: Some(Box::new(e)),
            })?;

        let path = self.directory.join(Self::file_name(label));
        let bytes = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| TrustError::BackupError {
                message: format!("Failed to write {}", path.display()),
                source: Some(Box::new(e)),
            })?;

        tracing::debug!(path = %path.display(), "wrote backup");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(&self, path: &str) -> Result<Option<Value>> {
        let resolved = match self.resolve(path) {
            Some(resolved) => resolved,
            None => return Ok(None),
        };

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        if metadata.len() > MAX_BACKUP_FILE_SIZE {
            return Err(TrustError::backup(format!(
                "Backup file too large: {} bytes (max {} bytes)",
                metadata.len(),
                MAX_BACKUP_FILE_SIZE
            )));
        }

        let bytes = tokio::fs::read(&resolved).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());

        let path = store.save("runtime", &json!({ "DEBUG": true })).await.unwrap();
        assert!(path.ends_with(".json"));
        assert!(Path::new(&path).exists());

        let loaded = store.load(&path).await.unwrap();
        assert_eq!(loaded, Some(json!({ "DEBUG": true })));
    }

    #[tokio::test]
    async fn test_label_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());
        let path = store.save("../../etc", &json!({})).await.unwrap();
        assert_eq!(Path::new(&path).parent().unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_load_rejects_outside_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());

        assert_eq!(store.load("").await.unwrap(), None);
        assert_eq!(store.load("/etc/passwd").await.unwrap(), None);
        let traversal = format!("{}/../secret.json", dir.path().display());
        assert_eq!(store.load(&traversal).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());
        let missing = dir.path().join("missing.json");
        assert_eq!(store.load(&missing.to_string_lossy()).await.unwrap(), None);
    }
}
