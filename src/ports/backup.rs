// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backup store port.
//!
//! The migration manager backs up original documents before transforming
//! them. Persistence is an I/O step and therefore asynchronous.

use crate::domain::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Persists original documents so migrations can be rolled back.
///
/// Implementations must never modify a stored document. A path returned by
/// [`save`](BackupStore::save) must be accepted by [`load`](BackupStore::load)
/// for the lifetime of the store.
///
/// # Examples
///
/// ```rust
/// use trustcfg::ports::BackupStore;
/// use trustcfg::domain::Result;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct NullStore;
///
/// #[async_trait]
/// impl BackupStore for NullStore {
///     fn name(&self) -> &str {
///         "null"
///     }
///
///     async fn save(&self, label: &str, _document: &Value) -> Result<String> {
///         Ok(format!("null://{}", label))
///     }
///
///     async fn load(&self, _path: &str) -> Result<Option<Value>> {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Stores `document` and returns the path it can be loaded from.
    ///
    /// `label` is a hint (typically the schema type) that implementations may
    /// fold into the path.
    async fn save(&self, label: &str, document: &Value) -> Result<String>;

    /// Loads a previously stored document.
    ///
    /// Returns `Ok(None)` when nothing is stored under `path`, including when
    /// `path` is not one this store could have produced.
    async fn load(&self, path: &str) -> Result<Option<Value>>;
}
