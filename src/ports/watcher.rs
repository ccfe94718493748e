// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document watcher port.
//!
//! Hot reload is an optional capability supplied from outside the core. A
//! `DocumentWatcher` produces fresh raw documents (for example when a file on
//! disk changes) and hands them to a callback; the configuration manager
//! validates and caches whatever arrives.

use crate::domain::{Result, ValidatedConfiguration};
use serde_json::Value;
use std::sync::Arc;

/// Callback receiving a freshly observed raw document.
pub type DocumentCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback receiving a newly validated configuration.
pub type ChangeCallback = Arc<dyn Fn(Arc<ValidatedConfiguration>) + Send + Sync>;

/// A producer of updated configuration documents.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; callbacks may be invoked from a
/// background thread.
///
/// # Examples
///
/// ```rust
/// use trustcfg::ports::{DocumentCallback, DocumentWatcher};
/// use trustcfg::domain::Result;
///
/// struct IdleWatcher;
///
/// impl DocumentWatcher for IdleWatcher {
///     fn watch(&mut self, _callback: DocumentCallback) -> Result<()> {
///         Ok(())
///     }
///
///     fn stop(&mut self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait DocumentWatcher: Send + Sync {
    /// Starts watching. `callback` receives every new document.
    fn watch(&mut self, callback: DocumentCallback) -> Result<()>;

    /// Stops watching. No callback fires after this returns.
    fn stop(&mut self) -> Result<()>;
}
