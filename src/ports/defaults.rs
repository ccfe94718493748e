// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote defaults port.
//!
//! The configuration manager builds environment defaults locally. A
//! `DefaultsSource` lets an external collaborator supply richer defaults (for
//! example from a remote settings service). Retrieval is asynchronous and
//! results are layered over the built-in defaults.

use crate::domain::{Environment, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Supplies default documents for a schema type and environment.
///
/// # Examples
///
/// ```rust
/// use trustcfg::ports::DefaultsSource;
/// use trustcfg::domain::{Environment, Result};
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct FixedDefaults;
///
/// #[async_trait]
/// impl DefaultsSource for FixedDefaults {
///     fn name(&self) -> &str {
///         "fixed"
///     }
///
///     async fn fetch_defaults(
///         &self,
///         _schema_type: &str,
///         _environment: Environment,
///     ) -> Result<Option<Value>> {
///         Ok(Some(json!({ "features": { "beta": true } })))
///     }
/// }
/// ```
#[async_trait]
pub trait DefaultsSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns defaults to layer over the built-in ones, or `None` to use the
    /// built-in defaults unchanged.
    async fn fetch_defaults(&self, schema_type: &str, environment: Environment)
        -> Result<Option<Value>>;
}
