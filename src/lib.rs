// SPDX-License-Identifier: MIT OR Apache-2.0

//! A hexagonal architecture configuration trust pipeline.
//!
//! This crate sits between untrusted configuration documents and the code
//! that consumes them. Documents are sanitized against declarative schemas,
//! legacy dialects are migrated, results are validated against structure and
//! environment security policy, and the outcome is cached as a
//! [`ValidatedConfiguration`](domain::ValidatedConfiguration) that only this
//! crate can construct. Configuration can be sealed with authenticated
//! encryption bound to its context, and every operation can be gated by
//! role-based access control with an audit trail.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain Layer**: Core records and rules (environments, schemas, blobs, roles, errors)
//! - **Ports**: Trait definitions for the outside world (`Clock`, `BackupStore`, `DefaultsSource`, `DocumentWatcher`)
//! - **Adapters**: Implementations of the ports (clocks, memory and file backups, file watching)
//! - **Service**: The sanitizer, encryption engine, configuration, migration and access control managers, and the pipeline that wires them
//!
//! # Feature Flags
//!
//! - `yaml`: Load [`TrustSettings`](domain::TrustSettings) from YAML and watch YAML documents (default)
//! - `reload`: Hot reload documents from disk with a debounced file watcher
//! - `full`: Enable all features
//!
//! # Quick Start
//!
//! ```rust
//! use trustcfg::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> trustcfg::domain::Result<()> {
//! let pipeline = TrustPipeline::builder().build();
//! pipeline.access().create_user(User::new("dev").with_role("developer"))?;
//!
//! let context = SanitizationContext::new(Environment::Development);
//! let outcome = pipeline
//!     .submit("dev", &json!({ "API_BASE_URL": "http://localhost:3000", "DEBUG": true }), "runtime", &context)
//!     .await?;
//!
//! assert_eq!(outcome.configuration.get("logging.level"), Some(&json!("debug")));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Commonly used types and traits.
///
/// This module re-exports the most commonly used types and traits for convenient access.
pub mod prelude {
    pub use crate::domain::{
        AccessRequest, AccessResult, EncryptedBlob, EncryptionContext, Environment, MasterKey,
        MigrationStrategy, Result, Role, TrustError, TrustSettings, User, ValidatedConfiguration,
        ValidationOptions,
    };
    pub use crate::ports::{BackupStore, Clock, DefaultsSource, DocumentWatcher};
    pub use crate::service::{
        AccessControlManager, ConfigurationManager, EncryptionEngine, InheritanceRule,
        InheritanceStrategy, LoadOptions, MigrationManager, SanitizationContext, Sanitizer,
        TrustPipeline,
    };

    pub use crate::adapters::{FileBackupStore, MemoryBackupStore, SystemClock};
    #[cfg(feature = "reload")]
    pub use crate::adapters::FileWatcher;
}
