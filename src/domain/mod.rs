// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain layer containing core types.
//!
//! This module holds the records the trust pipeline works with: environments,
//! documents and paths, schemas, validated configurations, access-control
//! records, encrypted blobs, migration records, settings and errors. It has no
//! knowledge of clocks, storage or watchers; those live behind ports.

pub mod access;
pub mod config_path;
pub mod crypto;
pub mod document;
pub mod environment;
pub mod errors;
pub mod migration;
pub mod schema;
pub mod settings;
pub mod validated;

// Re-export commonly used types
pub use access::{
    AccessRequest, AccessResult, AuditEntry, ConditionOperator, ConditionType, EnvironmentScope,
    Permission, PermissionCondition, Role, RoleUpdate, Session, SessionOptions, TenantScope, User,
};
pub use config_path::ConfigPath;
pub use crypto::{
    BlobMetadata, DecryptedDocument, EncryptedBlob, EncryptionContext, IntegrityReport,
    KeyMetadata, MasterKey,
};
pub use document::ConfigurationDocument;
pub use environment::Environment;
pub use errors::{Result, TrustError};
pub use migration::{
    CompatibilityInfo, DocumentFormat, MigrationComplexity, MigrationConfig, MigrationResult,
    MigrationStrategy, TransformerDescriptor,
};
pub use schema::{
    PropertySchema, Schema, SchemaRegistry, StringFormat, ValidationIssue, ValidationOptions,
    ValidationReport, ValueType,
};
pub use settings::{
    AccessSettings, CacheSettings, EncryptionSettings, SanitizerSettings, TrustSettings,
};
pub use validated::ValidatedConfiguration;
