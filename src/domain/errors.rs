// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the trust pipeline.
//!
//! Management operations (schema, role, user and inheritance registration),
//! key handling and backup persistence signal failure through [`TrustError`].
//! Sanitization, validation, authorization and migration never fail with an
//! error for data problems; they return structured result objects instead.

use thiserror::Error;

/// The main error type for trust pipeline operations.
///
/// Marked `#[non_exhaustive]` so new failure causes can be added without
/// breaking callers.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::errors::TrustError;
///
/// let error = TrustError::UnknownSchema {
///     schema_type: "widget".to_string(),
/// };
/// assert_eq!(error.to_string(), "Unknown schema type: widget");
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrustError {
    /// The requested schema type is not registered.
    #[error("Unknown schema type: {schema_type}")]
    UnknownSchema {
        /// The schema type that was requested
        schema_type: String,
    },

    /// A schema could not be registered.
    #[error("Invalid schema '{schema_type}': {message}")]
    InvalidSchema {
        /// The schema type being registered
        schema_type: String,
        /// Why the schema was rejected
        message: String,
    },

    /// A configuration document failed validation.
    #[error("Configuration '{schema_type}' failed validation: {}", .errors.join("; "))]
    ValidationFailed {
        /// The schema type that was validated against
        schema_type: String,
        /// Itemised validation errors
        errors: Vec<String>,
    },

    /// An inheritance rule is malformed.
    #[error("Invalid inheritance rule: {message}")]
    InvalidInheritanceRule {
        /// Why the rule was rejected
        message: String,
    },

    /// An inheritance rule would introduce a cycle.
    #[error("Circular dependency detected: {source_env} -> {target_env} closes a cycle")]
    CircularDependency {
        /// Source environment of the rejected rule
        source_env: String,
        /// Target environment of the rejected rule
        target_env: String,
    },

    /// A transformer with the same name is already registered.
    #[error("Transformer already registered: {name}")]
    DuplicateTransformer {
        /// The conflicting transformer name
        name: String,
    },

    /// A migration path names a transformer that is not registered.
    #[error("Unknown transformer: {name}")]
    UnknownTransformer {
        /// The missing transformer name
        name: String,
    },

    /// The requested role does not exist.
    #[error("Role not found: {role_id}")]
    RoleNotFound {
        /// The missing role id
        role_id: String,
    },

    /// A role with the same id already exists.
    #[error("Role already exists: {role_id}")]
    DuplicateRole {
        /// The conflicting role id
        role_id: String,
    },

    /// System roles cannot be created, updated or deleted.
    #[error("System role '{role_id}' cannot be modified")]
    SystemRoleImmutable {
        /// The system role id
        role_id: String,
    },

    /// A role cannot be deleted while users still hold it.
    #[error("Role '{role_id}' is still assigned to {user_count} user(s)")]
    RoleInUse {
        /// The role id
        role_id: String,
        /// Number of users holding the role
        user_count: usize,
    },

    /// A role definition is malformed.
    #[error("Invalid role '{role_id}': {message}")]
    InvalidRole {
        /// The role id
        role_id: String,
        /// Why the role was rejected
        message: String,
    },

    /// The requested user does not exist.
    #[error("User not found: {user_id}")]
    UserNotFound {
        /// The missing user id
        user_id: String,
    },

    /// A user with the same id already exists.
    #[error("User already exists: {user_id}")]
    DuplicateUser {
        /// The conflicting user id
        user_id: String,
    },

    /// The user account is deactivated.
    #[error("User account is inactive: {user_id}")]
    InactiveUser {
        /// The inactive user id
        user_id: String,
    },

    /// A tenant identifier does not match the accepted format.
    #[error("Invalid tenant identifier: {tenant}")]
    InvalidTenant {
        /// The rejected tenant identifier
        tenant: String,
    },

    /// Session parameters cannot produce a usable session.
    #[error("Invalid session: {message}")]
    InvalidSession {
        /// What was wrong with the request
        message: String,
    },

    /// An operation was refused by access control.
    #[error("Access denied: {reason}")]
    AccessDenied {
        /// Human-readable reason from the access decision
        reason: String,
    },

    /// Decryption failed.
    ///
    /// Deliberately carries no detail: bad keys, tampered bytes, context
    /// mismatches and unsupported algorithms are indistinguishable.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Encryption failed.
    #[error("Encryption failed: {message}")]
    EncryptionFailed {
        /// What went wrong
        message: String,
    },

    /// A key management operation failed.
    #[error("Key management error: {message}")]
    KeyManagement {
        /// What went wrong
        message: String,
    },

    /// A backup could not be written or read.
    #[error("Backup error: {message}")]
    BackupError {
        /// What went wrong
        message: String,
        /// The underlying error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A document watcher failed.
    #[error("Document watcher error: {message}")]
    WatcherError {
        /// What went wrong
        message: String,
        /// The underlying error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Settings could not be parsed.
    #[error("Failed to parse settings: {message}")]
    SettingsError {
        /// What went wrong
        message: String,
        /// The underlying parsing error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A JSON conversion failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TrustError {
    /// Creates a `BackupError` without an underlying cause.
    pub fn backup(message: impl Into<String>) -> Self {
        TrustError::BackupError {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `KeyManagement` error.
    pub fn key_management(message: impl Into<String>) -> Self {
        TrustError::KeyManagement {
            message: message.into(),
        }
    }

    /// Creates an `InvalidInheritanceRule` error.
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        TrustError::InvalidInheritanceRule {
            message: message.into(),
        }
    }
}

/// A specialized Result type for trust pipeline operations.
pub type Result<T> = std::result::Result<T, TrustError>;
