// SPDX-License-Identifier: MIT OR Apache-2.0

//! Legacy document formats and migration records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Version stamped onto migrated documents.
pub const CURRENT_VERSION: &str = "3.0.0";

/// The dialect a document is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentFormat {
    /// Current structured schema
    Current,
    /// Oldest dialect: flat upper-case environment keys (`API_BASE_URL`, `DEBUG`)
    LegacyEnvironment,
    /// Tenant settings nested under a `tenant` object, without a version field
    LegacyNestedTenant,
    /// Flattened widget fields with a bare string theme
    LegacyFlatWidget,
    /// Not recognized
    Unknown,
}

impl DocumentFormat {
    /// Returns the format label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Current => "current",
            DocumentFormat::LegacyEnvironment => "legacy-environment",
            DocumentFormat::LegacyNestedTenant => "legacy-nested-tenant",
            DocumentFormat::LegacyFlatWidget => "legacy-flat-widget",
            DocumentFormat::Unknown => "unknown",
        }
    }

    /// The schema version the dialect corresponds to.
    pub fn version(&self) -> &'static str {
        match self {
            DocumentFormat::Current => CURRENT_VERSION,
            DocumentFormat::LegacyEnvironment => "1.0.0",
            DocumentFormat::LegacyNestedTenant => "2.0.0",
            DocumentFormat::LegacyFlatWidget => "2.5.0",
            DocumentFormat::Unknown => "0.0.0",
        }
    }

    /// Returns `true` for legacy dialects.
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            DocumentFormat::LegacyEnvironment
                | DocumentFormat::LegacyNestedTenant
                | DocumentFormat::LegacyFlatWidget
        )
    }

    /// How much work upgrading the dialect takes.
    pub fn complexity(&self) -> MigrationComplexity {
        match self {
            DocumentFormat::LegacyEnvironment => MigrationComplexity::Low,
            DocumentFormat::LegacyNestedTenant => MigrationComplexity::Medium,
            DocumentFormat::LegacyFlatWidget => MigrationComplexity::High,
            DocumentFormat::Current | DocumentFormat::Unknown => MigrationComplexity::None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative effort of a migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationComplexity {
    /// Nothing to do
    None,
    /// Field renames
    Low,
    /// Restructuring
    Medium,
    /// Restructuring plus value upgrades
    High,
}

/// Result of format detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityInfo {
    /// Detected dialect
    pub format: DocumentFormat,
    /// Whether the document can be used (possibly after migration)
    pub compatible: bool,
    /// Whether migration is needed
    pub requires_migration: bool,
    /// Migration effort
    pub migration_complexity: MigrationComplexity,
    /// Marker fields that drove detection
    pub markers: Vec<String>,
}

impl CompatibilityInfo {
    /// Compatibility info for an unrecognized document.
    pub fn unknown() -> Self {
        Self {
            format: DocumentFormat::Unknown,
            compatible: false,
            requires_migration: false,
            migration_complexity: MigrationComplexity::None,
            markers: Vec::new(),
        }
    }
}

/// How a migration is carried out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationStrategy {
    /// Back up, transform and validate
    #[default]
    Automatic,
    /// Like automatic, but every transformer's self-check must pass
    Conservative,
    /// Validate only; never transform and never back up
    ValidationOnly,
}

/// The plan for one migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    /// Whether any transformation will run
    pub enabled: bool,
    /// Version of the detected dialect
    pub source_version: String,
    /// Version produced
    pub target_version: String,
    /// Transformer names in application order
    pub transformers: Vec<String>,
    /// Whether the original is backed up first
    pub backup_original: bool,
}

/// The outcome of a migration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// Whether the migration succeeded
    pub success: bool,
    /// The migrated document, on success
    pub migrated_config: Option<Value>,
    /// Machine-readable failures
    pub errors: Vec<String>,
    /// Operator-readable log
    pub migration_log: Vec<String>,
    /// Where the original was backed up
    pub backup_path: Option<String>,
}

/// Describes a registered transformer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerDescriptor {
    /// Unique name
    pub name: String,
    /// What it does
    pub description: String,
    /// Transformer version
    pub version: String,
    /// Whether it carries a self-check predicate
    pub has_validation: bool,
}
