// SPDX-License-Identifier: MIT OR Apache-2.0

//! The migration manager.
//!
//! Recognises legacy document dialects and upgrades them to the current
//! schemas through ordered chains of [`Transformer`]s. Originals are backed up
//! through a [`BackupStore`] and never modified.

use crate::adapters::MemoryBackupStore;
use crate::domain::migration::CURRENT_VERSION;
use crate::domain::schema::{validate_structure, SchemaRegistry, ENVIRONMENT_SCHEMA, RUNTIME_SCHEMA, TENANT_SCHEMA};
use crate::domain::{
    CompatibilityInfo, DocumentFormat, MigrationConfig, MigrationResult, MigrationStrategy, Result,
    TransformerDescriptor, TrustError, ValidationOptions,
};
use crate::ports::BackupStore;
use crate::service::transformers::{
    builtin_transformers, Transformer, ENVIRONMENT_TO_RUNTIME, FLAT_WIDGET_RESTRUCTURE,
    NESTED_TENANT_FLATTEN, STAMP_VERSION, THEME_UPGRADE,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

const ENVIRONMENT_MARKERS: [&str; 7] = [
    "API_BASE_URL",
    "CDN_URL",
    "ENVIRONMENT",
    "DEBUG",
    "API_TIMEOUT",
    "RETRY_ATTEMPTS",
    "LOG_LEVEL",
];

const FLAT_WIDGET_MARKERS: [&str; 3] = ["widgetPosition", "widgetSize", "widgetEnabled"];

/// Detects and upgrades legacy configuration documents.
///
/// # Examples
///
/// ```rust
/// use trustcfg::domain::{DocumentFormat, MigrationStrategy};
/// use trustcfg::service::MigrationManager;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = MigrationManager::new();
/// let legacy = json!({ "API_BASE_URL": "http://localhost:3000", "DEBUG": true });
/// assert_eq!(manager.detect_legacy_format(&legacy).format, DocumentFormat::LegacyEnvironment);
///
/// let result = manager
///     .migrate_configuration(&legacy, "runtime", MigrationStrategy::Automatic)
///     .await;
/// assert!(result.success);
/// let migrated = result.migrated_config.unwrap();
/// assert_eq!(migrated["security"]["allowInsecure"], true);
/// assert_eq!(migrated["logging"]["level"], "debug");
/// # }
/// ```
pub struct MigrationManager {
    registry: Arc<SchemaRegistry>,
    backups: Arc<dyn BackupStore>,
    transformers: RwLock<Vec<Transformer>>,
    paths: RwLock<HashMap<(DocumentFormat, String), Vec<String>>>,
}

impl fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationManager")
            .field("backups", &self.backups.name())
            .field("transformers", &self.get_available_transformers().len())
            .finish_non_exhaustive()
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    /// Creates a manager with the built-in schemas, transformers and an
    /// in-memory backup store.
    pub fn new() -> Self {
        Self::with_store(
            Arc::new(SchemaRegistry::with_builtin_schemas()),
            Arc::new(MemoryBackupStore::new()),
        )
    }

    /// Creates a manager sharing `registry` and writing backups to `backups`.
    pub fn with_store(registry: Arc<SchemaRegistry>, backups: Arc<dyn BackupStore>) -> Self {
        let mut paths = HashMap::new();
        paths.insert(
            (DocumentFormat::LegacyEnvironment, RUNTIME_SCHEMA.to_string()),
            vec![ENVIRONMENT_TO_RUNTIME.to_string(), STAMP_VERSION.to_string()],
        );
        paths.insert(
            (DocumentFormat::LegacyNestedTenant, TENANT_SCHEMA.to_string()),
            vec![
                NESTED_TENANT_FLATTEN.to_string(),
                THEME_UPGRADE.to_string(),
                STAMP_VERSION.to_string(),
            ],
        );
        paths.insert(
            (DocumentFormat::LegacyFlatWidget, TENANT_SCHEMA.to_string()),
            vec![
                FLAT_WIDGET_RESTRUCTURE.to_string(),
                THEME_UPGRADE.to_string(),
                STAMP_VERSION.to_string(),
            ],
        );

        Self {
            registry,
            backups,
            transformers: RwLock::new(builtin_transformers()),
            paths: RwLock::new(paths),
        }
    }

    /// Classifies `document` by its marker fields. Never fails.
    pub fn detect_legacy_format(&self, document: &Value) -> CompatibilityInfo {
        let Some(map) = document.as_object().filter(|m| !m.is_empty()) else {
            return CompatibilityInfo::unknown();
        };
        let present = |keys: &[&str]| -> Vec<String> {
            keys.iter()
                .filter(|k| map.contains_key(**k))
                .map(|k| k.to_string())
                .collect()
        };

        let (format, markers) = if !present(&ENVIRONMENT_MARKERS[..]).is_empty() {
            (DocumentFormat::LegacyEnvironment, present(&ENVIRONMENT_MARKERS[..]))
        } else if map.get("tenant").map(Value::is_object).unwrap_or(false)
            && !map.contains_key("version")
        {
            (DocumentFormat::LegacyNestedTenant, vec!["tenant".to_string()])
        } else if map.get("theme").map(Value::is_string).unwrap_or(false)
            || !present(&FLAT_WIDGET_MARKERS[..]).is_empty()
        {
            let mut markers = present(&FLAT_WIDGET_MARKERS[..]);
            if map.contains_key("theme") {
                markers.push("theme".to_string());
            }
            (DocumentFormat::LegacyFlatWidget, markers)
        } else if map.contains_key("version")
            && (map.get("widget").map(Value::is_object).unwrap_or(false)
                || map.get("api").map(Value::is_object).unwrap_or(false))
        {
            (DocumentFormat::Current, vec!["version".to_string()])
        } else {
            return CompatibilityInfo::unknown();
        };

        CompatibilityInfo {
            format,
            compatible: true,
            requires_migration: format.is_legacy(),
            migration_complexity: format.complexity(),
            markers,
        }
    }

    /// Plans a migration of `format` documents to `target_schema_type`.
    ///
    /// The plan is disabled when nothing needs to run, no path is known, or
    /// the strategy only validates.
    pub fn create_migration_config(
        &self,
        format: DocumentFormat,
        target_schema_type: &str,
        strategy: MigrationStrategy,
    ) -> MigrationConfig {
        let transformers = self.path_for(format, target_schema_type).unwrap_or_default();
        MigrationConfig {
            enabled: strategy != MigrationStrategy::ValidationOnly && !transformers.is_empty(),
            source_version: format.version().to_string(),
            target_version: CURRENT_VERSION.to_string(),
            transformers,
            backup_original: strategy != MigrationStrategy::ValidationOnly,
        }
    }

    /// Migrates `document` to `target_schema_type`.
    ///
    /// Failures are reported in the result; `migration_log` keeps every
    /// entry up to the point of failure.
    pub async fn migrate_configuration(
        &self,
        document: &Value,
        target_schema_type: &str,
        strategy: MigrationStrategy,
    ) -> MigrationResult {
        self.run_migration(document, target_schema_type, strategy, true)
            .await
    }

    async fn run_migration(
        &self,
        document: &Value,
        target_schema_type: &str,
        strategy: MigrationStrategy,
        backup: bool,
    ) -> MigrationResult {
        let mut run = Run::default();

        let info = self.detect_legacy_format(document);
        run.log(format!(
            "Detected format {} (version {}, complexity {:?})",
            info.format,
            info.format.version(),
            info.migration_complexity
        ));

        let Some(schema) = self.registry.get(target_schema_type) else {
            return run.fail(format!("Unknown schema type: {}", target_schema_type));
        };
        if info.format == DocumentFormat::Unknown {
            return run.fail("Unrecognized document format".to_string());
        }

        let config = self.create_migration_config(info.format, target_schema_type, strategy);
        if backup && config.backup_original {
            match self.backups.save(target_schema_type, document).await {
                Ok(path) => {
                    run.log(format!("Backed up original to {}", path));
                    run.backup_path = Some(path);
                }
                Err(e) => return run.fail(format!("Backup failed: {}", e)),
            }
        }

        let mut current = document.clone();
        if strategy == MigrationStrategy::ValidationOnly {
            run.log("Validation only; no transformers applied".to_string());
        } else if info.requires_migration && config.transformers.is_empty() {
            return run.fail(format!(
                "No migration path from {} to {}",
                info.format, target_schema_type
            ));
        } else {
            for name in &config.transformers {
                let Some(transformer) = self.transformer(name) else {
                    return run.fail(format!("Unknown transformer: {}", name));
                };
                if strategy == MigrationStrategy::Conservative && !transformer.has_validation() {
                    return run.fail(format!(
                        "Transformer {} has no precondition; conservative migration requires one",
                        name
                    ));
                }
                if !transformer.precondition(&current) {
                    return run.fail(format!("Precondition failed for transformer {}", name));
                }
                match transformer.apply(&current) {
                    Ok(next) => {
                        current = next;
                        run.log(format!("Applied {}", name));
                    }
                    Err(message) => {
                        return run.fail(format!("Transformer {} failed: {}", name, message))
                    }
                }
            }
        }

        let report = validate_structure(&current, &schema, ValidationOptions::lenient());
        for warning in &report.warnings {
            run.log(format!("Validation warning: {}", warning.message));
        }
        if !report.is_valid {
            run.errors.extend(report.error_messages());
            return run.fail(format!(
                "Migrated document failed {} validation",
                target_schema_type
            ));
        }

        run.log(format!("Migration to {} complete", target_schema_type));
        tracing::info!(
            format = %info.format,
            target = target_schema_type,
            steps = config.transformers.len(),
            "migrated configuration"
        );
        run.succeed(current)
    }

    /// Rebuilds a `schema_type` configuration from the original document
    /// backed up at `backup_path`.
    ///
    /// Current-format originals are returned as stored; legacy ones are run
    /// through their migration path again. Either way the result has passed
    /// `schema_type` validation. Nothing is written to the backup store.
    pub async fn restore_backup(&self, backup_path: &str, schema_type: &str) -> Result<Value> {
        if backup_path.trim().is_empty() {
            return Err(TrustError::backup("Backup path is empty"));
        }
        self.registry.require(schema_type)?;
        let original = self
            .backups
            .load(backup_path)
            .await?
            .ok_or_else(|| TrustError::backup(format!("No backup at {}", backup_path)))?;

        let info = self.detect_legacy_format(&original);
        if self.is_native(info.format, schema_type) {
            let schema = self.registry.require(schema_type)?;
            let report = validate_structure(&original, &schema, ValidationOptions::lenient());
            if !report.is_valid {
                return Err(TrustError::ValidationFailed {
                    schema_type: schema_type.to_string(),
                    errors: report.error_messages(),
                });
            }
            tracing::info!(backup_path, schema_type, "restored backup");
            return Ok(original);
        }

        let result = self
            .run_migration(&original, schema_type, MigrationStrategy::Automatic, false)
            .await;
        match result.migrated_config {
            Some(restored) if result.success => {
                tracing::info!(backup_path, schema_type, "restored backup");
                Ok(restored)
            }
            _ => Err(TrustError::ValidationFailed {
                schema_type: schema_type.to_string(),
                errors: result.errors,
            }),
        }
    }

    /// Whether the backup at `backup_path` restores to a valid `schema_type`
    /// configuration. Never fails; bad input yields `false`.
    ///
    /// Use [`TrustPipeline::rollback`](crate::service::TrustPipeline::rollback)
    /// to make the restored document the active configuration.
    pub async fn rollback_migration(&self, backup_path: &str, schema_type: &str) -> bool {
        match self.restore_backup(backup_path, schema_type).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(backup_path, schema_type, error = %e, "rollback unavailable");
                false
            }
        }
    }

    /// Loads the original document stored at `backup_path`.
    pub async fn load_backup(&self, backup_path: &str) -> Result<Option<Value>> {
        self.backups.load(backup_path).await
    }

    /// Registers a custom transformer.
    pub fn register_transformer(&self, transformer: Transformer) -> Result<()> {
        let mut transformers = self
            .transformers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if transformers.iter().any(|t| t.name() == transformer.name()) {
            return Err(TrustError::DuplicateTransformer {
                name: transformer.name().to_string(),
            });
        }
        tracing::debug!(name = transformer.name(), "registered transformer");
        transformers.push(transformer);
        Ok(())
    }

    /// Sets the transformer chain used to migrate `format` documents to
    /// `target_schema_type`. Every named transformer must be registered.
    pub fn register_migration_path(
        &self,
        format: DocumentFormat,
        target_schema_type: &str,
        transformers: Vec<String>,
    ) -> Result<()> {
        self.registry.require(target_schema_type)?;
        if let Some(missing) = transformers.iter().find(|n| self.transformer(n).is_none()) {
            return Err(TrustError::UnknownTransformer {
                name: missing.clone(),
            });
        }
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((format, target_schema_type.to_string()), transformers);
        Ok(())
    }

    /// Describes registered transformers in registration order.
    pub fn get_available_transformers(&self) -> Vec<TransformerDescriptor> {
        self.transformers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Transformer::descriptor)
            .collect()
    }

    /// Returns `true` when an environment-dialect document targets the
    /// environment schema directly and needs no migration.
    pub fn is_native(&self, format: DocumentFormat, target_schema_type: &str) -> bool {
        format == DocumentFormat::Current
            || (format == DocumentFormat::LegacyEnvironment && target_schema_type == ENVIRONMENT_SCHEMA)
    }

    fn transformer(&self, name: &str) -> Option<Transformer> {
        self.transformers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    fn path_for(&self, format: DocumentFormat, target_schema_type: &str) -> Option<Vec<String>> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(format, target_schema_type.to_string()))
            .cloned()
    }
}

#[derive(Default)]
struct Run {
    log: Vec<String>,
    errors: Vec<String>,
    backup_path: Option<String>,
}

impl Run {
    fn log(&mut self, entry: String) {
        tracing::debug!(entry = %entry, "migration step");
        self.log.push(entry);
    }

    fn fail(mut self, error: String) -> MigrationResult {
        tracing::warn!(error = %error, "migration failed");
        self.log.push(format!("Failed: {}", error));
        self.errors.push(error);
        MigrationResult {
            success: false,
            migrated_config: None,
            errors: self.errors,
            migration_log: self.log,
            backup_path: self.backup_path,
        }
    }

    fn succeed(self, migrated: Value) -> MigrationResult {
        MigrationResult {
            success: true,
            migrated_config: Some(migrated),
            errors: self.errors,
            migration_log: self.log,
            backup_path: self.backup_path,
        }
    }
}
