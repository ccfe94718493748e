// SPDX-License-Identifier: MIT OR Apache-2.0

//! The trust pipeline.
//!
//! Wires the five managers together so untrusted documents pass through one
//! path: access check, format detection, sanitization, migration when the
//! document is legacy, then validation and caching.

use crate::adapters::{MemoryBackupStore, SystemClock};
use crate::domain::schema::{SchemaRegistry, ENVIRONMENT_SCHEMA};
use crate::domain::{
    AccessRequest, AccessResult, DecryptedDocument, DocumentFormat, EncryptedBlob,
    EncryptionContext, Environment, MasterKey, MigrationResult, MigrationStrategy, Result, Role,
    RoleUpdate, TrustError, TrustSettings, User, ValidatedConfiguration, ValidationOptions,
};
use crate::ports::{BackupStore, Clock, DefaultsSource};
use crate::service::{
    AccessControlManager, ConfigurationManager, EncryptionEngine, InheritanceRule,
    MigrationManager, SanitizationContext, SanitizationResult, Sanitizer,
};
use serde_json::Value;
use std::sync::Arc;

/// Resource name checked by configuration operations.
pub const CONFIGURATION_RESOURCE: &str = "configuration";

/// Resource name checked by role administration.
pub const ROLES_RESOURCE: &str = "roles";

/// Resource name checked by user administration.
pub const USERS_RESOURCE: &str = "users";

/// Role and user administration spans every environment, so it needs
/// authority in the strictest one.
const ADMINISTRATION_ENVIRONMENT: Environment = Environment::Production;

/// What [`TrustPipeline::submit`] produced.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The validated, cached configuration
    pub configuration: Arc<ValidatedConfiguration>,
    /// Detected input dialect
    pub format: DocumentFormat,
    /// The sanitization pass that gated the document
    pub sanitization: SanitizationResult,
    /// The migration, when the document was legacy
    pub migration: Option<MigrationResult>,
}

/// The managers behind one entry point.
///
/// # Examples
///
/// ```rust
/// use trustcfg::domain::{Environment, User};
/// use trustcfg::service::{SanitizationContext, TrustPipeline};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> trustcfg::domain::Result<()> {
/// let pipeline = TrustPipeline::builder().build();
/// pipeline.access().create_user(User::new("ops").with_role("operator"))?;
///
/// let legacy = json!({
///     "API_BASE_URL": "https://api.example.com",
///     "DEBUG": false,
///     "LOG_LEVEL": "error",
/// });
/// let context = SanitizationContext::new(Environment::Production)
///     .with_allowed_domains(["example.com"]);
/// let outcome = pipeline.submit("ops", &legacy, "runtime", &context).await?;
/// assert_eq!(outcome.configuration.get("security.enforceHTTPS"), Some(&json!(true)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TrustPipeline {
    sanitizer: Sanitizer,
    encryption: EncryptionEngine,
    configuration: ConfigurationManager,
    migration: MigrationManager,
    access: AccessControlManager,
}

impl TrustPipeline {
    /// Creates a builder.
    pub fn builder() -> TrustPipelineBuilder {
        TrustPipelineBuilder::new()
    }

    /// The sanitizer.
    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// The encryption engine.
    pub fn encryption(&self) -> &EncryptionEngine {
        &self.encryption
    }

    /// The configuration manager.
    pub fn configuration(&self) -> &ConfigurationManager {
        &self.configuration
    }

    /// The migration manager.
    pub fn migration(&self) -> &MigrationManager {
        &self.migration
    }

    /// The access control manager.
    ///
    /// Calls made through it are not gated; use it to bootstrap the first
    /// administrator and for lookups. The `TrustPipeline` wrappers check the
    /// acting user first.
    pub fn access(&self) -> &AccessControlManager {
        &self.access
    }

    fn authorize(
        &self,
        actor: &str,
        action: &str,
        environment: Environment,
        tenant: Option<&str>,
    ) -> Result<AccessResult> {
        self.authorize_on(CONFIGURATION_RESOURCE, actor, action, environment, tenant)
    }

    fn authorize_admin(&self, resource: &str, actor: &str, action: &str) -> Result<AccessResult> {
        self.authorize_on(resource, actor, action, ADMINISTRATION_ENVIRONMENT, None)
    }

    fn authorize_on(
        &self,
        resource: &str,
        actor: &str,
        action: &str,
        environment: Environment,
        tenant: Option<&str>,
    ) -> Result<AccessResult> {
        let mut request = AccessRequest::new(actor, resource, action, environment);
        request.tenant_hash = tenant.map(str::to_string);
        let result = self.access.check_access(&request);
        if result.granted {
            Ok(result)
        } else {
            Err(TrustError::AccessDenied {
                reason: result.reason,
            })
        }
    }

    fn sanitize_or_reject(
        &self,
        document: &Value,
        schema_type: &str,
        context: &SanitizationContext,
    ) -> Result<SanitizationResult> {
        let result = self.sanitizer.sanitize(document, schema_type, context);
        if result.is_valid {
            Ok(result)
        } else {
            Err(TrustError::ValidationFailed {
                schema_type: schema_type.to_string(),
                errors: result.error_messages(),
            })
        }
    }

    /// Accepts an untrusted document on behalf of `actor`.
    ///
    /// The actor needs `configuration:write` in the context's environment
    /// (and tenant, if given). Flat environment documents are sanitized
    /// before migration; other legacy dialects are migrated first and the
    /// result sanitized.
    pub async fn submit(
        &self,
        actor: &str,
        document: &Value,
        schema_type: &str,
        context: &SanitizationContext,
    ) -> Result<SubmitOutcome> {
        let environment = context.environment;
        self.authorize(actor, "write", environment, context.tenant_hash.as_deref())?;
        self.configuration.registry().require(schema_type)?;

        let info = self.migration.detect_legacy_format(document);
        let format = info.format;

        let (sanitization, migration, accepted) =
            if format == DocumentFormat::Unknown || self.migration.is_native(format, schema_type) {
                let sanitization = self.sanitize_or_reject(document, schema_type, context)?;
                let accepted = sanitization.sanitized.clone();
                (sanitization, None, accepted)
            } else if format == DocumentFormat::LegacyEnvironment {
                let sanitization = self.sanitize_or_reject(document, ENVIRONMENT_SCHEMA, context)?;
                let mut flat = sanitization.sanitized.clone();
                if flat.get("ENVIRONMENT").is_none() {
                    flat["ENVIRONMENT"] = Value::from(environment.as_str());
                }
                let migration = self.migrate(&flat, schema_type).await?;
                let accepted = migration.migrated_config.clone().unwrap_or_default();
                (sanitization, Some(migration), accepted)
            } else {
                let migration = self.migrate(document, schema_type).await?;
                let migrated = migration.migrated_config.clone().unwrap_or_default();
                let sanitization = self.sanitize_or_reject(&migrated, schema_type, context)?;
                let accepted = sanitization.sanitized.clone();
                (sanitization, Some(migration), accepted)
            };

        let options = ValidationOptions {
            strict_mode: context
                .strict_mode
                .unwrap_or(self.sanitizer.settings().strict_mode),
            allow_unknown_properties: false,
        };
        let configuration =
            self.configuration
                .ingest_document(schema_type, environment, accepted, options)?;

        tracing::info!(
            actor,
            schema_type,
            environment = %environment,
            format = %format,
            warnings = sanitization.warnings.len(),
            "accepted configuration"
        );
        Ok(SubmitOutcome {
            configuration,
            format,
            sanitization,
            migration,
        })
    }

    async fn migrate(&self, document: &Value, schema_type: &str) -> Result<MigrationResult> {
        let result = self
            .migration
            .migrate_configuration(document, schema_type, MigrationStrategy::Automatic)
            .await;
        if result.success {
            Ok(result)
        } else {
            Err(TrustError::ValidationFailed {
                schema_type: schema_type.to_string(),
                errors: result.errors,
            })
        }
    }

    /// Makes the original behind a migration backup the active configuration
    /// again, on behalf of `actor`, who needs `configuration:write` in the
    /// context's environment.
    ///
    /// The restored document is sanitized and validated like any submission.
    pub async fn rollback(
        &self,
        actor: &str,
        backup_path: &str,
        schema_type: &str,
        context: &SanitizationContext,
    ) -> Result<Arc<ValidatedConfiguration>> {
        let environment = context.environment;
        self.authorize(actor, "write", environment, context.tenant_hash.as_deref())?;

        let restored = self.migration.restore_backup(backup_path, schema_type).await?;
        let sanitization = self.sanitize_or_reject(&restored, schema_type, context)?;
        let options = ValidationOptions {
            strict_mode: context
                .strict_mode
                .unwrap_or(self.sanitizer.settings().strict_mode),
            allow_unknown_properties: false,
        };
        let configuration = self.configuration.ingest_document(
            schema_type,
            environment,
            sanitization.sanitized,
            options,
        )?;
        tracing::info!(
            actor,
            backup_path,
            schema_type,
            environment = %environment,
            "rolled back configuration"
        );
        Ok(configuration)
    }

    /// Adds an inheritance rule on behalf of `actor`, who needs
    /// `configuration:write` in the rule's target environment.
    pub fn register_inheritance_rule(&self, actor: &str, rule: InheritanceRule) -> Result<()> {
        self.authorize(actor, "write", rule.target_environment, None)?;
        self.configuration.register_inheritance_rule(rule)
    }

    /// Creates a custom role; `actor` needs `roles:create`.
    pub fn create_role(&self, actor: &str, role: Role) -> Result<Role> {
        self.authorize_admin(ROLES_RESOURCE, actor, "create")?;
        self.access.create_role(role)
    }

    /// Updates a custom role; `actor` needs `roles:update`.
    pub fn update_role(&self, actor: &str, role_id: &str, update: RoleUpdate) -> Result<Role> {
        self.authorize_admin(ROLES_RESOURCE, actor, "update")?;
        self.access.update_role(role_id, update)
    }

    /// Deletes a custom role; `actor` needs `roles:delete`.
    pub fn delete_role(&self, actor: &str, role_id: &str) -> Result<()> {
        self.authorize_admin(ROLES_RESOURCE, actor, "delete")?;
        self.access.delete_role(role_id)
    }

    /// Registers a user; `actor` needs `users:create`.
    pub fn create_user(&self, actor: &str, user: User) -> Result<User> {
        self.authorize_admin(USERS_RESOURCE, actor, "create")?;
        self.access.create_user(user)
    }

    /// Gives a role to a user; `actor` needs `users:update`.
    pub fn assign_role(&self, actor: &str, user_id: &str, role_id: &str) -> Result<()> {
        self.authorize_admin(USERS_RESOURCE, actor, "update")?;
        self.access.assign_role(user_id, role_id)
    }

    /// Takes a role from a user; `actor` needs `users:update`.
    pub fn revoke_role(&self, actor: &str, user_id: &str, role_id: &str) -> Result<bool> {
        self.authorize_admin(USERS_RESOURCE, actor, "update")?;
        self.access.revoke_role(user_id, role_id)
    }

    /// Adds a tenant to a user's access set; `actor` needs `users:update`.
    pub fn grant_tenant_access(&self, actor: &str, user_id: &str, tenant_hash: &str) -> Result<()> {
        self.authorize_admin(USERS_RESOURCE, actor, "update")?;
        self.access.grant_tenant_access(user_id, tenant_hash)
    }

    /// Activates or deactivates a user; `actor` needs `users:update`.
    pub fn set_user_active(&self, actor: &str, user_id: &str, active: bool) -> Result<()> {
        self.authorize_admin(USERS_RESOURCE, actor, "update")?;
        self.access.set_user_active(user_id, active)
    }

    /// Encrypts a validated configuration on behalf of `actor`, who needs
    /// `configuration:encrypt` in its environment.
    pub async fn seal(
        &self,
        actor: &str,
        configuration: &ValidatedConfiguration,
        master_key: &MasterKey,
        tenant: Option<&str>,
    ) -> Result<EncryptedBlob> {
        let environment = configuration.environment();
        self.authorize(actor, "encrypt", environment, tenant)?;
        let mut context = EncryptionContext::new(environment, configuration.schema_type());
        context.tenant = tenant.map(str::to_string);
        self.encryption
            .encrypt(configuration.payload(), master_key, &context)
            .await
    }

    /// Decrypts `blob` on behalf of `actor`, who needs
    /// `configuration:decrypt` in the context's environment.
    pub async fn unseal(
        &self,
        actor: &str,
        blob: &EncryptedBlob,
        master_key: &MasterKey,
        context: &EncryptionContext,
    ) -> Result<DecryptedDocument> {
        self.authorize(actor, "decrypt", context.environment, context.tenant.as_deref())?;
        self.encryption.decrypt(blob, master_key, context).await
    }
}

/// Builder for [`TrustPipeline`].
///
/// All managers share one schema registry and one clock.
pub struct TrustPipelineBuilder {
    settings: TrustSettings,
    clock: Arc<dyn Clock>,
    backups: Option<Arc<dyn BackupStore>>,
    defaults_source: Option<Arc<dyn DefaultsSource>>,
}

impl TrustPipelineBuilder {
    /// Creates a builder with default settings, the system clock and an
    /// in-memory backup store.
    pub fn new() -> Self {
        Self {
            settings: TrustSettings::default(),
            clock: Arc::new(SystemClock),
            backups: None,
            defaults_source: None,
        }
    }

    /// Replaces all settings.
    pub fn with_settings(mut self, settings: TrustSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the shared clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets where migration backups go.
    pub fn with_backup_store(mut self, backups: Arc<dyn BackupStore>) -> Self {
        self.backups = Some(backups);
        self
    }

    /// Adds a remote defaults source.
    pub fn with_defaults_source(mut self, source: Arc<dyn DefaultsSource>) -> Self {
        self.defaults_source = Some(source);
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> TrustPipeline {
        let registry = Arc::new(SchemaRegistry::with_builtin_schemas());
        let backups = self
            .backups
            .unwrap_or_else(|| Arc::new(MemoryBackupStore::new()));

        let mut configuration = ConfigurationManager::builder()
            .with_registry(Arc::clone(&registry))
            .with_cache_settings(self.settings.cache)
            .with_clock(Arc::clone(&self.clock));
        if let Some(source) = self.defaults_source {
            configuration = configuration.with_defaults_source(source);
        }

        TrustPipeline {
            sanitizer: Sanitizer::new(Arc::clone(&registry), self.settings.sanitizer),
            encryption: EncryptionEngine::with_clock(self.settings.encryption, Arc::clone(&self.clock)),
            configuration: configuration.build(),
            migration: MigrationManager::with_store(Arc::clone(&registry), backups),
            access: AccessControlManager::with_settings(self.settings.access, self.clock),
        }
    }
}

impl Default for TrustPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
