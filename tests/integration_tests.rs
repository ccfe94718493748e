// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the trust pipeline.
//!
//! These tests drive the managers through their public API the way an
//! application would: untrusted documents in, validated configurations and
//! sealed blobs out, with access control in front.

mod common;

use common::{
    fast_engine, legacy_environment, legacy_nested_tenant, staffed_pipeline, staging_runtime,
    OTHER_TENANT, TENANT,
};
use serde_json::json;
use std::sync::Arc;
use trustcfg::adapters::{FileBackupStore, ManualClock, StaticDefaults};
use trustcfg::domain::{
    AccessRequest, DocumentFormat, EncryptionContext, Environment, MigrationStrategy, Role,
    RoleUpdate, SessionOptions, TrustError, User, ValidationOptions,
};
use trustcfg::domain::{Permission, TenantScope};
use trustcfg::service::{
    AccessControlManager, ConfigurationManager, InheritanceRule, InheritanceStrategy, IssueCode,
    LoadOptions, MigrationManager, SanitizationContext, Sanitizer, TrustPipeline,
};

#[test]
fn test_insecure_url_rejected_in_production() {
    let sanitizer = Sanitizer::with_defaults();
    let context = SanitizationContext::new(Environment::Production);

    let result = sanitizer.sanitize(
        &json!({ "API_BASE_URL": "http://evil.test" }),
        "environment",
        &context,
    );

    assert!(!result.is_valid);
    assert!(result.has_error(IssueCode::InsecureUrl));
    assert_eq!(result.sanitized["API_BASE_URL"], json!(""));
}

#[tokio::test]
async fn test_blob_bound_to_environment() {
    let engine = fast_engine();
    let (key, _) = engine.generate_master_key(Environment::Production).unwrap();
    let sealed_for = EncryptionContext::new(Environment::Production, "runtime");

    let blob = engine
        .encrypt(&json!({ "api": { "baseUrl": "https://api.example.com" } }), &key, &sealed_for)
        .await
        .unwrap();

    let wrong = EncryptionContext::new(Environment::Staging, "runtime");
    assert!(matches!(
        engine.decrypt(&blob, &key, &wrong).await,
        Err(TrustError::DecryptionFailed)
    ));

    let opened = engine.decrypt(&blob, &key, &sealed_for).await.unwrap();
    assert_eq!(opened.data["api"]["baseUrl"], "https://api.example.com");
    assert_eq!(opened.metadata.environment, Environment::Production);
}

#[test]
fn test_inheritance_cycle_rejected() {
    let manager = ConfigurationManager::builder().build();
    manager
        .register_inheritance_rule(
            InheritanceRule::new(
                Environment::Development,
                Environment::Staging,
                InheritanceStrategy::Override,
            )
            .with_path("features"),
        )
        .unwrap();

    let err = manager
        .register_inheritance_rule(
            InheritanceRule::new(
                Environment::Staging,
                Environment::Development,
                InheritanceStrategy::Override,
            )
            .with_path("features"),
        )
        .unwrap_err();

    assert!(matches!(err, TrustError::CircularDependency { .. }));
    assert_eq!(manager.list_inheritance_rules().len(), 1);
}

#[tokio::test]
async fn test_legacy_debug_flag_migrates_to_permissive_runtime() {
    let migration = MigrationManager::new();

    let result = migration
        .migrate_configuration(
            &json!({ "API_BASE_URL": "http://localhost:3000", "DEBUG": true }),
            "runtime",
            MigrationStrategy::Automatic,
        )
        .await;

    assert!(result.success, "{:?}", result.errors);
    let migrated = result.migrated_config.unwrap();
    assert_eq!(migrated["security"]["allowInsecure"], json!(true));
    assert_eq!(migrated["logging"]["level"], json!("debug"));
    assert_eq!(migrated["version"], json!("3.0.0"));
    assert!(result.backup_path.is_some());
}

#[test]
fn test_tenant_scoped_role_follows_tenant() {
    let access = AccessControlManager::new();
    access
        .create_user(User::new("alice").with_role("tenant-admin").with_tenant(TENANT))
        .unwrap();

    let own = AccessRequest::new("alice", "configuration", "write", Environment::Staging)
        .for_tenant(TENANT);
    let other = AccessRequest::new("alice", "configuration", "write", Environment::Staging)
        .for_tenant(OTHER_TENANT);

    let granted = access.check_access(&own);
    assert!(granted.granted, "{}", granted.reason);
    assert_eq!(granted.matched_roles, vec!["tenant-admin".to_string()]);

    let denied = access.check_access(&other);
    assert!(!denied.granted);
    assert!(!denied.warnings.is_empty());
}

#[test]
fn test_role_deletion_guards() {
    let access = AccessControlManager::new();
    access
        .create_role(
            Role::new("release-manager", "Release Manager")
                .with_permission(Permission::new("configuration", "read")),
        )
        .unwrap();
    access
        .create_user(User::new("bob").with_role("release-manager"))
        .unwrap();

    assert!(matches!(
        access.delete_role("admin"),
        Err(TrustError::SystemRoleImmutable { .. })
    ));
    assert!(matches!(
        access.delete_role("release-manager"),
        Err(TrustError::RoleInUse { user_count: 1, .. })
    ));

    assert!(access.revoke_role("bob", "release-manager").unwrap());
    access.delete_role("release-manager").unwrap();
    assert!(access.get_role("release-manager").is_none());
}

#[tokio::test]
async fn test_submit_legacy_environment_end_to_end() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Development);

    let outcome = pipeline
        .submit("dev", &legacy_environment(), "runtime", &context)
        .await
        .unwrap();

    assert_eq!(outcome.format, DocumentFormat::LegacyEnvironment);
    assert!(outcome.sanitization.has_warning(IssueCode::TypeCoerced));
    let migration = outcome.migration.expect("legacy documents are migrated");
    assert!(migration.success);

    let config = outcome.configuration;
    assert_eq!(config.schema_type(), "runtime");
    assert_eq!(config.environment(), Environment::Development);
    assert_eq!(config.get("api.timeout"), Some(&json!(45000)));
    assert_eq!(config.get("api.retryAttempts"), Some(&json!(5)));
    assert_eq!(config.get("api.cdnUrl"), Some(&json!("http://localhost:3001")));
    assert_eq!(config.get("logging.level"), Some(&json!("debug")));

    // Accepted documents are what subsequent loads return.
    let loaded = pipeline
        .configuration()
        .load_configuration("runtime", Environment::Development, LoadOptions::default())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&loaded, &config));
}

#[tokio::test]
async fn test_submit_current_runtime_document() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Staging);

    let outcome = pipeline
        .submit("ops", &staging_runtime(), "runtime", &context)
        .await
        .unwrap();

    assert_eq!(outcome.format, DocumentFormat::Current);
    assert!(outcome.migration.is_none());
    assert_eq!(outcome.configuration.get("api.timeout"), Some(&json!(15000)));
}

#[tokio::test]
async fn test_submit_strips_markup_and_unknown_fields() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Staging).with_tenant(TENANT);
    let document = json!({
        "tenantHash": TENANT,
        "version": "3.0.0",
        "name": "<b>Acme</b>",
        "welcomeMessage": "<p onclick=\"steal()\">Hello</p>",
        "widget": { "position": "top-right" },
        "rogue": true,
    });

    let strict = pipeline.submit("tenant", &document, "tenant", &context).await;
    assert!(matches!(strict, Err(TrustError::ValidationFailed { .. })));

    let lenient = context.clone().strict(false);
    let outcome = pipeline
        .submit("tenant", &document, "tenant", &lenient)
        .await
        .unwrap();
    assert!(outcome.sanitization.has_warning(IssueCode::MarkupRemoved));
    let config = outcome.configuration;
    assert_eq!(config.get("name"), Some(&json!("Acme")));
    assert!(config.get("rogue").is_none());
    let welcome = config.get("welcomeMessage").and_then(|v| v.as_str()).unwrap();
    assert!(!welcome.contains("onclick"));
    assert!(welcome.contains("Hello"));
}

#[tokio::test]
async fn test_submit_legacy_tenant_document() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Staging).with_tenant(TENANT);

    let outcome = pipeline
        .submit("tenant", &legacy_nested_tenant(), "tenant", &context)
        .await
        .unwrap();

    assert_eq!(outcome.format, DocumentFormat::LegacyNestedTenant);
    let config = outcome.configuration;
    assert_eq!(config.get("tenantHash"), Some(&json!(TENANT)));
    assert_eq!(config.get("widget.position"), Some(&json!("bottom-left")));
    assert_eq!(config.get("widget.theme.name"), Some(&json!("midnight")));
}

#[tokio::test]
async fn test_submit_rejects_foreign_tenant() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Staging).with_tenant(OTHER_TENANT);

    let err = pipeline
        .submit("tenant", &legacy_nested_tenant(), "tenant", &context)
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::AccessDenied { .. }));
}

#[tokio::test]
async fn test_viewer_cannot_submit() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Staging).with_tenant(TENANT);

    let err = pipeline
        .submit("viewer", &legacy_nested_tenant(), "tenant", &context)
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::AccessDenied { .. }));

    let audit = pipeline.access().audit_log_for_user("viewer");
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].granted);
}

#[tokio::test]
async fn test_seal_round_trip_and_rotation() {
    let pipeline = staffed_pipeline();
    let context = SanitizationContext::new(Environment::Staging);
    let outcome = pipeline
        .submit("ops", &staging_runtime(), "runtime", &context)
        .await
        .unwrap();

    let engine = pipeline.encryption();
    let (key, first) = engine.generate_master_key(Environment::Staging).unwrap();
    let blob = pipeline
        .seal("ops", &outcome.configuration, &key, None)
        .await
        .unwrap();

    let (next_key, second) = engine.rotate_key(Environment::Staging, &key).unwrap();
    assert_eq!(second.version, first.version + 1);
    assert_eq!(
        engine.active_key_metadata(Environment::Staging).map(|m| m.key_id),
        Some(second.key_id)
    );

    // The retired key still opens blobs during its grace window.
    let open_context = EncryptionContext::new(Environment::Staging, "runtime");
    let opened = pipeline
        .unseal("ops", &blob, &key, &open_context)
        .await
        .unwrap();
    assert_eq!(&opened.data, outcome.configuration.payload());

    // New blobs cannot be sealed with it.
    assert!(pipeline
        .seal("ops", &outcome.configuration, &key, None)
        .await
        .is_err());
    assert!(pipeline
        .seal("ops", &outcome.configuration, &next_key, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_tampered_blob_fails() {
    let engine = fast_engine();
    let (key, _) = engine.generate_master_key(Environment::Development).unwrap();
    let context = EncryptionContext::new(Environment::Development, "tenant").with_tenant(TENANT);
    let mut blob = engine
        .encrypt(&json!({ "secret": "value" }), &key, &context)
        .await
        .unwrap();

    let original_tag = blob.tag.clone();
    blob.tag = base64_flip(&original_tag);
    assert!(engine.decrypt(&blob, &key, &context).await.is_err());

    blob.tag = original_tag;
    let other_tenant =
        EncryptionContext::new(Environment::Development, "tenant").with_tenant(OTHER_TENANT);
    assert!(engine.decrypt(&blob, &key, &other_tenant).await.is_err());
    assert!(engine.decrypt(&blob, &key, &context).await.is_ok());
}

fn base64_flip(encoded: &str) -> String {
    let mut chars: Vec<char> = encoded.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    chars.into_iter().collect()
}

#[tokio::test]
async fn test_production_policy_blocks_debug_runtime() {
    let manager = ConfigurationManager::builder().build();
    let mut document = staging_runtime();
    document["environment"] = json!("production");
    document["security"]["allowInsecure"] = json!(true);

    let err = manager
        .ingest_document(
            "runtime",
            Environment::Production,
            document,
            ValidationOptions::strict(),
        )
        .unwrap_err();
    assert!(matches!(err, TrustError::ValidationFailed { .. }));
    assert!(manager.get_metrics().validation_error_count >= 1);
}

#[tokio::test]
async fn test_cache_ttl_and_metrics() {
    let clock = Arc::new(ManualClock::starting_now());
    let manager = ConfigurationManager::builder()
        .with_clock(clock.clone())
        .build();

    let first = manager
        .load_configuration("runtime", Environment::Staging, LoadOptions::default())
        .await
        .unwrap();
    let second = manager
        .load_configuration("runtime", Environment::Staging, LoadOptions::default())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    clock.advance(chrono::Duration::seconds(301));
    let third = manager
        .load_configuration("runtime", Environment::Staging, LoadOptions::default())
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &third));

    // Only loads that built a configuration count.
    let metrics = manager.get_metrics();
    assert_eq!(metrics.total_loads, 2);
    assert_eq!(metrics.cache_hits, 1);
}

#[tokio::test]
async fn test_inheritance_applies_on_load() {
    let manager = ConfigurationManager::builder().build();
    manager
        .register_inheritance_rule(
            InheritanceRule::new(
                Environment::Staging,
                Environment::Production,
                InheritanceStrategy::Merge,
            )
            .with_path("features"),
        )
        .unwrap();

    let mut staging = staging_runtime();
    staging["features"]["newCheckout"] = json!(true);
    manager
        .ingest_document("runtime", Environment::Staging, staging, ValidationOptions::strict())
        .unwrap();

    let effective = manager
        .get_effective_configuration("runtime", Environment::Production)
        .await
        .unwrap();
    assert_eq!(effective.get("features.newCheckout"), Some(&json!(true)));
    // Merge keeps the target's own values.
    assert_eq!(effective.get("features.analyticsEnabled"), Some(&json!(true)));
    assert_eq!(effective.get("environment"), Some(&json!("production")));

    let plain = manager
        .load_configuration("runtime", Environment::Production, LoadOptions::uncached())
        .await
        .unwrap();
    assert!(plain.get("features.newCheckout").is_none());
}

#[tokio::test]
async fn test_remote_defaults_layer_over_baseline() {
    let defaults = StaticDefaults::new().with_defaults(
        "runtime",
        Environment::Staging,
        json!({ "features": { "darkMode": true }, "api": { "timeout": 5000 } }),
    );
    let manager = ConfigurationManager::builder()
        .with_defaults_source(Arc::new(defaults))
        .build();

    let config = manager
        .load_configuration("runtime", Environment::Staging, LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(config.get("features.darkMode"), Some(&json!(true)));
    assert_eq!(config.get("api.timeout"), Some(&json!(5000)));
    assert_eq!(
        config.get("api.baseUrl"),
        Some(&json!("https://staging-api.example.com"))
    );
}

#[tokio::test]
async fn test_file_backups_support_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TrustPipeline::builder()
        .with_settings(common::fast_settings())
        .with_backup_store(Arc::new(FileBackupStore::new(dir.path())))
        .build();

    let original = json!({ "API_BASE_URL": "http://localhost:3000", "ENVIRONMENT": "development" });
    let result = pipeline
        .migration()
        .migrate_configuration(&original, "runtime", MigrationStrategy::Conservative)
        .await;
    assert!(result.success, "{:?}", result.errors);

    let path = result.backup_path.unwrap();
    assert!(pipeline.migration().rollback_migration(&path, "runtime").await);
    assert_eq!(
        pipeline.migration().load_backup(&path).await.unwrap(),
        Some(original)
    );
    assert_eq!(
        pipeline.migration().restore_backup(&path, "runtime").await.unwrap(),
        result.migrated_config.unwrap()
    );
    assert!(!pipeline.migration().rollback_migration("", "runtime").await);
}

#[tokio::test]
async fn test_rollback_restores_active_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TrustPipeline::builder()
        .with_settings(common::fast_settings())
        .with_backup_store(Arc::new(FileBackupStore::new(dir.path())))
        .build();
    pipeline
        .access()
        .create_user(User::new("dev").with_role("developer"))
        .unwrap();
    pipeline
        .access()
        .create_user(User::new("auditor").with_role("auditor"))
        .unwrap();
    let context = SanitizationContext::new(Environment::Development);

    let first = pipeline
        .submit("dev", &legacy_environment(), "runtime", &context)
        .await
        .unwrap();
    let backup = first.migration.unwrap().backup_path.unwrap();
    assert_eq!(first.configuration.get("api.timeout"), Some(&json!(45000)));

    let mut changed = legacy_environment();
    changed["API_TIMEOUT"] = json!("60000");
    changed["DEBUG"] = json!("false");
    let second = pipeline
        .submit("dev", &changed, "runtime", &context)
        .await
        .unwrap();
    assert_eq!(second.configuration.get("api.timeout"), Some(&json!(60000)));

    let restored = pipeline
        .rollback("dev", &backup, "runtime", &context)
        .await
        .unwrap();
    assert_eq!(restored.get("api.timeout"), Some(&json!(45000)));
    assert_eq!(restored.get("logging.level"), first.configuration.get("logging.level"));

    let active = pipeline
        .configuration()
        .load_configuration("runtime", Environment::Development, LoadOptions::default())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&active, &restored));

    // The original declares development; it cannot become staging's state.
    let staging = SanitizationContext::new(Environment::Staging);
    assert!(matches!(
        pipeline.rollback("dev", &backup, "runtime", &staging).await,
        Err(TrustError::ValidationFailed { .. })
    ));
    assert!(matches!(
        pipeline.rollback("auditor", &backup, "runtime", &context).await,
        Err(TrustError::AccessDenied { .. })
    ));
    assert!(matches!(
        pipeline.rollback("dev", "", "runtime", &context).await,
        Err(TrustError::BackupError { .. })
    ));
}

#[tokio::test]
async fn test_validation_only_never_transforms() {
    let migration = MigrationManager::new();
    let result = migration
        .migrate_configuration(&legacy_nested_tenant(), "tenant", MigrationStrategy::ValidationOnly)
        .await;

    assert!(!result.success);
    assert!(result.backup_path.is_none());
    assert!(result.migrated_config.is_none());
}

#[test]
fn test_sessions_expire_with_clock() {
    let clock = Arc::new(ManualClock::starting_now());
    let access = AccessControlManager::with_settings(Default::default(), clock.clone());
    access
        .create_user(User::new("carol").with_role("developer"))
        .unwrap();

    let session = access
        .create_session(
            "carol",
            Environment::Development,
            None,
            SessionOptions {
                expiration_minutes: 30,
                ..SessionOptions::default()
            },
        )
        .unwrap();
    let read = AccessRequest::new("carol", "configuration", "read", Environment::Development);
    assert!(access.check_access(&read).granted);

    clock.advance(chrono::Duration::minutes(31));
    let expired = access.check_access(&read);
    assert!(!expired.granted);
    assert_eq!(expired.reason, "Session expired");

    assert!(access.validate_session(&session.id).is_none());
    assert!(access.check_access(&read).granted);
}

#[test]
fn test_custom_role_lifecycle() {
    let access = AccessControlManager::new();
    access
        .create_role(
            Role::new("widget-editor", "Widget Editor")
                .with_permission(Permission::new("configuration", "read"))
                .with_tenant_scope(TenantScope::Multiple),
        )
        .unwrap();
    access
        .create_user(
            User::new("dana")
                .with_role("widget-editor")
                .with_tenant(TENANT),
        )
        .unwrap();

    let write = AccessRequest::new("dana", "configuration", "write", Environment::Staging)
        .for_tenant(TENANT);
    assert!(!access.check_access(&write).granted);

    access
        .update_role(
            "widget-editor",
            RoleUpdate {
                permissions: Some(vec![
                    Permission::new("configuration", "read"),
                    Permission::new("configuration", "write"),
                ]),
                ..RoleUpdate::default()
            },
        )
        .unwrap();
    assert!(access.check_access(&write).granted);

    assert!(matches!(
        access.update_role("auditor", RoleUpdate::default()),
        Err(TrustError::SystemRoleImmutable { .. })
    ));
}
