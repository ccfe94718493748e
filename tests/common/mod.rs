// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for the integration tests.

use serde_json::{json, Value};
use trustcfg::domain::{EncryptionSettings, TrustSettings, User};
use trustcfg::service::{EncryptionEngine, TrustPipeline};

/// A tenant hash that passes format checks.
#[allow(dead_code)]
pub const TENANT: &str = "TenantAAA1";

/// A second, unrelated tenant.
#[allow(dead_code)]
pub const OTHER_TENANT: &str = "TenantBBB2";

/// Encryption settings cheap enough for tests.
#[allow(dead_code)]
pub fn fast_encryption() -> EncryptionSettings {
    EncryptionSettings::default()
        .with_iterations(1_000)
        .with_min_iterations(1_000)
}

/// An engine using [`fast_encryption`].
#[allow(dead_code)]
pub fn fast_engine() -> EncryptionEngine {
    EncryptionEngine::new(fast_encryption())
}

/// Pipeline settings with fast encryption.
#[allow(dead_code)]
pub fn fast_settings() -> TrustSettings {
    TrustSettings {
        encryption: fast_encryption(),
        ..TrustSettings::default()
    }
}

/// A pipeline with one user per standard role.
///
/// - `dev`: developer
/// - `ops`: operator
/// - `tenant`: tenant-admin for [`TENANT`]
/// - `viewer`: tenant-viewer for [`TENANT`]
/// - `auditor`: auditor
#[allow(dead_code)]
pub fn staffed_pipeline() -> TrustPipeline {
    let pipeline = TrustPipeline::builder().with_settings(fast_settings()).build();
    let access = pipeline.access();
    access
        .create_user(User::new("dev").with_role("developer"))
        .expect("create dev");
    access
        .create_user(User::new("ops").with_role("operator"))
        .expect("create ops");
    access
        .create_user(User::new("tenant").with_role("tenant-admin").with_tenant(TENANT))
        .expect("create tenant admin");
    access
        .create_user(User::new("viewer").with_role("tenant-viewer").with_tenant(TENANT))
        .expect("create viewer");
    access
        .create_user(User::new("auditor").with_role("auditor"))
        .expect("create auditor");
    pipeline
}

/// A complete runtime document for staging.
#[allow(dead_code)]
pub fn staging_runtime() -> Value {
    json!({
        "environment": "staging",
        "version": "3.0.0",
        "api": {
            "baseUrl": "https://localhost:8443",
            "timeout": 15000,
            "retryAttempts": 2,
        },
        "security": {
            "enforceHTTPS": true,
            "allowInsecure": false,
            "allowedDomains": ["localhost"],
        },
        "logging": { "level": "info", "enableConsole": false, "enableRemote": true },
        "features": { "experimentalFeatures": false, "analyticsEnabled": true },
    })
}

/// A flat, environment-variable style document.
#[allow(dead_code)]
pub fn legacy_environment() -> Value {
    json!({
        "API_BASE_URL": "http://localhost:3000",
        "CDN_URL": "http://localhost:3001",
        "DEBUG": "true",
        "API_TIMEOUT": "45000",
        "RETRY_ATTEMPTS": 5,
    })
}

/// A nested-tenant document for [`TENANT`].
#[allow(dead_code)]
pub fn legacy_nested_tenant() -> Value {
    json!({
        "tenant": {
            "hash": TENANT,
            "name": "Acme",
            "widget": { "position": "bottom-left", "size": "large", "theme": "midnight" },
        }
    })
}
