// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in per-environment baselines for the standard schemas.
//!
//! Development is permissive (plain http, debug logging, experimental
//! features). Staging and production invert those choices, and production
//! logs only errors.

use crate::domain::migration::CURRENT_VERSION;
use crate::domain::schema::{ENVIRONMENT_SCHEMA, RUNTIME_SCHEMA, TENANT_SCHEMA};
use crate::domain::Environment;
use serde_json::{json, Value};

fn base_url(environment: Environment) -> &'static str {
    match environment {
        Environment::Development => "http://localhost:3000",
        Environment::Staging => "https://staging-api.example.com",
        Environment::Production => "https://api.example.com",
    }
}

fn log_level(environment: Environment) -> &'static str {
    match environment {
        Environment::Development => "debug",
        Environment::Staging => "info",
        Environment::Production => "error",
    }
}

fn allowed_domains(environment: Environment) -> Value {
    match environment {
        Environment::Development => json!(["localhost", "127.0.0.1"]),
        Environment::Staging | Environment::Production => json!(["example.com"]),
    }
}

/// Returns the baseline document for `schema_type` in `environment`, or
/// `None` for schema types without a baseline.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::Environment;
/// use trustcfg::service::environment_defaults::environment_defaults;
///
/// let dev = environment_defaults("runtime", Environment::Development).unwrap();
/// assert_eq!(dev["security"]["allowInsecure"], true);
/// assert_eq!(dev["logging"]["level"], "debug");
///
/// let prod = environment_defaults("runtime", Environment::Production).unwrap();
/// assert_eq!(prod["security"]["allowInsecure"], false);
/// assert_eq!(prod["logging"]["level"], "error");
/// ```
pub fn environment_defaults(schema_type: &str, environment: Environment) -> Option<Value> {
    let dev = environment == Environment::Development;
    match schema_type {
        RUNTIME_SCHEMA => Some(json!({
            "environment": environment.as_str(),
            "version": CURRENT_VERSION,
            "api": {
                "baseUrl": base_url(environment),
                "timeout": 30_000,
                "retryAttempts": 3,
            },
            "security": {
                "enforceHTTPS": !dev,
                "allowInsecure": dev,
                "allowedDomains": allowed_domains(environment),
            },
            "logging": {
                "level": log_level(environment),
                "enableConsole": dev,
                "enableRemote": !dev,
            },
            "features": {
                "experimentalFeatures": dev,
                "analyticsEnabled": !dev,
            },
        })),
        ENVIRONMENT_SCHEMA => Some(json!({
            "API_BASE_URL": base_url(environment),
            "ENVIRONMENT": environment.as_str(),
            "DEBUG": dev,
            "API_TIMEOUT": 30_000,
            "RETRY_ATTEMPTS": 3,
            "LOG_LEVEL": log_level(environment),
        })),
        // No tenant hash: a tenant configuration only validates once one is
        // supplied.
        TENANT_SCHEMA => Some(json!({
            "version": CURRENT_VERSION,
            "widget": {
                "position": "bottom-right",
                "size": "medium",
                "enabled": true,
                "theme": { "name": "default", "colors": {}, "typography": {} },
            },
        })),
        _ => None,
    }
}
