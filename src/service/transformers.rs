// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document transformers used by migrations.
//!
//! A transformer is a pure function from one document to the next, with an
//! optional precondition. Transformers never mutate their input.

use crate::domain::document::{empty_object, number_value, parse_flag, parse_number};
use crate::domain::migration::CURRENT_VERSION;
use crate::domain::TransformerDescriptor;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// A document transformation. Errors are human-readable messages.
pub type TransformFn = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// A precondition checked before a transformation runs.
pub type ValidateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Flat environment dialect to runtime.
pub const ENVIRONMENT_TO_RUNTIME: &str = "environment-to-runtime";
/// Lifts the nested `tenant` object to the top level.
pub const NESTED_TENANT_FLATTEN: &str = "nested-tenant-flatten";
/// Gathers flat widget fields into a `widget` object.
pub const FLAT_WIDGET_RESTRUCTURE: &str = "flat-widget-restructure";
/// Expands a string theme into a structured one.
pub const THEME_UPGRADE: &str = "theme-upgrade";
/// Stamps the current version.
pub const STAMP_VERSION: &str = "stamp-version";

/// A named transformer.
///
/// # Examples
///
/// ```
/// use trustcfg::service::Transformer;
/// use serde_json::json;
///
/// let rename = Transformer::new("rename-title", "Renames title to name", "1.0.0", |doc| {
///     let mut out = doc.clone();
///     if let Some(title) = out.as_object_mut().and_then(|m| m.remove("title")) {
///         out["name"] = title;
///     }
///     Ok(out)
/// })
/// .with_validation(|doc| doc.get("title").is_some());
///
/// assert!(rename.precondition(&json!({ "title": "x" })));
/// assert_eq!(rename.apply(&json!({ "title": "x" })).unwrap(), json!({ "name": "x" }));
/// ```
#[derive(Clone)]
pub struct Transformer {
    name: String,
    description: String,
    version: String,
    transform: TransformFn,
    validate: Option<ValidateFn>,
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_validation", &self.validate.is_some())
            .finish()
    }
}

impl Transformer {
    /// Creates a transformer without a precondition.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        transform: F,
    ) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            transform: Arc::new(transform),
            validate: None,
        }
    }

    /// Attaches a precondition.
    pub fn with_validation<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// The transformer's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if a precondition is attached.
    pub fn has_validation(&self) -> bool {
        self.validate.is_some()
    }

    /// Evaluates the precondition. Transformers without one always pass.
    pub fn precondition(&self, document: &Value) -> bool {
        self.validate.as_ref().map(|check| check(document)).unwrap_or(true)
    }

    /// Runs the transformation.
    pub fn apply(&self, document: &Value) -> std::result::Result<Value, String> {
        (self.transform)(document)
    }

    /// Describes the transformer.
    pub fn descriptor(&self) -> TransformerDescriptor {
        TransformerDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            has_validation: self.validate.is_some(),
        }
    }
}

/// The transformers every migration manager starts with.
pub fn builtin_transformers() -> Vec<Transformer> {
    vec![
        Transformer::new(
            ENVIRONMENT_TO_RUNTIME,
            "Maps flat upper-case environment keys onto the runtime structure",
            "1.0.0",
            environment_to_runtime,
        )
        .with_validation(|doc| doc.get("API_BASE_URL").map(Value::is_string).unwrap_or(false)),
        Transformer::new(
            NESTED_TENANT_FLATTEN,
            "Lifts tenant settings out of the nested tenant object",
            "2.0.0",
            nested_tenant_flatten,
        )
        .with_validation(|doc| doc.get("tenant").map(Value::is_object).unwrap_or(false)),
        Transformer::new(
            FLAT_WIDGET_RESTRUCTURE,
            "Gathers flat widget fields into a widget object",
            "2.5.0",
            flat_widget_restructure,
        )
        .with_validation(Value::is_object),
        Transformer::new(
            THEME_UPGRADE,
            "Expands a string theme into name, colors and typography",
            "3.0.0",
            theme_upgrade,
        )
        .with_validation(|doc| doc.get("widget").map(Value::is_object).unwrap_or(false)),
        Transformer::new(
            STAMP_VERSION,
            "Stamps the current schema version",
            CURRENT_VERSION,
            stamp_version,
        )
        .with_validation(Value::is_object),
    ]
}

fn as_object(document: &Value) -> std::result::Result<&Map<String, Value>, String> {
    document
        .as_object()
        .ok_or_else(|| "document must be an object".to_string())
}

fn environment_to_runtime(document: &Value) -> std::result::Result<Value, String> {
    let map = as_object(document)?;
    let base_url = map
        .get("API_BASE_URL")
        .and_then(Value::as_str)
        .ok_or_else(|| "API_BASE_URL is required".to_string())?;
    let debug = map.get("DEBUG").and_then(parse_flag).unwrap_or(false);

    let environment = map
        .get("ENVIRONMENT")
        .and_then(Value::as_str)
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_else(|| "development".to_string());
    let level = match map.get("LOG_LEVEL").and_then(Value::as_str) {
        Some(level) => level.trim().to_lowercase(),
        None if debug => "debug".to_string(),
        None => "info".to_string(),
    };

    let mut api = json!({
        "baseUrl": base_url,
        "timeout": map.get("API_TIMEOUT").and_then(parse_number).map(number_value).unwrap_or_else(|| json!(30_000)),
        "retryAttempts": map.get("RETRY_ATTEMPTS").and_then(parse_number).map(number_value).unwrap_or_else(|| json!(3)),
    });
    if let Some(cdn) = map.get("CDN_URL").and_then(Value::as_str) {
        api["cdnUrl"] = json!(cdn);
    }

    Ok(json!({
        "environment": environment,
        "api": api,
        "security": {
            "enforceHTTPS": !debug,
            "allowInsecure": debug,
        },
        "logging": {
            "level": level,
            "enableConsole": debug,
            "enableRemote": !debug,
        },
        "features": {
            "experimentalFeatures": debug,
            "analyticsEnabled": !debug,
        },
    }))
}

fn nested_tenant_flatten(document: &Value) -> std::result::Result<Value, String> {
    let map = as_object(document)?;
    let tenant = map
        .get("tenant")
        .and_then(Value::as_object)
        .ok_or_else(|| "tenant object is required".to_string())?;

    let mut out: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| key.as_str() != "tenant")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in tenant {
        let key = match key.as_str() {
            "hash" => "tenantHash",
            "id" => "tenantId",
            other => other,
        };
        out.insert(key.to_string(), value.clone());
    }
    Ok(Value::Object(out))
}

fn flat_widget_restructure(document: &Value) -> std::result::Result<Value, String> {
    let map = as_object(document)?;
    let mut widget = map
        .get("widget")
        .filter(|w| w.is_object())
        .cloned()
        .unwrap_or_else(empty_object);

    let mut out = Map::new();
    for (key, value) in map {
        let field = match key.as_str() {
            "widgetPosition" => "position",
            "widgetSize" => "size",
            "widgetEnabled" => "enabled",
            "theme" => "theme",
            "widget" => continue,
            _ => {
                out.insert(key.clone(), value.clone());
                continue;
            }
        };
        widget[field] = value.clone();
    }
    out.insert("widget".to_string(), widget);
    Ok(Value::Object(out))
}

fn theme_upgrade(document: &Value) -> std::result::Result<Value, String> {
    let mut out = document.clone();
    let Some(widget) = out.get_mut("widget").and_then(Value::as_object_mut) else {
        return Ok(out);
    };
    match widget.get_mut("theme") {
        Some(Value::String(name)) => {
            let name = name.clone();
            widget.insert(
                "theme".to_string(),
                json!({ "name": name, "colors": {}, "typography": {} }),
            );
        }
        Some(Value::Object(theme)) => {
            theme
                .entry("name")
                .or_insert_with(|| Value::from("default"));
            theme.entry("colors").or_insert_with(empty_object);
            theme.entry("typography").or_insert_with(empty_object);
        }
        _ => {}
    }
    Ok(out)
}

fn stamp_version(document: &Value) -> std::result::Result<Value, String> {
    let mut out = as_object(document)?.clone();
    out.insert("version".to_string(), Value::from(CURRENT_VERSION));
    Ok(Value::Object(out))
}
