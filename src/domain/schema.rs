// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative document schemas.
//!
//! A [`Schema`] describes the expected shape of a configuration document: its
//! properties, which of them are required, and whether undeclared properties
//! are tolerated. Each [`PropertySchema`] carries the constraints the
//! sanitizer enforces (formats, patterns, lengths, ranges, enumerations) and
//! may nest a further schema for object values.
//!
//! The [`SchemaRegistry`] is shared by the sanitizer, the configuration
//! manager and the migration manager so that all three agree on what a valid
//! document looks like.

use crate::domain::document::type_name;
use crate::domain::errors::{Result, TrustError};
use crate::domain::ConfigPath;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Built-in schema for flat environment-variable style documents.
pub const ENVIRONMENT_SCHEMA: &str = "environment";
/// Built-in schema for structured runtime configuration.
pub const RUNTIME_SCHEMA: &str = "runtime";
/// Built-in schema for per-tenant widget configuration.
pub const TENANT_SCHEMA: &str = "tenant";

/// Environment labels accepted by the built-in schemas.
const ENVIRONMENT_LABELS: [&str; 3] = ["development", "staging", "production"];
/// Log levels accepted by the built-in schemas.
const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// The JSON type a property must have.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// A string
    #[default]
    String,
    /// A number
    Number,
    /// A boolean
    Boolean,
    /// An object
    Object,
    /// An array
    Array,
}

impl ValueType {
    /// Returns the lowercase type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Object => "object",
            ValueType::Array => "array",
        }
    }

    /// Returns `true` when `value` has this JSON type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Object => value.is_object(),
            ValueType::Array => value.is_array(),
        }
    }
}

/// Semantic formats for string properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    /// An http(s) URL on an allowed host
    Url,
    /// An email address
    Email,
    /// A tenant identifier (`^[A-Za-z0-9]{8,32}$`)
    TenantHash,
    /// A relative filesystem-like path
    Path,
    /// An RFC 4122 UUID
    Uuid,
}

/// Constraints for a single property.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::schema::{PropertySchema, StringFormat};
///
/// let prop = PropertySchema::string()
///     .with_format(StringFormat::Url)
///     .with_length(None, Some(2048));
/// assert_eq!(prop.max_length, Some(2048));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    /// Expected JSON type
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Semantic string format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StringFormat>,
    /// Regular expression a string must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Minimum string length in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Minimum numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Maximum numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Allowed string values
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// Strip markup and control characters from string values
    #[serde(default)]
    pub sanitize: bool,
    /// Keep benign markup when sanitizing
    #[serde(default, rename = "allowHTML")]
    pub allow_html: bool,
    /// Schema for object values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Box<Schema>>,
    /// Schema for array items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    /// Creates a property of the given type with no constraints.
    pub fn of_type(value_type: ValueType) -> Self {
        Self {
            value_type,
            ..Self::default()
        }
    }

    /// Creates an unconstrained string property.
    pub fn string() -> Self {
        Self::of_type(ValueType::String)
    }

    /// Creates an unconstrained number property.
    pub fn number() -> Self {
        Self::of_type(ValueType::Number)
    }

    /// Creates a boolean property.
    pub fn boolean() -> Self {
        Self::of_type(ValueType::Boolean)
    }

    /// Creates an object property described by `schema`.
    pub fn object(schema: Schema) -> Self {
        Self {
            value_type: ValueType::Object,
            schema: Some(Box::new(schema)),
            ..Self::default()
        }
    }

    /// Creates an object property that accepts any members.
    pub fn any_object() -> Self {
        Self::of_type(ValueType::Object)
    }

    /// Creates an array property whose items follow `items`.
    pub fn array(items: PropertySchema) -> Self {
        Self {
            value_type: ValueType::Array,
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// Sets the string format.
    pub fn with_format(mut self, format: StringFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets the length bounds.
    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Sets the numeric range.
    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    /// Restricts the value to one of `values`.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Enables markup stripping.
    pub fn sanitized(mut self) -> Self {
        self.sanitize = true;
        self
    }

    /// Enables markup stripping that keeps benign HTML.
    pub fn allowing_html(mut self) -> Self {
        self.sanitize = true;
        self.allow_html = true;
        self
    }
}

/// A declarative description of an object document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Always `object` for document schemas
    #[serde(rename = "type", default = "object_type")]
    pub value_type: ValueType,
    /// Declared properties
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Names of required properties
    #[serde(default)]
    pub required: Vec<String>,
    /// Whether undeclared properties are tolerated
    #[serde(default)]
    pub additional_properties_allowed: bool,
}

fn object_type() -> ValueType {
    ValueType::Object
}

impl Default for Schema {
    fn default() -> Self {
        Self::object()
    }
}

impl Schema {
    /// Creates an empty object schema that forbids additional properties.
    pub fn object() -> Self {
        Self {
            value_type: ValueType::Object,
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties_allowed: false,
        }
    }

    /// Declares an optional property.
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Declares a required property.
    pub fn required_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Sets whether undeclared properties are tolerated.
    pub fn allow_additional(mut self, allowed: bool) -> Self {
        self.additional_properties_allowed = allowed;
        self
    }

    /// Checks internal consistency: every required name is declared and every
    /// pattern compiles. Nested schemas are checked recursively.
    pub fn check(&self) -> std::result::Result<(), String> {
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(format!("required property '{}' is not declared", name));
            }
        }
        for (name, prop) in &self.properties {
            check_property(name, prop)?;
        }
        Ok(())
    }
}

fn check_property(name: &str, prop: &PropertySchema) -> std::result::Result<(), String> {
    if let Some(pattern) = &prop.pattern {
        Regex::new(pattern).map_err(|e| format!("pattern for '{}' is invalid: {}", name, e))?;
    }
    if let (Some(min), Some(max)) = (prop.min_length, prop.max_length) {
        if min > max {
            return Err(format!("minLength exceeds maxLength for '{}'", name));
        }
    }
    if let (Some(min), Some(max)) = (prop.minimum, prop.maximum) {
        if min > max {
            return Err(format!("minimum exceeds maximum for '{}'", name));
        }
    }
    if let Some(nested) = &prop.schema {
        nested.check().map_err(|e| format!("{}: {}", name, e))?;
    }
    if let Some(items) = &prop.items {
        check_property(name, items)?;
    }
    Ok(())
}

/// A named collection of schemas.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::schema::{Schema, SchemaRegistry, PropertySchema};
///
/// let registry = SchemaRegistry::with_builtin_schemas();
/// assert!(registry.get("runtime").is_some());
///
/// registry
///     .register("banner", Schema::object().required_property("text", PropertySchema::string()))
///     .unwrap();
/// assert!(registry.contains("banner"));
/// ```
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `environment`, `runtime` and
    /// `tenant` schemas.
    pub fn with_builtin_schemas() -> Self {
        let registry = Self::new();
        {
            let mut schemas = registry
                .schemas
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            schemas.insert(ENVIRONMENT_SCHEMA.to_string(), Arc::new(environment_schema()));
            schemas.insert(RUNTIME_SCHEMA.to_string(), Arc::new(runtime_schema()));
            schemas.insert(TENANT_SCHEMA.to_string(), Arc::new(tenant_schema()));
        }
        registry
    }

    /// Registers (or replaces) a schema.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::InvalidSchema`] if the name is empty or the schema
    /// is internally inconsistent.
    pub fn register(&self, schema_type: impl Into<String>, schema: Schema) -> Result<()> {
        let schema_type = schema_type.into();
        if schema_type.trim().is_empty() {
            return Err(TrustError::InvalidSchema {
                schema_type,
                message: "schema type must not be empty".to_string(),
            });
        }
        schema.check().map_err(|message| TrustError::InvalidSchema {
            schema_type: schema_type.clone(),
            message,
        })?;

        tracing::debug!(schema_type = %schema_type, "registered schema");
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema_type, Arc::new(schema));
        Ok(())
    }

    /// Returns the schema registered under `schema_type`.
    pub fn get(&self, schema_type: &str) -> Option<Arc<Schema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(schema_type)
            .cloned()
    }

    /// Returns the schema registered under `schema_type` or an error.
    pub fn require(&self, schema_type: &str) -> Result<Arc<Schema>> {
        self.get(schema_type).ok_or_else(|| TrustError::UnknownSchema {
            schema_type: schema_type.to_string(),
        })
    }

    /// Returns `true` if `schema_type` is registered.
    pub fn contains(&self, schema_type: &str) -> bool {
        self.get(schema_type).is_some()
    }

    /// Lists registered schema types in sorted order.
    pub fn schema_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Options for structural validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    /// Report unknown properties as errors instead of warnings
    pub strict_mode: bool,
    /// Accept unknown properties silently
    pub allow_unknown_properties: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            strict_mode: true,
            allow_unknown_properties: false,
        }
    }
}

impl ValidationOptions {
    /// Strict validation: unknown properties are errors.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Lenient validation: unknown properties are warnings.
    pub fn lenient() -> Self {
        Self {
            strict_mode: false,
            allow_unknown_properties: false,
        }
    }
}

/// A single validation finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending value (empty for the document root)
    pub path: String,
    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The outcome of validating a document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// `true` when `errors` is empty
    pub is_valid: bool,
    /// Problems that make the document unacceptable
    pub errors: Vec<ValidationIssue>,
    /// Problems that were tolerated
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Creates an empty, valid report.
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records an error.
    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(path, message));
        self.is_valid = false;
    }

    /// Records a warning.
    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(path, message));
    }

    /// Returns the error messages.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|issue| issue.message.clone()).collect()
    }
}

/// Validates the structure of `document` against `schema`.
///
/// Reports missing required properties by name, unknown properties (as errors
/// in strict mode, warnings otherwise), JSON type mismatches, enumeration
/// violations and numeric range violations. Format and pattern checks are left
/// to the sanitizer.
pub fn validate_structure(
    document: &Value,
    schema: &Schema,
    options: ValidationOptions,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    validate_object(document, schema, &ConfigPath::from(""), options, &mut report);
    report
}

fn validate_object(
    value: &Value,
    schema: &Schema,
    path: &ConfigPath,
    options: ValidationOptions,
    report: &mut ValidationReport,
) {
    let map = match value.as_object() {
        Some(map) => map,
        None => {
            let location = if path.as_str().is_empty() {
                "Document".to_string()
            } else {
                format!("Property '{}'", path)
            };
            report.error(
                path.as_str(),
                format!("{} must be an object, found {}", location, type_name(value)),
            );
            return;
        }
    };

    for name in &schema.required {
        if !map.contains_key(name) {
            let child = path.child(name);
            report.error(child.as_str(), format!("Missing required property: {}", child));
        }
    }

    for (name, value) in map {
        let child = path.child(name);
        match schema.properties.get(name) {
            Some(prop) => validate_value(value, prop, &child, options, report),
            None => {
                if schema.additional_properties_allowed || options.allow_unknown_properties {
                    continue;
                }
                let message = format!("Unknown property: {}", child);
                if options.strict_mode {
                    report.error(child.as_str(), message);
                } else {
                    report.warning(child.as_str(), message);
                }
            }
        }
    }
}

fn validate_value(
    value: &Value,
    prop: &PropertySchema,
    path: &ConfigPath,
    options: ValidationOptions,
    report: &mut ValidationReport,
) {
    if !prop.value_type.matches(value) {
        report.error(
            path.as_str(),
            format!(
                "Invalid type for {}: expected {}, found {}",
                path,
                prop.value_type.as_str(),
                type_name(value)
            ),
        );
        return;
    }

    match value {
        Value::String(s) => {
            if let Some(allowed) = &prop.allowed_values {
                if !s.is_empty() && !allowed.iter().any(|a| a == s) {
                    report.error(
                        path.as_str(),
                        format!("Invalid value for {}: '{}' is not one of {:?}", path, s, allowed),
                    );
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(0.0);
            if let Some(min) = prop.minimum {
                if n < min {
                    report.error(path.as_str(), format!("{} is below minimum {}", path, min));
                }
            }
            if let Some(max) = prop.maximum {
                if n > max {
                    report.error(path.as_str(), format!("{} exceeds maximum {}", path, max));
                }
            }
        }
        Value::Object(_) => {
            if let Some(nested) = &prop.schema {
                validate_object(value, nested, path, options, report);
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = &prop.items {
                for (i, item) in items.iter().enumerate() {
                    validate_value(item, item_schema, &path.child(&i.to_string()), options, report);
                }
            }
        }
        _ => {}
    }
}

/// Schema for flat, environment-variable style documents.
pub fn environment_schema() -> Schema {
    Schema::object()
        .required_property(
            "API_BASE_URL",
            PropertySchema::string()
                .with_format(StringFormat::Url)
                .with_length(None, Some(2048)),
        )
        .property(
            "CDN_URL",
            PropertySchema::string()
                .with_format(StringFormat::Url)
                .with_length(None, Some(2048)),
        )
        .property(
            "ENVIRONMENT",
            PropertySchema::string().with_enum(ENVIRONMENT_LABELS),
        )
        .property("DEBUG", PropertySchema::boolean())
        .property(
            "API_TIMEOUT",
            PropertySchema::number().with_range(Some(1000.0), Some(120_000.0)),
        )
        .property(
            "RETRY_ATTEMPTS",
            PropertySchema::number().with_range(Some(0.0), Some(10.0)),
        )
        .property(
            "TENANT_HASH",
            PropertySchema::string().with_format(StringFormat::TenantHash),
        )
        .property("LOG_LEVEL", PropertySchema::string().with_enum(LOG_LEVELS))
        .property(
            "APP_NAME",
            PropertySchema::string()
                .sanitized()
                .with_length(Some(1), Some(100)),
        )
}

/// Schema for structured runtime configuration.
pub fn runtime_schema() -> Schema {
    let api = Schema::object()
        .required_property(
            "baseUrl",
            PropertySchema::string()
                .with_format(StringFormat::Url)
                .with_length(None, Some(2048)),
        )
        .property(
            "cdnUrl",
            PropertySchema::string()
                .with_format(StringFormat::Url)
                .with_length(None, Some(2048)),
        )
        .property(
            "timeout",
            PropertySchema::number().with_range(Some(1000.0), Some(120_000.0)),
        )
        .property(
            "retryAttempts",
            PropertySchema::number().with_range(Some(0.0), Some(10.0)),
        );

    let security = Schema::object()
        .property("enforceHTTPS", PropertySchema::boolean())
        .property("allowInsecure", PropertySchema::boolean())
        .property(
            "allowedDomains",
            PropertySchema::array(
                PropertySchema::string()
                    .sanitized()
                    .with_length(None, Some(253)),
            ),
        )
        .property(
            "contentSecurityPolicy",
            PropertySchema::string()
                .sanitized()
                .with_length(None, Some(4096)),
        );

    let logging = Schema::object()
        .property("level", PropertySchema::string().with_enum(LOG_LEVELS))
        .property("enableConsole", PropertySchema::boolean())
        .property("enableRemote", PropertySchema::boolean())
        .property(
            "remoteEndpoint",
            PropertySchema::string().with_format(StringFormat::Url),
        );

    let features = Schema::object()
        .property("experimentalFeatures", PropertySchema::boolean())
        .property("analyticsEnabled", PropertySchema::boolean())
        .allow_additional(true);

    Schema::object()
        .required_property(
            "environment",
            PropertySchema::string().with_enum(ENVIRONMENT_LABELS),
        )
        .property(
            "version",
            PropertySchema::string().with_pattern(r"^\d+\.\d+\.\d+$"),
        )
        .required_property("api", PropertySchema::object(api))
        .required_property("security", PropertySchema::object(security))
        .required_property("logging", PropertySchema::object(logging))
        .required_property("features", PropertySchema::object(features))
}

/// Schema for per-tenant widget configuration.
pub fn tenant_schema() -> Schema {
    let theme = Schema::object()
        .required_property(
            "name",
            PropertySchema::string()
                .sanitized()
                .with_length(Some(1), Some(64)),
        )
        .property("colors", PropertySchema::any_object())
        .property("typography", PropertySchema::any_object())
        .allow_additional(true);

    let widget = Schema::object()
        .required_property(
            "position",
            PropertySchema::string().with_enum(["bottom-right", "bottom-left", "top-right", "top-left"]),
        )
        .property(
            "size",
            PropertySchema::string().with_enum(["small", "medium", "large"]),
        )
        .property("theme", PropertySchema::object(theme))
        .property("enabled", PropertySchema::boolean())
        .allow_additional(true);

    Schema::object()
        .required_property(
            "tenantHash",
            PropertySchema::string().with_format(StringFormat::TenantHash),
        )
        .property("tenantId", PropertySchema::string().with_format(StringFormat::Uuid))
        .property(
            "name",
            PropertySchema::string()
                .sanitized()
                .with_length(Some(1), Some(200)),
        )
        .property(
            "version",
            PropertySchema::string().with_pattern(r"^\d+\.\d+\.\d+$"),
        )
        .required_property("widget", PropertySchema::object(widget))
        .property(
            "welcomeMessage",
            PropertySchema::string()
                .allowing_html()
                .with_length(None, Some(2000)),
        )
        .property(
            "contactEmail",
            PropertySchema::string().with_format(StringFormat::Email),
        )
        .property("assetPath", PropertySchema::string().with_format(StringFormat::Path))
        .property("features", PropertySchema::any_object())
}
