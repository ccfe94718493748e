// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema-driven sanitization of untrusted configuration documents.
//!
//! The [`Sanitizer`] walks a raw document alongside a registered [`Schema`],
//! repairing what can be repaired (markup, over-long strings, out-of-range
//! numbers, textual booleans) and clearing what cannot (insecure URLs,
//! attack patterns, enumeration misses). Every change is reported as a
//! [`SanitizationIssue`]; sanitization itself never fails.

use crate::domain::document::{number_value, parse_flag, parse_number, serialized_size, type_name};
use crate::domain::schema::{PropertySchema, Schema, SchemaRegistry, StringFormat, ValueType};
use crate::domain::{ConfigPath, Environment, Result, SanitizerSettings};
use crate::service::markup::{clean_markup, strip_markup};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

static TENANT_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{8,32}$").expect("valid regex"));

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$")
        .expect("valid regex")
});

static UNSAFE_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._/-]").expect("valid regex"));

static REPEATED_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").expect("valid regex"));

/// How serious a sanitization finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic repair
    Low,
    /// Value changed or cleared, document still usable
    Medium,
    /// Document must not be trusted
    High,
    /// Security policy violation
    Critical,
}

impl Severity {
    /// Returns `true` for severities that invalidate a document.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// Machine-readable classification of a finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// No schema is registered under the requested type
    UnknownSchema,
    /// The serialized document exceeds the size limit
    DocumentTooLarge,
    /// The document root is not an object
    InvalidDocument,
    /// A required property is absent
    MissingRequired,
    /// A property the schema does not declare
    UnknownProperty,
    /// A value of the wrong JSON type
    InvalidType,
    /// A value was converted to the declared type
    TypeCoerced,
    /// A string that does not parse as a URL
    InvalidUrl,
    /// A URL scheme other than http or https
    InvalidProtocol,
    /// A plain-http URL in production
    InsecureUrl,
    /// A URL host outside the allow-list
    DisallowedDomain,
    /// A malformed email address
    InvalidEmail,
    /// Path traversal characters in an identifier
    AttackPattern,
    /// A malformed tenant hash
    InvalidTenantHash,
    /// A tenant hash naming someone else's tenant
    TenantMismatch,
    /// A path was rewritten to a safe form
    PathNormalized,
    /// A malformed UUID
    InvalidUuid,
    /// Markup or control characters were removed
    MarkupRemoved,
    /// A string was cut to its maximum length
    Truncated,
    /// A string shorter than its minimum length
    TooShort,
    /// A string not matching its pattern
    PatternMismatch,
    /// A string outside its enumeration
    InvalidEnum,
    /// A value that is not a finite number
    InvalidNumber,
    /// A number raised to its minimum
    BelowMinimum,
    /// A number lowered to its maximum
    AboveMaximum,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde label so logs and serialized results agree.
        match serde_json::to_value(self) {
            Ok(Value::String(s)) => f.write_str(&s),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// A single sanitization finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationIssue {
    /// Dotted path of the value (empty for the document root)
    pub path: String,
    /// Classification
    pub code: IssueCode,
    /// Human-readable description
    pub message: String,
    /// Severity
    pub severity: Severity,
}

/// Per-call sanitization inputs.
///
/// The environment and tenant are trusted, already-resolved values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizationContext {
    /// Target environment
    pub environment: Environment,
    /// Caller's tenant; a document naming another tenant is rejected
    pub tenant_hash: Option<String>,
    /// Overrides the sanitizer's default strictness
    pub strict_mode: Option<bool>,
    /// Overrides the sanitizer's default URL host allow-list
    pub allowed_domains: Option<Vec<String>>,
}

impl SanitizationContext {
    /// Creates a context for `environment`.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            tenant_hash: None,
            strict_mode: None,
            allowed_domains: None,
        }
    }

    /// Sets the caller's tenant.
    pub fn with_tenant(mut self, tenant_hash: impl Into<String>) -> Self {
        self.tenant_hash = Some(tenant_hash.into());
        self
    }

    /// Forces strict or lenient handling.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = Some(strict);
        self
    }

    /// Replaces the URL host allow-list.
    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }
}

/// The outcome of sanitizing a document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizationResult {
    /// The cleaned document
    pub sanitized: Value,
    /// Repairs that were applied
    pub warnings: Vec<SanitizationIssue>,
    /// Problems found
    pub errors: Vec<SanitizationIssue>,
    /// `false` when any error is high or critical
    pub is_valid: bool,
    /// Serialized size of the input in bytes
    pub original_size: usize,
    /// Serialized size of the output in bytes
    pub sanitized_size: usize,
}

impl SanitizationResult {
    /// Returns `true` when an error with `code` was reported.
    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    /// Returns `true` when a warning with `code` was reported.
    pub fn has_warning(&self, code: IssueCode) -> bool {
        self.warnings.iter().any(|issue| issue.code == code)
    }

    /// Returns the error messages.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|issue| issue.message.clone()).collect()
    }
}

/// Cleans untrusted documents against registered schemas.
///
/// # Examples
///
/// ```rust
/// use trustcfg::domain::Environment;
/// use trustcfg::service::{SanitizationContext, Sanitizer};
/// use serde_json::json;
///
/// let sanitizer = Sanitizer::with_defaults();
/// let context = SanitizationContext::new(Environment::Production);
///
/// let result = sanitizer.sanitize(&json!({ "API_BASE_URL": "http://evil.test" }), "environment", &context);
/// assert!(!result.is_valid);
/// assert_eq!(result.sanitized["API_BASE_URL"], "");
/// ```
pub struct Sanitizer {
    registry: Arc<SchemaRegistry>,
    settings: SanitizerSettings,
    patterns: Mutex<HashMap<String, Option<Regex>>>,
}

impl fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sanitizer")
            .field("schemas", &self.registry.schema_types())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Sanitizer {
    /// Creates a sanitizer over a shared schema registry.
    pub fn new(registry: Arc<SchemaRegistry>, settings: SanitizerSettings) -> Self {
        Self {
            registry,
            settings,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a sanitizer with the built-in schemas and default settings.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(SchemaRegistry::with_builtin_schemas()),
            SanitizerSettings::default(),
        )
    }

    /// The shared schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// The active settings.
    pub fn settings(&self) -> &SanitizerSettings {
        &self.settings
    }

    /// Registers (or replaces) a schema.
    pub fn register_schema(&self, schema_type: impl Into<String>, schema: Schema) -> Result<()> {
        self.registry.register(schema_type, schema)
    }

    /// Sanitizes `document` against the schema registered as `schema_type`.
    pub fn sanitize(
        &self,
        document: &Value,
        schema_type: &str,
        context: &SanitizationContext,
    ) -> SanitizationResult {
        let original_size = serialized_size(document);
        let mut pass = Pass {
            sanitizer: self,
            environment: context.environment,
            tenant_hash: context.tenant_hash.as_deref(),
            strict: context.strict_mode.unwrap_or(self.settings.strict_mode),
            allowed_domains: context
                .allowed_domains
                .as_deref()
                .unwrap_or(&self.settings.allowed_domains),
            warnings: Vec::new(),
            errors: Vec::new(),
        };

        let sanitized = if original_size > self.settings.max_document_size {
            pass.error(
                "",
                IssueCode::DocumentTooLarge,
                Severity::Critical,
                format!(
                    "Document size {} bytes exceeds maximum of {} bytes",
                    original_size, self.settings.max_document_size
                ),
            );
            Value::Object(Map::new())
        } else if let Some(schema) = self.registry.get(schema_type) {
            match document.as_object() {
                Some(map) => Value::Object(pass.object(map, &schema, &ConfigPath::from(""))),
                None => {
                    pass.error(
                        "",
                        IssueCode::InvalidDocument,
                        Severity::Critical,
                        format!("Document must be an object, found {}", type_name(document)),
                    );
                    Value::Object(Map::new())
                }
            }
        } else {
            pass.error(
                "",
                IssueCode::UnknownSchema,
                Severity::Critical,
                format!("Unknown schema type: {}", schema_type),
            );
            Value::Object(Map::new())
        };

        let is_valid = !pass.errors.iter().any(|issue| issue.severity.is_blocking());
        if !is_valid {
            tracing::debug!(
                schema_type,
                environment = %context.environment,
                errors = pass.errors.len(),
                "document failed sanitization"
            );
        }

        SanitizationResult {
            sanitized_size: serialized_size(&sanitized),
            sanitized,
            warnings: pass.warnings,
            errors: pass.errors,
            is_valid,
            original_size,
        }
    }

    /// Tests `value` against a schema pattern, compiling it once.
    ///
    /// Returns `None` when the pattern does not compile.
    fn pattern_matches(&self, pattern: &str, value: &str) -> Option<bool> {
        let mut cache = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        let compiled = cache
            .entry(pattern.to_string())
            .or_insert_with(|| Regex::new(pattern).ok());
        compiled.as_ref().map(|re| re.is_match(value))
    }
}

/// State for one `sanitize` call.
struct Pass<'a> {
    sanitizer: &'a Sanitizer,
    environment: Environment,
    tenant_hash: Option<&'a str>,
    strict: bool,
    allowed_domains: &'a [String],
    warnings: Vec<SanitizationIssue>,
    errors: Vec<SanitizationIssue>,
}

impl Pass<'_> {
    fn error(&mut self, path: &str, code: IssueCode, severity: Severity, message: String) {
        self.errors.push(SanitizationIssue {
            path: path.to_string(),
            code,
            message,
            severity,
        });
    }

    fn warning(&mut self, path: &str, code: IssueCode, message: String) {
        self.warnings.push(SanitizationIssue {
            path: path.to_string(),
            code,
            message,
            severity: Severity::Low,
        });
    }

    fn object(&mut self, map: &Map<String, Value>, schema: &Schema, path: &ConfigPath) -> Map<String, Value> {
        let mut out = Map::new();

        for name in &schema.required {
            if !map.contains_key(name) {
                let child = path.child(name);
                self.error(
                    child.as_str(),
                    IssueCode::MissingRequired,
                    Severity::High,
                    format!("Missing required property: {}", child),
                );
            }
        }

        for (name, value) in map {
            let child = path.child(name);
            match schema.properties.get(name) {
                Some(prop) => {
                    if let Some(clean) = self.property(value, prop, &child) {
                        out.insert(name.clone(), clean);
                    }
                }
                None if schema.additional_properties_allowed => {
                    out.insert(name.clone(), generic(value));
                }
                None => {
                    let message = format!("Unknown property removed: {}", child);
                    if self.strict {
                        self.error(child.as_str(), IssueCode::UnknownProperty, Severity::High, message);
                    } else {
                        self.warning(child.as_str(), IssueCode::UnknownProperty, message);
                    }
                }
            }
        }

        out
    }

    /// Sanitizes one declared property. `None` drops it.
    fn property(&mut self, value: &Value, prop: &PropertySchema, path: &ConfigPath) -> Option<Value> {
        match prop.value_type {
            ValueType::String => self.string_property(value, prop, path),
            ValueType::Number => Some(self.number_property(value, prop, path)),
            ValueType::Boolean => Some(self.boolean_property(value, path)),
            ValueType::Object => match value {
                Value::Object(map) => Some(match &prop.schema {
                    Some(nested) => Value::Object(self.object(map, nested, path)),
                    None => generic(value),
                }),
                other => {
                    self.type_error(path, prop, other);
                    None
                }
            },
            ValueType::Array => match value {
                Value::Array(items) => Some(Value::Array(match &prop.items {
                    Some(item_schema) => items
                        .iter()
                        .enumerate()
                        .filter_map(|(i, item)| {
                            self.property(item, item_schema, &path.child(&i.to_string()))
                        })
                        .collect(),
                    None => items.iter().map(generic).collect(),
                })),
                other => {
                    self.type_error(path, prop, other);
                    None
                }
            },
        }
    }

    fn type_error(&mut self, path: &ConfigPath, prop: &PropertySchema, found: &Value) {
        self.error(
            path.as_str(),
            IssueCode::InvalidType,
            Severity::High,
            format!(
                "Invalid type for {}: expected {}, found {}",
                path,
                prop.value_type.as_str(),
                type_name(found)
            ),
        );
    }

    fn string_property(&mut self, value: &Value, prop: &PropertySchema, path: &ConfigPath) -> Option<Value> {
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(_) | Value::Bool(_) => {
                let text = value.to_string();
                self.warning(
                    path.as_str(),
                    IssueCode::TypeCoerced,
                    format!("Converted {} to string for {}", type_name(value), path),
                );
                text
            }
            other => {
                self.type_error(path, prop, other);
                return None;
            }
        };
        Some(Value::String(self.string(raw, prop, path)))
    }

    fn string(&mut self, raw: String, prop: &PropertySchema, path: &ConfigPath) -> String {
        let mut s = raw;

        if prop.sanitize {
            let scrubbed = if prop.allow_html {
                clean_markup(&s)
            } else {
                strip_markup(&s)
            };
            if scrubbed != s {
                self.warning(
                    path.as_str(),
                    IssueCode::MarkupRemoved,
                    format!("Removed unsafe content from {}", path),
                );
                s = scrubbed;
            }
        }

        if let Some(max) = prop.max_length {
            if s.chars().count() > max {
                s = s.chars().take(max).collect();
                self.warning(
                    path.as_str(),
                    IssueCode::Truncated,
                    format!("{} truncated to {} characters", path, max),
                );
            }
        }

        // An empty string is a cleared value.
        if s.is_empty() {
            return s;
        }

        if let Some(min) = prop.min_length {
            if s.chars().count() < min {
                self.error(
                    path.as_str(),
                    IssueCode::TooShort,
                    Severity::Medium,
                    format!("{} must be at least {} characters", path, min),
                );
            }
        }

        if let Some(format) = prop.format {
            s = self.format(s, format, path);
            if s.is_empty() {
                return s;
            }
        }

        if let Some(pattern) = &prop.pattern {
            match self.sanitizer.pattern_matches(pattern, &s) {
                Some(true) => {}
                Some(false) => {
                    self.error(
                        path.as_str(),
                        IssueCode::PatternMismatch,
                        Severity::Medium,
                        format!("{} does not match the required pattern", path),
                    );
                    return String::new();
                }
                None => self.warning(
                    path.as_str(),
                    IssueCode::PatternMismatch,
                    format!("Pattern for {} could not be compiled; not enforced", path),
                ),
            }
        }

        if let Some(allowed) = &prop.allowed_values {
            if !allowed.iter().any(|a| a == &s) {
                self.error(
                    path.as_str(),
                    IssueCode::InvalidEnum,
                    Severity::Medium,
                    format!("Invalid value for {}: '{}' is not one of {:?}", path, s, allowed),
                );
                return String::new();
            }
        }

        s
    }

    fn format(&mut self, s: String, format: StringFormat, path: &ConfigPath) -> String {
        match format {
            StringFormat::Url => self.url(s, path),
            StringFormat::Email => {
                if EMAIL.is_match(&s) {
                    s
                } else {
                    self.error(
                        path.as_str(),
                        IssueCode::InvalidEmail,
                        Severity::Medium,
                        format!("Invalid email address for {}", path),
                    );
                    String::new()
                }
            }
            StringFormat::TenantHash => self.tenant_hash(s, path),
            StringFormat::Path => {
                let normalized = normalize_path(&s);
                if normalized != s {
                    self.warning(
                        path.as_str(),
                        IssueCode::PathNormalized,
                        format!("Normalized path for {}", path),
                    );
                }
                normalized
            }
            StringFormat::Uuid => {
                if UUID.is_match(&s) {
                    s.to_lowercase()
                } else {
                    self.error(
                        path.as_str(),
                        IssueCode::InvalidUuid,
                        Severity::Medium,
                        format!("Invalid UUID for {}", path),
                    );
                    String::new()
                }
            }
        }
    }

    fn url(&mut self, s: String, path: &ConfigPath) -> String {
        let parsed = match Url::parse(&s) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.error(
                    path.as_str(),
                    IssueCode::InvalidUrl,
                    Severity::High,
                    format!("Invalid URL for {}: {}", path, e),
                );
                return String::new();
            }
        };

        match parsed.scheme() {
            "https" => {}
            "http" if self.environment.is_production() => {
                self.error(
                    path.as_str(),
                    IssueCode::InsecureUrl,
                    Severity::Critical,
                    format!("Insecure URL for {}: production requires https", path),
                );
                return String::new();
            }
            "http" => {}
            other => {
                self.error(
                    path.as_str(),
                    IssueCode::InvalidProtocol,
                    Severity::High,
                    format!("Protocol '{}' is not allowed for {}", other, path),
                );
                return String::new();
            }
        }

        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        let allowed = self.allowed_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        });
        if !allowed {
            let message = format!("Domain '{}' is not allowed for {}", host, path);
            if self.strict {
                self.error(path.as_str(), IssueCode::DisallowedDomain, Severity::High, message);
                return String::new();
            }
            self.warning(path.as_str(), IssueCode::DisallowedDomain, message);
        }

        s
    }

    fn tenant_hash(&mut self, s: String, path: &ConfigPath) -> String {
        if s.contains("..") || s.contains('/') || s.contains('\\') {
            self.error(
                path.as_str(),
                IssueCode::AttackPattern,
                Severity::Critical,
                format!("Attack pattern detected in {}", path),
            );
            return String::new();
        }
        if !TENANT_HASH.is_match(&s) {
            self.error(
                path.as_str(),
                IssueCode::InvalidTenantHash,
                Severity::High,
                format!("Invalid tenant hash for {}", path),
            );
            return String::new();
        }
        if let Some(expected) = self.tenant_hash {
            if expected != s {
                self.error(
                    path.as_str(),
                    IssueCode::TenantMismatch,
                    Severity::High,
                    format!("{} does not match the caller's tenant", path),
                );
                return String::new();
            }
        }
        s
    }

    fn number_property(&mut self, value: &Value, prop: &PropertySchema, path: &ConfigPath) -> Value {
        let n = match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            other => match parse_number(other) {
                Some(n) => {
                    self.warning(
                        path.as_str(),
                        IssueCode::TypeCoerced,
                        format!("Converted {} to number for {}", type_name(other), path),
                    );
                    n
                }
                _ => {
                    self.error(
                        path.as_str(),
                        IssueCode::InvalidNumber,
                        Severity::Medium,
                        format!("{} is not a number; reset to 0", path),
                    );
                    0.0
                }
            },
        };

        let mut n = n;
        if let Some(min) = prop.minimum {
            if n < min {
                self.error(
                    path.as_str(),
                    IssueCode::BelowMinimum,
                    Severity::Medium,
                    format!("{} is below minimum {}; clamped", path, min),
                );
                n = min;
            }
        }
        if let Some(max) = prop.maximum {
            if n > max {
                self.warning(
                    path.as_str(),
                    IssueCode::AboveMaximum,
                    format!("{} exceeds maximum {}; clamped", path, max),
                );
                n = max;
            }
        }
        number_value(n)
    }

    fn boolean_property(&mut self, value: &Value, path: &ConfigPath) -> Value {
        if value.is_boolean() {
            return value.clone();
        }
        match parse_flag(value) {
            Some(flag) => {
                self.warning(
                    path.as_str(),
                    IssueCode::TypeCoerced,
                    format!("Converted {} to boolean for {}", type_name(value), path),
                );
                Value::Bool(flag)
            }
            None => {
                self.error(
                    path.as_str(),
                    IssueCode::InvalidType,
                    Severity::Medium,
                    format!("{} is not a boolean; reset to false", path),
                );
                Value::Bool(false)
            }
        }
    }
}

/// Sanitizes a value no schema describes: strings lose markup, containers
/// are walked.
fn generic(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(strip_markup(s)),
        Value::Array(items) => Value::Array(items.iter().map(generic).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), generic(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn normalize_path(s: &str) -> String {
    let mut out = UNSAFE_PATH_CHARS.replace_all(s, "").into_owned();
    while out.contains("..") {
        out = out.replace("..", "");
    }
    REPEATED_SLASHES.replace_all(&out, "/").into_owned()
}
