// SPDX-License-Identifier: MIT OR Apache-2.0

//! The configuration manager.
//!
//! Produces [`ValidatedConfiguration`] values: environment-specific baselines
//! (optionally overlaid with remote defaults), externally ingested documents
//! and inheritance between environments, all validated against the shared
//! schema registry and an environment security policy, then cached per
//! `(schema type, environment)` for a configurable TTL.

use crate::adapters::SystemClock;
use crate::domain::document::{deep_merge, empty_object};
use crate::domain::schema::{validate_structure, SchemaRegistry};
use crate::domain::{
    CacheSettings, ConfigPath, Environment, Result, TrustError, ValidatedConfiguration,
    ValidationOptions, ValidationReport,
};
use crate::ports::{ChangeCallback, Clock, DefaultsSource, DocumentWatcher};
use crate::service::environment_defaults::environment_defaults;
use crate::service::inheritance::{check_acyclic, InheritanceRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Instant;

type CacheKey = (String, Environment);

/// Options for [`ConfigurationManager::load_configuration`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Serve from and store into the cache
    pub use_cache: bool,
    /// Validate before returning
    pub validate_schema: bool,
    /// Apply registered inheritance rules
    pub apply_inheritance: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            validate_schema: true,
            apply_inheritance: false,
        }
    }
}

impl LoadOptions {
    /// Bypasses the cache.
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    /// Enables inheritance.
    pub fn with_inheritance(mut self) -> Self {
        self.apply_inheritance = true;
        self
    }
}

/// A snapshot of manager counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationMetrics {
    /// Loads that built a configuration
    pub total_loads: u64,
    /// Loads answered from the cache
    pub cache_hits: u64,
    /// Mean build time of non-cached loads, in milliseconds
    pub average_load_time_ms: f64,
    /// Validation errors reported across all validations
    pub validation_error_count: u64,
}

/// Hot reload settings for [`ConfigurationManager::watch_configuration`].
pub struct HotReloadConfig {
    /// Whether hot reload runs at all
    pub enabled: bool,
    /// Environment incoming documents are ingested for
    pub environment: Environment,
    /// Producer of fresh documents
    pub watcher: Box<dyn DocumentWatcher>,
}

impl HotReloadConfig {
    /// Creates an enabled hot reload configuration.
    pub fn new(environment: Environment, watcher: Box<dyn DocumentWatcher>) -> Self {
        Self {
            enabled: true,
            environment,
            watcher,
        }
    }
}

impl fmt::Debug for HotReloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotReloadConfig")
            .field("enabled", &self.enabled)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

struct CacheEntry {
    configuration: Arc<ValidatedConfiguration>,
    stored_at: DateTime<Utc>,
}

struct Subscriber {
    schema_type: String,
    callback: ChangeCallback,
}

struct Inner {
    registry: Arc<SchemaRegistry>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    defaults_source: Option<Arc<dyn DefaultsSource>>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    documents: RwLock<HashMap<CacheKey, Value>>,
    rules: RwLock<Vec<InheritanceRule>>,
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_subscriber: AtomicU64,
    total_loads: AtomicU64,
    cache_hits: AtomicU64,
    load_time_micros: AtomicU64,
    validation_errors: AtomicU64,
}

/// Validated, cached, environment-aware configuration.
///
/// Cloning is cheap; clones share the same cache, rules and subscribers.
///
/// # Examples
///
/// ```rust
/// use trustcfg::domain::Environment;
/// use trustcfg::service::{ConfigurationManager, LoadOptions};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> trustcfg::domain::Result<()> {
/// let manager = ConfigurationManager::builder().build();
///
/// let first = manager.load_configuration("runtime", Environment::Staging, LoadOptions::default()).await?;
/// let second = manager.load_configuration("runtime", Environment::Staging, LoadOptions::default()).await?;
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(manager.get_metrics().cache_hits, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigurationManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("settings", &self.inner.settings)
            .field("metrics", &self.get_metrics())
            .finish_non_exhaustive()
    }
}

impl ConfigurationManager {
    /// Creates a builder.
    pub fn builder() -> ConfigurationManagerBuilder {
        ConfigurationManagerBuilder::new()
    }

    /// The shared schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.inner.registry
    }

    /// Loads the configuration for `schema_type` in `environment`.
    ///
    /// A fresh cache entry is returned as the same `Arc` on every hit.
    /// Otherwise the stored document (or the environment baseline) is
    /// optionally inherited into and validated, then cached.
    pub async fn load_configuration(
        &self,
        schema_type: &str,
        environment: Environment,
        options: LoadOptions,
    ) -> Result<Arc<ValidatedConfiguration>> {
        self.inner.registry.require(schema_type)?;
        let key = (schema_type.to_string(), environment);

        if options.use_cache {
            if let Some(hit) = self.cached(&key) {
                self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
        }

        let started = Instant::now();
        let mut document = self.base_document(schema_type, environment).await?;
        if options.apply_inheritance {
            self.apply_inheritance(schema_type, environment, &mut document)
                .await?;
        }
        if options.validate_schema {
            self.ensure_valid(&document, schema_type, environment, ValidationOptions::strict())?;
        }

        let configuration = Arc::new(ValidatedConfiguration::new(
            schema_type,
            environment,
            self.inner.clock.now(),
            document,
        ));
        self.store(key, Arc::clone(&configuration));

        self.inner.total_loads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .load_time_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        tracing::debug!(schema_type, environment = %environment, "loaded configuration");

        Ok(configuration)
    }

    /// Validates `document` structurally and against the environment policy.
    ///
    /// Unknown schema types are reported in the result, not as an error.
    pub fn validate_configuration(
        &self,
        document: &Value,
        schema_type: &str,
        options: ValidationOptions,
    ) -> ValidationReport {
        self.validate_for(document, schema_type, None, options)
    }

    /// Validates and stores an externally supplied document.
    ///
    /// The document is layered over the environment baseline, validated,
    /// cached and announced to watchers of `schema_type`.
    pub fn ingest_document(
        &self,
        schema_type: &str,
        environment: Environment,
        document: Value,
        options: ValidationOptions,
    ) -> Result<Arc<ValidatedConfiguration>> {
        self.inner.registry.require(schema_type)?;

        let mut layered = environment_defaults(schema_type, environment).unwrap_or_else(empty_object);
        deep_merge(&mut layered, &document, true);
        self.ensure_valid(&layered, schema_type, environment, options)?;

        let key = (schema_type.to_string(), environment);
        self.inner
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), layered.clone());

        let configuration = Arc::new(ValidatedConfiguration::new(
            schema_type,
            environment,
            self.inner.clock.now(),
            layered,
        ));
        self.store(key, Arc::clone(&configuration));
        tracing::info!(schema_type, environment = %environment, "ingested configuration");

        self.notify(schema_type, &configuration);
        Ok(configuration)
    }

    /// Registers an inheritance rule.
    ///
    /// Rejects rules without paths, malformed paths and any edge that would
    /// close a cycle.
    pub fn register_inheritance_rule(&self, rule: InheritanceRule) -> Result<()> {
        rule.check()?;
        let mut rules = self.inner.rules.write().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = check_acyclic(&rules, &rule) {
            tracing::warn!(
                source = %rule.source_environment,
                target = %rule.target_environment,
                "rejected circular inheritance rule"
            );
            return Err(e);
        }
        tracing::debug!(
            source = %rule.source_environment,
            target = %rule.target_environment,
            paths = rule.paths.len(),
            "registered inheritance rule"
        );
        rules.push(rule);
        Ok(())
    }

    /// Registered rules in registration order.
    pub fn list_inheritance_rules(&self) -> Vec<InheritanceRule> {
        self.inner
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Builds the configuration for `environment` with inheritance applied.
    ///
    /// The result is validated but not cached.
    pub async fn get_effective_configuration(
        &self,
        schema_type: &str,
        environment: Environment,
    ) -> Result<Arc<ValidatedConfiguration>> {
        self.inner.registry.require(schema_type)?;
        let mut document = self.base_document(schema_type, environment).await?;
        self.apply_inheritance(schema_type, environment, &mut document)
            .await?;
        self.ensure_valid(&document, schema_type, environment, ValidationOptions::strict())?;
        Ok(Arc::new(ValidatedConfiguration::new(
            schema_type,
            environment,
            self.inner.clock.now(),
            document,
        )))
    }

    /// Clears cached entries for `schema_type`, or everything when `None`.
    pub fn clear_cache(&self, schema_type: Option<&str>) {
        let mut cache = self.inner.cache.write().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        match schema_type {
            Some(schema_type) => cache.retain(|(cached, _), _| cached != schema_type),
            None => cache.clear(),
        }
        tracing::debug!(
            schema_type = schema_type.unwrap_or("*"),
            evicted = before - cache.len(),
            "cleared configuration cache"
        );
    }

    /// Current counters.
    pub fn get_metrics(&self) -> ConfigurationMetrics {
        let total_loads = self.inner.total_loads.load(Ordering::Relaxed);
        let micros = self.inner.load_time_micros.load(Ordering::Relaxed);
        ConfigurationMetrics {
            total_loads,
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            average_load_time_ms: if total_loads == 0 {
                0.0
            } else {
                micros as f64 / total_loads as f64 / 1000.0
            },
            validation_error_count: self.inner.validation_errors.load(Ordering::Relaxed),
        }
    }

    /// Subscribes `callback` to new configurations of `schema_type`.
    ///
    /// Without an enabled `hot_reload` this does nothing and the returned
    /// handle is inert. With one, the watcher is started and every document
    /// it produces is ingested for the configured environment; the callback
    /// then receives each newly validated configuration.
    pub fn watch_configuration(
        &self,
        schema_type: &str,
        callback: ChangeCallback,
        hot_reload: Option<HotReloadConfig>,
    ) -> Result<WatchHandle> {
        let Some(config) = hot_reload.filter(|c| c.enabled) else {
            return Ok(WatchHandle::inert());
        };
        self.inner.registry.require(schema_type)?;

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    schema_type: schema_type.to_string(),
                    callback,
                },
            );

        let mut handle = WatchHandle {
            manager: Arc::downgrade(&self.inner),
            subscription: Some(id),
            watcher: None,
        };

        let weak = Arc::downgrade(&self.inner);
        let schema = schema_type.to_string();
        let environment = config.environment;
        let mut watcher = config.watcher;
        watcher.watch(Arc::new(move |document: Value| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = ConfigurationManager { inner };
            if let Err(e) =
                manager.ingest_document(&schema, environment, document, ValidationOptions::strict())
            {
                tracing::warn!(
                    schema_type = %schema,
                    environment = %environment,
                    error = %e,
                    "hot reload rejected document"
                );
            }
        }))?;
        handle.watcher = Some(watcher);

        tracing::info!(schema_type, environment = %environment, "hot reload started");
        Ok(handle)
    }

    /// The baseline document for `schema_type` in `environment`.
    pub fn environment_defaults(&self, schema_type: &str, environment: Environment) -> Option<Value> {
        environment_defaults(schema_type, environment)
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<ValidatedConfiguration>> {
        let now = self.inner.clock.now();
        // A TTL too long to represent never expires.
        let ttl = i64::try_from(self.inner.settings.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds);
        let expired = |stored_at: DateTime<Utc>| ttl.is_some_and(|ttl| now - stored_at >= ttl);
        {
            let cache = self.inner.cache.read().unwrap_or_else(PoisonError::into_inner);
            match cache.get(key) {
                Some(entry) if !expired(entry.stored_at) => {
                    return Some(Arc::clone(&entry.configuration))
                }
                Some(_) => {}
                None => return None,
            }
        }
        let mut cache = self.inner.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache
            .get(key)
            .map(|entry| expired(entry.stored_at))
            .unwrap_or(false)
        {
            cache.remove(key);
            tracing::debug!(schema_type = %key.0, environment = %key.1, "cache entry expired");
        }
        None
    }

    fn store(&self, key: CacheKey, configuration: Arc<ValidatedConfiguration>) {
        let entry = CacheEntry {
            configuration,
            stored_at: self.inner.clock.now(),
        };
        self.inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    fn stored_document(&self, schema_type: &str, environment: Environment) -> Option<Value> {
        self.inner
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(schema_type.to_string(), environment))
            .cloned()
    }

    /// Ingested document if any, else baseline plus remote defaults.
    async fn base_document(&self, schema_type: &str, environment: Environment) -> Result<Value> {
        if let Some(document) = self.stored_document(schema_type, environment) {
            return Ok(document);
        }
        let mut document = environment_defaults(schema_type, environment).unwrap_or_else(empty_object);
        if let Some(source) = &self.inner.defaults_source {
            if let Some(remote) = source.fetch_defaults(schema_type, environment).await? {
                tracing::debug!(source = source.name(), schema_type, "applied remote defaults");
                deep_merge(&mut document, &remote, true);
            }
        }
        Ok(document)
    }

    /// Applies rules targeting `environment` in registration order.
    ///
    /// Source documents are taken as stored; their own inherited values are
    /// not resolved.
    async fn apply_inheritance(
        &self,
        schema_type: &str,
        environment: Environment,
        document: &mut Value,
    ) -> Result<()> {
        let rules: Vec<InheritanceRule> = self
            .list_inheritance_rules()
            .into_iter()
            .filter(|rule| rule.target_environment == environment)
            .collect();
        for rule in rules {
            let source = self
                .base_document(schema_type, rule.source_environment)
                .await?;
            rule.apply(&source, document);
        }
        Ok(())
    }

    fn ensure_valid(
        &self,
        document: &Value,
        schema_type: &str,
        environment: Environment,
        options: ValidationOptions,
    ) -> Result<()> {
        let report = self.validate_for(document, schema_type, Some(environment), options);
        if report.is_valid {
            return Ok(());
        }
        tracing::warn!(
            schema_type,
            environment = %environment,
            errors = report.errors.len(),
            "configuration failed validation"
        );
        Err(TrustError::ValidationFailed {
            schema_type: schema_type.to_string(),
            errors: report.error_messages(),
        })
    }

    fn validate_for(
        &self,
        document: &Value,
        schema_type: &str,
        expected: Option<Environment>,
        options: ValidationOptions,
    ) -> ValidationReport {
        let mut report = match self.inner.registry.get(schema_type) {
            Some(schema) => validate_structure(document, &schema, options),
            None => {
                let mut report = ValidationReport::new();
                report.error("", format!("Unknown schema type: {}", schema_type));
                report
            }
        };
        apply_environment_policy(document, expected, &mut report);
        self.inner
            .validation_errors
            .fetch_add(report.errors.len() as u64, Ordering::Relaxed);
        report
    }

    fn notify(&self, schema_type: &str, configuration: &Arc<ValidatedConfiguration>) {
        let callbacks: Vec<ChangeCallback> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.schema_type == schema_type)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(Arc::clone(configuration));
        }
    }
}

fn declared_environment(document: &Value) -> Option<Environment> {
    document
        .get("environment")
        .or_else(|| document.get("ENVIRONMENT"))?
        .as_str()?
        .parse()
        .ok()
}

fn flag(document: &Value, path: &str) -> Option<bool> {
    ConfigPath::from(path).lookup(document)?.as_bool()
}

fn text<'a>(document: &'a Value, path: &str) -> Option<&'a str> {
    ConfigPath::from(path).lookup(document)?.as_str()
}

/// Security rules that hold regardless of schema.
fn apply_environment_policy(
    document: &Value,
    expected: Option<Environment>,
    report: &mut ValidationReport,
) {
    // Unparseable labels are left to the schema's enumeration check.
    let declared = declared_environment(document);

    if let (Some(declared), Some(expected)) = (declared, expected) {
        if declared != expected {
            report.error(
                "environment",
                format!(
                    "Document declares environment '{}' but is loaded for '{}'",
                    declared, expected
                ),
            );
        }
    }

    let Some(environment) = expected.or(declared) else {
        return;
    };
    if !environment.is_production() {
        return;
    }

    if flag(document, "security.allowInsecure") == Some(true) {
        report.error(
            "security.allowInsecure",
            "Production configuration must not allow insecure connections",
        );
    }
    if flag(document, "security.enforceHTTPS") == Some(false) {
        report.error(
            "security.enforceHTTPS",
            "Production configuration must enforce HTTPS",
        );
    }
    for path in ["api.baseUrl", "api.cdnUrl", "API_BASE_URL", "CDN_URL"] {
        if text(document, path).map(|u| u.starts_with("http://")).unwrap_or(false) {
            report.error(path, format!("Production URL {} must use https", path));
        }
    }
    if flag(document, "DEBUG") == Some(true) {
        report.error("DEBUG", "Debug mode must be disabled in production");
    }
    if text(document, "logging.level") == Some("debug") || text(document, "LOG_LEVEL") == Some("debug") {
        report.warning("logging.level", "Debug logging in production");
    }
    if flag(document, "features.experimentalFeatures") == Some(true) {
        report.warning(
            "features.experimentalFeatures",
            "Experimental features enabled in production",
        );
    }
}

/// Handle returned by [`ConfigurationManager::watch_configuration`].
///
/// Dropping the handle also stops watching.
pub struct WatchHandle {
    manager: Weak<Inner>,
    subscription: Option<u64>,
    watcher: Option<Box<dyn DocumentWatcher>>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchHandle {
    fn inert() -> Self {
        Self {
            manager: Weak::new(),
            subscription: None,
            watcher: None,
        }
    }

    /// Returns `true` while the subscription is live.
    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Stops the watcher and removes the subscription.
    pub fn unwatch(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(id) = self.subscription.take() {
            if let Some(inner) = self.manager.upgrade() {
                inner
                    .subscribers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        }
        match self.watcher.take() {
            Some(mut watcher) => watcher.stop(),
            None => Ok(()),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "failed to stop configuration watcher");
        }
    }
}

/// Builder for [`ConfigurationManager`].
///
/// # Examples
///
/// ```rust
/// use trustcfg::adapters::StaticDefaults;
/// use trustcfg::domain::CacheSettings;
/// use trustcfg::service::ConfigurationManager;
/// use std::sync::Arc;
///
/// let manager = ConfigurationManager::builder()
///     .with_cache_settings(CacheSettings::default().with_ttl_seconds(60))
///     .with_defaults_source(Arc::new(StaticDefaults::new()))
///     .build();
/// ```
pub struct ConfigurationManagerBuilder {
    registry: Option<Arc<SchemaRegistry>>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    defaults_source: Option<Arc<dyn DefaultsSource>>,
}

impl ConfigurationManagerBuilder {
    /// Creates a builder with the built-in schemas, default cache settings
    /// and the system clock.
    pub fn new() -> Self {
        Self {
            registry: None,
            settings: CacheSettings::default(),
            clock: Arc::new(SystemClock),
            defaults_source: None,
        }
    }

    /// Shares an existing schema registry.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets cache parameters.
    pub fn with_cache_settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the clock used for cache expiry and timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a remote defaults source consulted on baseline builds.
    pub fn with_defaults_source(mut self, source: Arc<dyn DefaultsSource>) -> Self {
        self.defaults_source = Some(source);
        self
    }

    /// Builds the manager.
    pub fn build(self) -> ConfigurationManager {
        ConfigurationManager {
            inner: Arc::new(Inner {
                registry: self
                    .registry
                    .unwrap_or_else(|| Arc::new(SchemaRegistry::with_builtin_schemas())),
                settings: self.settings,
                clock: self.clock,
                defaults_source: self.defaults_source,
                cache: RwLock::new(HashMap::new()),
                documents: RwLock::new(HashMap::new()),
                rules: RwLock::new(Vec::new()),
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                total_loads: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
                load_time_micros: AtomicU64::new(0),
                validation_errors: AtomicU64::new(0),
            }),
        }
    }
}

impl Default for ConfigurationManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ManualClock, StaticDefaults};
    use crate::domain::schema::{RUNTIME_SCHEMA, TENANT_SCHEMA};
    use crate::service::inheritance::InheritanceStrategy;
    use serde_json::json;
    use std::sync::Mutex;

    fn manager() -> ConfigurationManager {
        ConfigurationManager::builder().build()
    }

    #[tokio::test]
    async fn test_cache_returns_same_instance() {
        let m = manager();
        let a = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Staging, LoadOptions::default())
            .await
            .unwrap();
        let b = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Staging, LoadOptions::default())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Staging, LoadOptions::uncached())
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        let metrics = m.get_metrics();
        assert_eq!(metrics.total_loads, 2);
        assert_eq!(metrics.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let clock = Arc::new(ManualClock::starting_now());
        let m = ConfigurationManager::builder()
            .with_clock(clock.clone())
            .with_cache_settings(CacheSettings::default().with_ttl_seconds(60))
            .build();
        let a = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Production, LoadOptions::default())
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(61));
        let b = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Production, LoadOptions::default())
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let clock = Arc::new(ManualClock::starting_now());
        let m = ConfigurationManager::builder()
            .with_clock(clock.clone())
            .with_cache_settings(CacheSettings::default().with_ttl_seconds(u64::MAX))
            .build();
        let a = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Production, LoadOptions::default())
            .await
            .unwrap();
        clock.advance(chrono::Duration::days(3650));
        let b = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Production, LoadOptions::default())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(m.get_metrics().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_clear_cache_by_type() {
        let m = manager();
        let a = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Development, LoadOptions::default())
            .await
            .unwrap();
        m.clear_cache(Some("environment"));
        let b = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Development, LoadOptions::default())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        m.clear_cache(Some(RUNTIME_SCHEMA));
        let c = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Development, LoadOptions::default())
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        m.clear_cache(None);
    }

    #[tokio::test]
    async fn test_environment_baselines() {
        let m = manager();
        let dev = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Development, LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(dev.get("security.allowInsecure"), Some(&json!(true)));
        assert_eq!(dev.get("logging.level"), Some(&json!("debug")));
        assert_eq!(dev.environment(), Environment::Development);

        let prod = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Production, LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(prod.get("security.allowInsecure"), Some(&json!(false)));
        assert_eq!(prod.get("logging.level"), Some(&json!("error")));
    }

    #[tokio::test]
    async fn test_unknown_schema_and_tenant_without_hash() {
        let m = manager();
        assert!(matches!(
            m.load_configuration("nope", Environment::Staging, LoadOptions::default())
                .await,
            Err(TrustError::UnknownSchema { .. })
        ));
        assert!(matches!(
            m.load_configuration(TENANT_SCHEMA, Environment::Staging, LoadOptions::default())
                .await,
            Err(TrustError::ValidationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_defaults_overlay() {
        let source = StaticDefaults::new().with_defaults(
            RUNTIME_SCHEMA,
            Environment::Staging,
            json!({ "api": { "timeout": 45000 } }),
        );
        let m = ConfigurationManager::builder()
            .with_defaults_source(Arc::new(source))
            .build();
        let config = m
            .load_configuration(RUNTIME_SCHEMA, Environment::Staging, LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(config.get("api.timeout"), Some(&json!(45000)));
        assert_eq!(config.get("api.retryAttempts"), Some(&json!(3)));
    }

    #[test]
    fn test_validate_reports_missing_and_unknown() {
        let m = manager();
        let doc = json!({ "environment": "staging", "api": { "baseUrl": "https://x.example.com" }, "bogus": 1 });

        let strict = m.validate_configuration(&doc, RUNTIME_SCHEMA, ValidationOptions::strict());
        assert!(!strict.is_valid);
        let messages = strict.error_messages();
        assert!(messages.iter().any(|m| m.contains("Missing required property: security")));
        assert!(messages.iter().any(|m| m.contains("Unknown property: bogus")));

        let lenient = m.validate_configuration(&doc, RUNTIME_SCHEMA, ValidationOptions::lenient());
        assert!(lenient.warnings.iter().any(|w| w.message.contains("Unknown property")));
        assert!(m.get_metrics().validation_error_count >= 4);
    }

    #[test]
    fn test_production_policy() {
        let m = manager();
        let mut doc = environment_defaults(RUNTIME_SCHEMA, Environment::Production).unwrap();
        assert!(m
            .validate_configuration(&doc, RUNTIME_SCHEMA, ValidationOptions::strict())
            .is_valid);

        doc["security"]["allowInsecure"] = json!(true);
        doc["logging"]["level"] = json!("debug");
        let report = m.validate_configuration(&doc, RUNTIME_SCHEMA, ValidationOptions::strict());
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "security.allowInsecure");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_validate_unknown_schema_is_data() {
        let report = manager().validate_configuration(&json!({}), "nope", ValidationOptions::strict());
        assert!(!report.is_valid);
    }

    #[tokio::test]
    async fn test_ingest_layers_over_defaults_and_notifies() {
        let m = manager();
        let config = m
            .ingest_document(
                TENANT_SCHEMA,
                Environment::Staging,
                json!({ "tenantHash": "tenant12345", "widget": { "position": "top-left" } }),
                ValidationOptions::strict(),
            )
            .unwrap();
        assert_eq!(config.get("widget.position"), Some(&json!("top-left")));
        assert_eq!(config.get("widget.size"), Some(&json!("medium")));

        let loaded = m
            .load_configuration(TENANT_SCHEMA, Environment::Staging, LoadOptions::default())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&config, &loaded));
    }

    #[test]
    fn test_ingest_rejects_environment_mismatch() {
        let m = manager();
        let doc = environment_defaults(RUNTIME_SCHEMA, Environment::Development).unwrap();
        let err = m
            .ingest_document(RUNTIME_SCHEMA, Environment::Production, doc, ValidationOptions::strict())
            .unwrap_err();
        assert!(matches!(err, TrustError::ValidationFailed { .. }));
    }

    #[test]
    fn test_inheritance_registration() {
        let m = manager();
        m.register_inheritance_rule(
            InheritanceRule::new(Environment::Development, Environment::Staging, InheritanceStrategy::Merge)
                .with_path("features"),
        )
        .unwrap();
        let err = m
            .register_inheritance_rule(
                InheritanceRule::new(Environment::Staging, Environment::Development, InheritanceStrategy::Override)
                    .with_path("features"),
            )
            .unwrap_err();
        assert!(matches!(err, TrustError::CircularDependency { .. }));
        assert_eq!(m.list_inheritance_rules().len(), 1);

        let err = m
            .register_inheritance_rule(InheritanceRule::new(
                Environment::Staging,
                Environment::Production,
                InheritanceStrategy::Merge,
            ))
            .unwrap_err();
        assert!(matches!(err, TrustError::InvalidInheritanceRule { .. }));
    }

    #[tokio::test]
    async fn test_effective_configuration_applies_rules() {
        let m = manager();
        m.register_inheritance_rule(
            InheritanceRule::new(Environment::Development, Environment::Staging, InheritanceStrategy::Override)
                .with_path("api.timeout")
                .with_path("features.experimentalFeatures"),
        )
        .unwrap();
        m.ingest_document(
            RUNTIME_SCHEMA,
            Environment::Development,
            json!({ "api": { "timeout": 5000 } }),
            ValidationOptions::strict(),
        )
        .unwrap();

        let effective = m
            .get_effective_configuration(RUNTIME_SCHEMA, Environment::Staging)
            .await
            .unwrap();
        assert_eq!(effective.get("api.timeout"), Some(&json!(5000)));
        assert_eq!(effective.get("features.experimentalFeatures"), Some(&json!(true)));
        assert_eq!(effective.get("logging.level"), Some(&json!("info")));
    }

    #[tokio::test]
    async fn test_inheritance_cannot_bypass_production_policy() {
        let m = manager();
        m.register_inheritance_rule(
            InheritanceRule::new(Environment::Development, Environment::Production, InheritanceStrategy::Override)
                .with_path("security"),
        )
        .unwrap();
        let result = m
            .load_configuration(
                RUNTIME_SCHEMA,
                Environment::Production,
                LoadOptions::default().with_inheritance(),
            )
            .await;
        assert!(matches!(result, Err(TrustError::ValidationFailed { .. })));
    }

    #[test]
    fn test_watch_without_hot_reload_is_inert() {
        let m = manager();
        let handle = m
            .watch_configuration(RUNTIME_SCHEMA, Arc::new(|_| {}), None)
            .unwrap();
        assert!(!handle.is_active());
        handle.unwatch().unwrap();
    }

    struct ManualWatcher {
        slot: Arc<Mutex<Option<crate::ports::DocumentCallback>>>,
    }

    impl DocumentWatcher for ManualWatcher {
        fn watch(&mut self, callback: crate::ports::DocumentCallback) -> Result<()> {
            *self.slot.lock().unwrap() = Some(callback);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            *self.slot.lock().unwrap() = None;
            Ok(())
        }
    }

    #[test]
    fn test_hot_reload_ingests_and_notifies() {
        let m = manager();
        let slot = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = m
            .watch_configuration(
                RUNTIME_SCHEMA,
                Arc::new(move |config: Arc<ValidatedConfiguration>| {
                    sink.lock().unwrap().push(config.get("api.timeout").cloned());
                }),
                Some(HotReloadConfig::new(
                    Environment::Staging,
                    Box::new(ManualWatcher { slot: Arc::clone(&slot) }),
                )),
            )
            .unwrap();
        assert!(handle.is_active());

        let push = slot.lock().unwrap().clone().unwrap();
        push(json!({ "api": { "timeout": 7000 } }));
        // Rejected documents do not reach subscribers.
        push(json!({ "api": { "timeout": "slow" } }));
        assert_eq!(seen.lock().unwrap().as_slice(), &[Some(json!(7000))]);

        handle.unwatch().unwrap();
        assert!(slot.lock().unwrap().is_none());
    }
}
