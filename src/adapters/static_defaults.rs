// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed defaults source.

use crate::domain::{Environment, Result};
use crate::ports::DefaultsSource;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Serves defaults from an in-memory table keyed by schema type and
/// environment.
///
/// # Examples
///
/// ```rust
/// use trustcfg::adapters::StaticDefaults;
/// use trustcfg::domain::Environment;
/// use serde_json::json;
///
/// let defaults = StaticDefaults::new()
///     .with_defaults("runtime", Environment::Staging, json!({ "features": { "beta": true } }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDefaults {
    values: HashMap<(String, Environment), Value>,
}

impl StaticDefaults {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds defaults for a schema type and environment.
    pub fn with_defaults(
        mut self,
        schema_type: impl Into<String>,
        environment: Environment,
        document: Value,
    ) -> Self {
        self.values.insert((schema_type.into(), environment), document);
        self
    }
}

#[async_trait]
impl DefaultsSource for StaticDefaults {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_defaults(
        &self,
        schema_type: &str,
        environment: Environment,
    ) -> Result<Option<Value>> {
        Ok(self
            .values
            .get(&(schema_type.to_string(), environment))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_known_and_unknown() {
        let defaults =
            StaticDefaults::new().with_defaults("runtime", Environment::Staging, json!({ "a": 1 }));
        assert_eq!(
            defaults
                .fetch_defaults("runtime", Environment::Staging)
                .await
                .unwrap(),
            Some(json!({ "a": 1 }))
        );
        assert_eq!(
            defaults
                .fetch_defaults("runtime", Environment::Production)
                .await
                .unwrap(),
            None
        );
    }
}
