// SPDX-License-Identifier: MIT OR Apache-2.0

//! Environment inheritance rules.
//!
//! A rule lets a target environment borrow selected paths from a source
//! environment. Rules form a directed graph over environments which must stay
//! acyclic.

use crate::domain::document::deep_merge;
use crate::domain::{ConfigPath, Environment, Result, TrustError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a source value is combined with the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InheritanceStrategy {
    /// Deep-merge objects; the target's own leaves win
    Merge,
    /// Replace the target value outright
    Override,
}

/// A declared inheritance edge.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::Environment;
/// use trustcfg::service::{InheritanceRule, InheritanceStrategy};
///
/// let rule = InheritanceRule::new(Environment::Development, Environment::Staging, InheritanceStrategy::Merge)
///     .with_path("features");
/// assert_eq!(rule.paths.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritanceRule {
    /// Environment values are borrowed from
    pub source_environment: Environment,
    /// Environment receiving the values
    pub target_environment: Environment,
    /// Combination strategy
    pub strategy: InheritanceStrategy,
    /// Dotted paths the rule covers
    pub paths: Vec<ConfigPath>,
}

impl InheritanceRule {
    /// Creates a rule with no paths.
    pub fn new(
        source_environment: Environment,
        target_environment: Environment,
        strategy: InheritanceStrategy,
    ) -> Self {
        Self {
            source_environment,
            target_environment,
            strategy,
            paths: Vec::new(),
        }
    }

    /// Adds a covered path.
    pub fn with_path(mut self, path: impl Into<ConfigPath>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Parses a rule from an untyped document.
    ///
    /// Missing or malformed fields yield
    /// [`TrustError::InvalidInheritanceRule`].
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| TrustError::invalid_rule(e.to_string()))
    }

    /// Checks the rule on its own, without regard to other rules.
    pub fn check(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(TrustError::invalid_rule("Rule must declare at least one path"));
        }
        if let Some(bad) = self.paths.iter().find(|p| p.is_malformed()) {
            return Err(TrustError::invalid_rule(format!("Malformed path: '{}'", bad)));
        }
        Ok(())
    }

    /// Applies this rule, copying covered paths from `source` into `target`.
    pub fn apply(&self, source: &Value, target: &mut Value) {
        for path in &self.paths {
            let Some(value) = path.lookup(source) else {
                tracing::debug!(path = %path, source = %self.source_environment, "inherited path absent in source");
                continue;
            };
            match (self.strategy, path.lookup(target).is_some()) {
                (InheritanceStrategy::Merge, true) => {
                    let mut merged = path.lookup(target).cloned().unwrap_or(Value::Null);
                    deep_merge(&mut merged, value, false);
                    path.assign(target, merged);
                }
                _ => {
                    path.assign(target, value.clone());
                }
            }
        }
    }
}

/// Fails with [`TrustError::CircularDependency`] if adding `candidate` to
/// `existing` would close a cycle.
///
/// Walks forward from the candidate's target; reaching its source means the
/// new edge would close a loop.
pub fn check_acyclic(existing: &[InheritanceRule], candidate: &InheritanceRule) -> Result<()> {
    let source = candidate.source_environment;
    let target = candidate.target_environment;
    let cycle = || TrustError::CircularDependency {
        source_env: source.to_string(),
        target_env: target.to_string(),
    };

    if source == target {
        return Err(cycle());
    }

    let mut stack = vec![target];
    let mut visited = Vec::new();
    while let Some(current) = stack.pop() {
        if current == source {
            return Err(cycle());
        }
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        stack.extend(
            existing
                .iter()
                .filter(|rule| rule.source_environment == current)
                .map(|rule| rule.target_environment),
        );
    }
    Ok(())
}
