// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dotted configuration paths.
//!
//! This module provides the `ConfigPath` type, a newtype over `String` naming a
//! location inside a JSON configuration document using dot notation
//! (`security.allowInsecure`). Inheritance rules, validation messages and
//! migration field mappings all address documents through it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A dotted path into a configuration document.
///
/// # Examples
///
/// ```
/// use trustcfg::domain::ConfigPath;
/// use serde_json::json;
///
/// let path = ConfigPath::from("logging.level");
/// let doc = json!({ "logging": { "level": "debug" } });
///
/// assert_eq!(path.lookup(&doc), Some(&json!("debug")));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigPath(String);

impl ConfigPath {
    /// Creates a new `ConfigPath` from a `String`.
    pub fn new(path: String) -> Self {
        ConfigPath(path)
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts the `ConfigPath` into its inner `String`.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Iterates over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Returns `true` when the path is empty or contains an empty segment.
    pub fn is_malformed(&self) -> bool {
        self.0.is_empty() || self.segments().any(str::is_empty)
    }

    /// Returns a child path with `segment` appended.
    ///
    /// # Examples
    ///
    /// ```
    /// use trustcfg::domain::ConfigPath;
    ///
    /// assert_eq!(ConfigPath::from("api").child("timeout").as_str(), "api.timeout");
    /// assert_eq!(ConfigPath::from("").child("api").as_str(), "api");
    /// ```
    pub fn child(&self, segment: &str) -> ConfigPath {
        if self.0.is_empty() {
            ConfigPath(segment.to_string())
        } else {
            ConfigPath(format!("{}.{}", self.0, segment))
        }
    }

    /// Looks up the value at this path.
    pub fn lookup<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        if self.is_malformed() {
            return None;
        }
        self.segments()
            .try_fold(document, |current, segment| current.as_object()?.get(segment))
    }

    /// Stores `value` at this path, creating intermediate objects as needed.
    ///
    /// Intermediate non-object values are replaced by objects. Returns `false`
    /// if the path is malformed or the document root is not an object.
    pub fn assign(&self, document: &mut Value, value: Value) -> bool {
        if self.is_malformed() || !document.is_object() {
            return false;
        }
        let segments: Vec<&str> = self.segments().collect();
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return false,
        };

        let mut current = document;
        for segment in parents {
            let map = match current.as_object_mut() {
                Some(map) => map,
                None => return false,
            };
            let entry = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry;
        }

        match current.as_object_mut() {
            Some(map) => {
                map.insert(last.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the value at this path.
    pub fn remove(&self, document: &mut Value) -> Option<Value> {
        if self.is_malformed() {
            return None;
        }
        let segments: Vec<&str> = self.segments().collect();
        let (last, parents) = segments.split_last()?;
        let mut current = document;
        for segment in parents {
            current = current.as_object_mut()?.get_mut(*segment)?;
        }
        current.as_object_mut()?.remove(*last)
    }
}

impl From<String> for ConfigPath {
    fn from(s: String) -> Self {
        ConfigPath(s)
    }
}

impl From<&str> for ConfigPath {
    fn from(s: &str) -> Self {
        ConfigPath(s.to_string())
    }
}

impl From<ConfigPath> for String {
    fn from(path: ConfigPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ConfigPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
