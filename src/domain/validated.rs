// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validated configuration wrapper.
//!
//! A [`ValidatedConfiguration`] can only be constructed inside this crate, by
//! the configuration manager, after the payload has passed validation. Callers
//! receive it, read it and serialize it, but cannot fabricate one.

use crate::domain::{ConfigPath, Environment};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A configuration payload that has passed validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedConfiguration {
    schema_type: String,
    environment: Environment,
    validated_at: DateTime<Utc>,
    payload: Value,
}

impl ValidatedConfiguration {
    pub(crate) fn new(
        schema_type: impl Into<String>,
        environment: Environment,
        validated_at: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            schema_type: schema_type.into(),
            environment,
            validated_at,
            payload,
        }
    }

    /// The schema the payload was validated against.
    pub fn schema_type(&self) -> &str {
        &self.schema_type
    }

    /// The environment the payload belongs to.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// When validation happened.
    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    /// The validated document.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Looks up a dotted path in the payload.
    pub fn get(&self, path: &str) -> Option<&Value> {
        ConfigPath::from(path).lookup(&self.payload)
    }

    /// Consumes the wrapper, returning the payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }
}
