// SPDX-License-Identifier: MIT OR Apache-2.0

//! Role-based access control records.
//!
//! Roles group permissions and carry environment and tenant scoping. Users hold
//! roles and a set of accessible tenants. Sessions snapshot a user's roles at
//! creation time. Permissions may carry conditions drawn from a small closed
//! set of condition types and operators.

use crate::domain::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Wildcard matching any resource or action.
pub const WILDCARD: &str = "*";

/// Sentinel condition value meaning "a tenant the caller can access".
pub const OWN_TENANT: &str = "$own";

/// Which environments a role applies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "environments")]
pub enum EnvironmentScope {
    /// Every environment
    All,
    /// Only the listed environments
    Only(Vec<Environment>),
}

impl EnvironmentScope {
    /// Returns `true` if the scope covers `environment`.
    pub fn includes(&self, environment: Environment) -> bool {
        match self {
            EnvironmentScope::All => true,
            EnvironmentScope::Only(envs) => envs.contains(&environment),
        }
    }
}

/// How many tenants a role spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantScope {
    /// One tenant from the user's access set
    Single,
    /// Several tenants from the user's access set
    Multiple,
    /// Every tenant
    All,
}

/// What a condition inspects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "key")]
pub enum ConditionType {
    /// The requested environment label
    Environment,
    /// The requested tenant
    Tenant,
    /// The current UTC hour (0-23)
    Time,
    /// The caller's IP address
    Ip,
    /// A named request attribute
    Custom(String),
}

/// How a condition compares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Actual equals expected
    Equals,
    /// Actual differs from expected
    NotEquals,
    /// Actual is a member of the expected list
    In,
    /// Actual is not a member of the expected list
    NotIn,
    /// Actual is numerically greater than expected
    GreaterThan,
    /// Actual is numerically less than expected
    LessThan,
}

/// A condition attached to a permission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissionCondition {
    /// What is inspected
    pub condition: ConditionType,
    /// How it is compared
    pub operator: ConditionOperator,
    /// The expected value
    pub value: Value,
}

impl PermissionCondition {
    /// Creates a condition.
    pub fn new(condition: ConditionType, operator: ConditionOperator, value: Value) -> Self {
        Self {
            condition,
            operator,
            value,
        }
    }

    /// A condition requiring the request tenant to be one the caller can access.
    pub fn own_tenant() -> Self {
        Self::new(
            ConditionType::Tenant,
            ConditionOperator::Equals,
            Value::String(OWN_TENANT.to_string()),
        )
    }
}

/// Permission to perform `action` on `resource`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Resource name, or `*`
    pub resource: String,
    /// Action name, or `*`
    pub action: String,
    /// Conditions that must all hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PermissionCondition>,
    /// Restricts the permission to one environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
}

impl Permission {
    /// Creates an unconditional permission.
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            conditions: Vec::new(),
            environment: None,
        }
    }

    /// Adds a condition.
    pub fn with_condition(mut self, condition: PermissionCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Restricts the permission to `environment`.
    pub fn in_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Returns `true` if this permission covers `resource` and `action`.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }

    /// The `resource:action` label used in access results.
    pub fn label(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

/// A named group of permissions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Unique id
    pub id: String,
    /// Display name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Granted permissions
    pub permissions: Vec<Permission>,
    /// Environments the role applies to
    pub environment_scope: EnvironmentScope,
    /// Tenant breadth
    pub tenant_scope: TenantScope,
    /// System roles are immutable
    #[serde(default)]
    pub is_system: bool,
}

impl Role {
    /// Creates a custom role with no permissions.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            permissions: Vec::new(),
            environment_scope: EnvironmentScope::All,
            tenant_scope: TenantScope::All,
            is_system: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a permission.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Sets the environment scope.
    pub fn with_environment_scope(mut self, scope: EnvironmentScope) -> Self {
        self.environment_scope = scope;
        self
    }

    /// Sets the tenant scope.
    pub fn with_tenant_scope(mut self, scope: TenantScope) -> Self {
        self.tenant_scope = scope;
        self
    }

    pub(crate) fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}

/// Partial update for a custom role. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    /// New display name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// Replacement permission list
    pub permissions: Option<Vec<Permission>>,
    /// New environment scope
    pub environment_scope: Option<EnvironmentScope>,
    /// New tenant scope
    pub tenant_scope: Option<TenantScope>,
}

/// A local user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique id
    pub id: String,
    /// Assigned role ids
    pub roles: Vec<String>,
    /// Tenants the user may act on
    pub tenant_access: Vec<String>,
    /// Inactive users are denied everything
    pub is_active: bool,
}

impl User {
    /// Creates an active user with no roles.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            tenant_access: Vec::new(),
            is_active: true,
        }
    }

    /// Adds a role.
    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.roles.push(role_id.into());
        self
    }

    /// Adds an accessible tenant.
    pub fn with_tenant(mut self, tenant_hash: impl Into<String>) -> Self {
        self.tenant_access.push(tenant_hash.into());
        self
    }

    /// Returns `true` if the user may act on `tenant_hash`.
    pub fn can_access_tenant(&self, tenant_hash: &str) -> bool {
        self.tenant_access.iter().any(|t| t == tenant_hash)
    }
}

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Environment the session was opened in
    pub environment: Environment,
    /// Tenant the session was opened for
    pub tenant_hash: Option<String>,
    /// Role ids held when the session was created
    pub roles: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Last successful validation
    pub last_activity: DateTime<Utc>,
    /// Client IP address
    pub ip_address: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
}

impl Session {
    /// Returns `true` once `now` has reached the expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Options for [`create_session`](crate::service::AccessControlManager::create_session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Client IP address
    pub ip_address: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
    /// Lifetime in minutes
    pub expiration_minutes: i64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ip_address: None,
            user_agent: None,
            expiration_minutes: 480,
        }
    }
}

/// An authorization question.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessRequest {
    /// Who is asking
    pub user_id: String,
    /// What they want to touch
    pub resource: String,
    /// What they want to do
    pub action: String,
    /// Where
    pub environment: Environment,
    /// For which tenant
    pub tenant_hash: Option<String>,
    /// Caller IP address, for `ip` conditions
    pub ip_address: Option<String>,
    /// Extra attributes, for `custom` conditions
    pub attributes: HashMap<String, Value>,
}

impl AccessRequest {
    /// Creates a request without tenant, IP or attributes.
    pub fn new(
        user_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource: resource.into(),
            action: action.into(),
            environment,
            tenant_hash: None,
            ip_address: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the tenant.
    pub fn for_tenant(mut self, tenant_hash: impl Into<String>) -> Self {
        self.tenant_hash = Some(tenant_hash.into());
        self
    }

    /// Sets the caller IP.
    pub fn from_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    /// Adds a custom attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// The answer to an [`AccessRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResult {
    /// Whether access is granted
    pub granted: bool,
    /// Human-readable explanation
    pub reason: String,
    /// Roles that granted access
    pub matched_roles: Vec<String>,
    /// `resource:action` labels of permissions that matched the request
    pub required_permissions: Vec<String>,
    /// Matching permissions whose conditions or environment failed
    pub missing_permissions: Vec<String>,
    /// Non-fatal observations
    pub warnings: Vec<String>,
}

impl AccessResult {
    /// A denial with `reason`.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            reason: reason.into(),
            ..Self::default()
        }
    }
}

/// One recorded access decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Entry id
    pub id: String,
    /// Decision time
    pub timestamp: DateTime<Utc>,
    /// Requesting user
    pub user_id: String,
    /// Requested resource
    pub resource: String,
    /// Requested action
    pub action: String,
    /// Requested environment
    pub environment: Environment,
    /// Requested tenant
    pub tenant_hash: Option<String>,
    /// Outcome
    pub granted: bool,
    /// Outcome explanation
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permission_wildcards() {
        assert!(Permission::new("*", "*").matches("config", "write"));
        assert!(Permission::new("config", "*").matches("config", "delete"));
        assert!(!Permission::new("config", "read").matches("config", "write"));
        assert!(!Permission::new("users", "read").matches("config", "read"));
    }

    #[test]
    fn test_environment_scope() {
        let scope = EnvironmentScope::Only(vec![Environment::Development]);
        assert!(scope.includes(Environment::Development));
        assert!(!scope.includes(Environment::Production));
        assert!(EnvironmentScope::All.includes(Environment::Production));
    }

    #[test]
    fn test_session_expiry_boundary() {
        let now = Utc::now();
        let session = Session {
            id: "s".into(),
            user_id: "u".into(),
            environment: Environment::Staging,
            tenant_hash: None,
            roles: vec![],
            created_at: now,
            expires_at: now,
            last_activity: now,
            ip_address: None,
            user_agent: None,
        };
        assert!(session.is_expired(now));
    }

    #[test]
    fn test_condition_serde() {
        let condition = PermissionCondition::new(
            ConditionType::Custom("plan".into()),
            ConditionOperator::In,
            json!(["pro", "enterprise"]),
        );
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["condition"], json!({ "type": "custom", "key": "plan" }));
        assert_eq!(value["operator"], json!("in"));
    }

    #[test]
    fn test_user_tenant_access() {
        let user = User::new("u1").with_tenant("TenantAAA1");
        assert!(user.can_access_tenant("TenantAAA1"));
        assert!(!user.can_access_tenant("TenantBBB2"));
    }
}
