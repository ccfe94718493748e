// SPDX-License-Identifier: MIT OR Apache-2.0

//! The access control manager.
//!
//! Holds roles, users, sessions and the audit log, and answers
//! [`AccessRequest`]s. Authorization outcomes are always returned as an
//! [`AccessResult`]; only management calls fail with [`TrustError`].

use crate::adapters::SystemClock;
use crate::domain::{
    AccessRequest, AccessResult, AccessSettings, AuditEntry, Environment, EnvironmentScope,
    Permission, PermissionCondition, Result, Role, RoleUpdate, Session, SessionOptions,
    TenantScope, TrustError, User,
};
use crate::ports::Clock;
use crate::service::conditions::{all_hold, ConditionInput};
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

static TENANT_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{8,32}$").expect("valid regex"));

/// Ids of the roles every manager starts with.
pub const SYSTEM_ROLES: [&str; 7] = [
    "super-admin",
    "admin",
    "developer",
    "operator",
    "tenant-admin",
    "tenant-viewer",
    "auditor",
];

fn system_roles() -> Vec<Role> {
    use Environment::{Development, Production, Staging};

    vec![
        Role::new("super-admin", "Super Administrator")
            .with_description("Unrestricted access")
            .with_permission(Permission::new("*", "*")),
        Role::new("admin", "Administrator")
            .with_description("Manages configuration, users and roles everywhere")
            .with_permission(Permission::new("configuration", "*"))
            .with_permission(Permission::new("users", "*"))
            .with_permission(Permission::new("roles", "*"))
            .with_permission(Permission::new("audit", "read")),
        Role::new("developer", "Developer")
            .with_description("Edits configuration outside production")
            .with_environment_scope(EnvironmentScope::Only(vec![Development, Staging]))
            .with_tenant_scope(TenantScope::Multiple)
            .with_permission(Permission::new("configuration", "read"))
            .with_permission(Permission::new("configuration", "write"))
            .with_permission(Permission::new("configuration", "encrypt"))
            .with_permission(Permission::new("configuration", "decrypt")),
        Role::new("operator", "Operator")
            .with_description("Runs staging and production")
            .with_environment_scope(EnvironmentScope::Only(vec![Staging, Production]))
            .with_tenant_scope(TenantScope::Multiple)
            .with_permission(Permission::new("configuration", "read"))
            .with_permission(Permission::new("configuration", "write"))
            .with_permission(Permission::new("configuration", "encrypt"))
            .with_permission(Permission::new("configuration", "decrypt")),
        Role::new("tenant-admin", "Tenant Administrator")
            .with_description("Manages the configuration of the caller's own tenant")
            .with_tenant_scope(TenantScope::Single)
            .with_permission(
                Permission::new("configuration", "*").with_condition(PermissionCondition::own_tenant()),
            ),
        Role::new("tenant-viewer", "Tenant Viewer")
            .with_description("Reads one tenant's configuration")
            .with_tenant_scope(TenantScope::Single)
            .with_permission(Permission::new("configuration", "read")),
        Role::new("auditor", "Auditor")
            .with_description("Reads configuration and the audit log")
            .with_permission(Permission::new("audit", "read"))
            .with_permission(Permission::new("configuration", "read")),
    ]
    .into_iter()
    .map(Role::system)
    .collect()
}

fn check_tenant(tenant: &str) -> Result<()> {
    if TENANT_HASH.is_match(tenant) {
        Ok(())
    } else {
        Err(TrustError::InvalidTenant {
            tenant: tenant.to_string(),
        })
    }
}

fn check_role(role: &Role) -> Result<()> {
    let invalid = |message: &str| TrustError::InvalidRole {
        role_id: role.id.clone(),
        message: message.to_string(),
    };
    if role.id.trim().is_empty() {
        return Err(invalid("role id must not be empty"));
    }
    if role
        .permissions
        .iter()
        .any(|p| p.resource.trim().is_empty() || p.action.trim().is_empty())
    {
        return Err(invalid("permissions need a resource and an action"));
    }
    if let EnvironmentScope::Only(envs) = &role.environment_scope {
        if envs.is_empty() {
            return Err(invalid("environment scope must list at least one environment"));
        }
    }
    Ok(())
}

/// Roles, users, sessions and the audit trail.
///
/// # Examples
///
/// ```rust
/// use trustcfg::domain::{AccessRequest, Environment, User};
/// use trustcfg::service::AccessControlManager;
///
/// let acl = AccessControlManager::new();
/// acl.create_user(User::new("ana").with_role("tenant-admin").with_tenant("TenantAAA1"))
///     .unwrap();
///
/// let own = AccessRequest::new("ana", "configuration", "write", Environment::Production)
///     .for_tenant("TenantAAA1");
/// assert!(acl.check_access(&own).granted);
///
/// let other = AccessRequest::new("ana", "configuration", "write", Environment::Production)
///     .for_tenant("TenantBBB2");
/// assert!(!acl.check_access(&other).granted);
/// assert_eq!(acl.audit_log().len(), 2);
/// ```
pub struct AccessControlManager {
    settings: AccessSettings,
    clock: Arc<dyn Clock>,
    roles: RwLock<HashMap<String, Role>>,
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, Session>>,
    audit: Mutex<VecDeque<AuditEntry>>,
}

impl fmt::Debug for AccessControlManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessControlManager")
            .field("settings", &self.settings)
            .field("roles", &self.read_roles().len())
            .field("users", &self.read_users().len())
            .finish_non_exhaustive()
    }
}

impl Default for AccessControlManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessControlManager {
    /// Creates a manager with the system roles, default settings and the
    /// system clock.
    pub fn new() -> Self {
        Self::with_settings(AccessSettings::default(), Arc::new(SystemClock))
    }

    /// Creates a manager with explicit settings and clock.
    pub fn with_settings(settings: AccessSettings, clock: Arc<dyn Clock>) -> Self {
        let roles = system_roles()
            .into_iter()
            .map(|role| (role.id.clone(), role))
            .collect();
        Self {
            settings,
            clock,
            roles: RwLock::new(roles),
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            audit: Mutex::new(VecDeque::new()),
        }
    }

    fn read_roles(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Role>> {
        self.roles.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_users(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decides `request` and records the decision in the audit log.
    pub fn check_access(&self, request: &AccessRequest) -> AccessResult {
        let result = self.decide(request);
        self.record(request, &result);
        result
    }

    /// Decides `request` for the holder of `session_id`.
    ///
    /// The session's environment and tenant replace the request's, and the
    /// roles held when the session was created are used instead of the
    /// user's current roles.
    pub fn check_session_access(
        &self,
        session_id: &str,
        resource: &str,
        action: &str,
    ) -> AccessResult {
        let Some(session) = self.validate_session(session_id) else {
            return AccessResult::denied("Session expired or invalid");
        };
        let mut request =
            AccessRequest::new(&session.user_id, resource, action, session.environment);
        request.tenant_hash = session.tenant_hash.clone();
        request.ip_address = session.ip_address.clone();

        let result = match self.active_user(&session.user_id) {
            Ok(user) => self.evaluate(&user, &session.roles, &request),
            Err(denied) => denied,
        };
        self.record(&request, &result);
        result
    }

    fn active_user(&self, user_id: &str) -> std::result::Result<User, AccessResult> {
        match self.get_user(user_id) {
            None => Err(AccessResult::denied(format!("User not found: {}", user_id))),
            Some(user) if !user.is_active => Err(AccessResult::denied("User account is inactive")),
            Some(user) => Ok(user),
        }
    }

    fn decide(&self, request: &AccessRequest) -> AccessResult {
        let user = match self.active_user(&request.user_id) {
            Ok(user) => user,
            Err(denied) => return denied,
        };

        if self.session_expired(&user.id, request.environment) {
            return AccessResult::denied("Session expired");
        }

        self.evaluate(&user, &user.roles, request)
    }

    /// `true` when the user's sessions for `environment` have all expired.
    fn session_expired(&self, user_id: &str, environment: Environment) -> bool {
        let now = self.clock.now();
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut relevant = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.environment == environment)
            .peekable();
        relevant.peek().is_some() && relevant.all(|s| s.is_expired(now))
    }

    fn evaluate(&self, user: &User, role_ids: &[String], request: &AccessRequest) -> AccessResult {
        let roles = self.read_roles();
        let input = ConditionInput {
            request,
            user,
            now: self.clock.now(),
        };
        let mut result = AccessResult::default();

        for role_id in role_ids {
            let Some(role) = roles.get(role_id) else {
                result.warnings.push(format!("Unknown role: {}", role_id));
                continue;
            };
            if !role.environment_scope.includes(request.environment) {
                continue;
            }
            if let Some(tenant) = request.tenant_hash.as_deref() {
                if role.tenant_scope != TenantScope::All && !user.can_access_tenant(tenant) {
                    result.warnings.push(format!(
                        "Role {} does not cover tenant {}",
                        role.id, tenant
                    ));
                    continue;
                }
            }

            let mut satisfied = false;
            for permission in role
                .permissions
                .iter()
                .filter(|p| p.matches(&request.resource, &request.action))
            {
                let label = permission.label();
                if !result.required_permissions.contains(&label) {
                    result.required_permissions.push(label.clone());
                }
                let env_conflict = permission
                    .environment
                    .map(|env| env != request.environment)
                    .unwrap_or(false);
                if env_conflict || !all_hold(&permission.conditions, &input) {
                    if !result.missing_permissions.contains(&label) {
                        result.missing_permissions.push(label);
                    }
                    continue;
                }
                satisfied = true;
            }
            if satisfied {
                result.matched_roles.push(role.id.clone());
            }
        }

        result.granted = !result.matched_roles.is_empty();
        result.reason = if result.granted {
            format!("Granted by role(s): {}", result.matched_roles.join(", "))
        } else if result.required_permissions.is_empty() {
            format!(
                "No role grants {}:{} in {}",
                request.resource, request.action, request.environment
            )
        } else {
            format!(
                "Permission conditions not satisfied: {}",
                result.missing_permissions.join(", ")
            )
        };
        result
    }

    fn record(&self, request: &AccessRequest, result: &AccessResult) {
        if result.granted {
            tracing::debug!(
                user_id = %request.user_id,
                resource = %request.resource,
                action = %request.action,
                environment = %request.environment,
                "access granted"
            );
        } else {
            tracing::info!(
                user_id = %request.user_id,
                resource = %request.resource,
                action = %request.action,
                environment = %request.environment,
                reason = %result.reason,
                "access denied"
            );
        }

        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: self.clock.now(),
            user_id: request.user_id.clone(),
            resource: request.resource.clone(),
            action: request.action.clone(),
            environment: request.environment,
            tenant_hash: request.tenant_hash.clone(),
            granted: result.granted,
            reason: result.reason.clone(),
        };
        let mut audit = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        audit.push_back(entry);
        while audit.len() > self.settings.max_audit_entries {
            audit.pop_front();
        }
    }

    /// Registers a custom role.
    pub fn create_role(&self, role: Role) -> Result<Role> {
        check_role(&role)?;
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        if roles.contains_key(&role.id) {
            tracing::warn!(role_id = %role.id, "rejected duplicate role");
            return Err(TrustError::DuplicateRole { role_id: role.id });
        }
        let role = Role {
            is_system: false,
            ..role
        };
        tracing::info!(role_id = %role.id, "created role");
        roles.insert(role.id.clone(), role.clone());
        Ok(role)
    }

    /// Applies `update` to a custom role.
    pub fn update_role(&self, role_id: &str, update: RoleUpdate) -> Result<Role> {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        let existing = roles.get(role_id).ok_or_else(|| TrustError::RoleNotFound {
            role_id: role_id.to_string(),
        })?;
        if existing.is_system {
            tracing::warn!(role_id, "rejected update of system role");
            return Err(TrustError::SystemRoleImmutable {
                role_id: role_id.to_string(),
            });
        }

        let mut updated = existing.clone();
        if let Some(name) = update.name {
            updated.name = name;
        }
        if let Some(description) = update.description {
            updated.description = description;
        }
        if let Some(permissions) = update.permissions {
            updated.permissions = permissions;
        }
        if let Some(scope) = update.environment_scope {
            updated.environment_scope = scope;
        }
        if let Some(scope) = update.tenant_scope {
            updated.tenant_scope = scope;
        }
        check_role(&updated)?;

        tracing::info!(role_id, "updated role");
        roles.insert(role_id.to_string(), updated.clone());
        Ok(updated)
    }

    /// Deletes a custom role that no user holds.
    pub fn delete_role(&self, role_id: &str) -> Result<()> {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        let role = roles.get(role_id).ok_or_else(|| TrustError::RoleNotFound {
            role_id: role_id.to_string(),
        })?;
        if role.is_system {
            tracing::warn!(role_id, "rejected deletion of system role");
            return Err(TrustError::SystemRoleImmutable {
                role_id: role_id.to_string(),
            });
        }
        let user_count = self
            .read_users()
            .values()
            .filter(|u| u.roles.iter().any(|r| r == role_id))
            .count();
        if user_count > 0 {
            tracing::warn!(role_id, user_count, "rejected deletion of assigned role");
            return Err(TrustError::RoleInUse {
                role_id: role_id.to_string(),
                user_count,
            });
        }
        roles.remove(role_id);
        tracing::info!(role_id, "deleted role");
        Ok(())
    }

    /// Looks up a role.
    pub fn get_role(&self, role_id: &str) -> Option<Role> {
        self.read_roles().get(role_id).cloned()
    }

    /// All roles sorted by id.
    pub fn list_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.read_roles().values().cloned().collect();
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        roles
    }

    /// Registers a user. Every role must exist and every tenant must be a
    /// well-formed identifier.
    pub fn create_user(&self, user: User) -> Result<User> {
        for tenant in &user.tenant_access {
            check_tenant(tenant)?;
        }

        // Held until the user is stored so no role vanishes in between.
        let roles = self.read_roles();
        if let Some(missing) = user.roles.iter().find(|r| !roles.contains_key(*r)) {
            return Err(TrustError::RoleNotFound {
                role_id: missing.clone(),
            });
        }
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(&user.id) {
            return Err(TrustError::DuplicateUser { user_id: user.id });
        }
        tracing::info!(user_id = %user.id, roles = user.roles.len(), "created user");
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    /// Looks up a user.
    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.read_users().get(user_id).cloned()
    }

    fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&mut User) -> T) -> Result<T> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_mut(user_id).ok_or_else(|| TrustError::UserNotFound {
            user_id: user_id.to_string(),
        })?;
        Ok(f(user))
    }

    /// Gives `role_id` to a user. Assigning a held role is a no-op.
    pub fn assign_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        // Roles before users, as in `delete_role`.
        let roles = self.read_roles();
        if !roles.contains_key(role_id) {
            return Err(TrustError::RoleNotFound {
                role_id: role_id.to_string(),
            });
        }
        self.with_user(user_id, |user| {
            if !user.roles.iter().any(|r| r == role_id) {
                user.roles.push(role_id.to_string());
            }
        })?;
        drop(roles);
        tracing::info!(user_id, role_id, "assigned role");
        Ok(())
    }

    /// Removes `role_id` from a user. Returns whether the user held it.
    pub fn revoke_role(&self, user_id: &str, role_id: &str) -> Result<bool> {
        let removed = self.with_user(user_id, |user| {
            let before = user.roles.len();
            user.roles.retain(|r| r != role_id);
            user.roles.len() != before
        })?;
        if removed {
            tracing::info!(user_id, role_id, "revoked role");
        }
        Ok(removed)
    }

    /// Adds a tenant to a user's access set.
    pub fn grant_tenant_access(&self, user_id: &str, tenant_hash: &str) -> Result<()> {
        check_tenant(tenant_hash)?;
        self.with_user(user_id, |user| {
            if !user.can_access_tenant(tenant_hash) {
                user.tenant_access.push(tenant_hash.to_string());
            }
        })
    }

    /// Activates or deactivates a user.
    pub fn set_user_active(&self, user_id: &str, active: bool) -> Result<()> {
        self.with_user(user_id, |user| user.is_active = active)?;
        tracing::info!(user_id, active, "changed user status");
        Ok(())
    }

    /// Opens a session for an active user.
    ///
    /// The user's current roles are copied into the session; later role
    /// changes do not affect it. A non-positive expiration falls back to the
    /// configured session length; one too large to represent is an
    /// [`TrustError::InvalidSession`].
    pub fn create_session(
        &self,
        user_id: &str,
        environment: Environment,
        tenant_hash: Option<&str>,
        options: SessionOptions,
    ) -> Result<Session> {
        let user = self.get_user(user_id).ok_or_else(|| TrustError::UserNotFound {
            user_id: user_id.to_string(),
        })?;
        if !user.is_active {
            return Err(TrustError::InactiveUser {
                user_id: user_id.to_string(),
            });
        }
        if let Some(tenant) = tenant_hash {
            check_tenant(tenant)?;
            if !user.can_access_tenant(tenant) {
                return Err(TrustError::AccessDenied {
                    reason: format!("User {} cannot access tenant {}", user_id, tenant),
                });
            }
        }

        let minutes = if options.expiration_minutes > 0 {
            options.expiration_minutes
        } else {
            self.settings.session_minutes
        };
        let now = self.clock.now();
        let expires_at = Duration::try_minutes(minutes)
            .and_then(|length| now.checked_add_signed(length))
            .ok_or_else(|| TrustError::InvalidSession {
                message: format!("Expiration of {} minutes is out of range", minutes),
            })?;
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            environment,
            tenant_hash: tenant_hash.map(str::to_string),
            roles: user.roles.clone(),
            created_at: now,
            expires_at,
            last_activity: now,
            ip_address: options.ip_address,
            user_agent: options.user_agent,
        };
        tracing::info!(user_id, environment = %environment, minutes, "created session");
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Returns the live session, refreshing its activity time. Expired
    /// sessions are removed and yield `None`.
    pub fn validate_session(&self, session_id: &str) -> Option<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(session_id)?;
        if session.is_expired(now) {
            sessions.remove(session_id);
            tracing::debug!(session_id, "purged expired session");
            return None;
        }
        session.last_activity = now;
        Some(session.clone())
    }

    /// Ends a session. Returns whether it existed.
    pub fn invalidate_session(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();
        if removed {
            tracing::info!(session_id, "invalidated session");
        }
        removed
    }

    /// Removes every expired session. Returns how many were removed.
    pub fn purge_expired_sessions(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }

    /// The audit log, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Audit entries for `user_id`, oldest first.
    pub fn audit_log_for_user(&self, user_id: &str) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ManualClock;
    use crate::domain::{ConditionOperator, ConditionType};
    use serde_json::json;

    use Environment::{Development, Production, Staging};

    fn request(user: &str, action: &str, env: Environment) -> AccessRequest {
        AccessRequest::new(user, "configuration", action, env)
    }

    #[test]
    fn test_system_roles_present() {
        let acl = AccessControlManager::new();
        let ids: Vec<String> = acl.list_roles().into_iter().map(|r| r.id).collect();
        for id in SYSTEM_ROLES {
            assert!(ids.iter().any(|r| r == id), "{}", id);
        }
        assert!(acl.list_roles().iter().all(|r| r.is_system));
    }

    #[test]
    fn test_unknown_and_inactive_users() {
        let acl = AccessControlManager::new();
        let result = acl.check_access(&request("ghost", "read", Staging));
        assert!(!result.granted);
        assert!(result.reason.contains("User not found"));

        acl.create_user(User::new("bob").with_role("auditor")).unwrap();
        assert!(acl.check_access(&request("bob", "read", Staging)).granted);
        acl.set_user_active("bob", false).unwrap();
        let result = acl.check_access(&request("bob", "read", Staging));
        assert_eq!(result.reason, "User account is inactive");
        assert_eq!(acl.audit_log_for_user("bob").len(), 2);
    }

    #[test]
    fn test_environment_scoped_role() {
        let acl = AccessControlManager::new();
        acl.create_user(User::new("dev").with_role("developer")).unwrap();
        assert!(acl.check_access(&request("dev", "write", Development)).granted);
        let prod = acl.check_access(&request("dev", "write", Production));
        assert!(!prod.granted);
        assert!(prod.required_permissions.is_empty());
    }

    #[test]
    fn test_tenant_scoped_role_skips_foreign_tenant() {
        let acl = AccessControlManager::new();
        acl.create_user(User::new("viewer").with_role("tenant-viewer").with_tenant("TenantAAA1"))
            .unwrap();
        let own = acl.check_access(&request("viewer", "read", Staging).for_tenant("TenantAAA1"));
        assert!(own.granted);
        let other = acl.check_access(&request("viewer", "read", Staging).for_tenant("TenantBBB2"));
        assert!(!other.granted);
        assert_eq!(other.warnings.len(), 1);
    }

    #[test]
    fn test_conditions_and_permission_environment_record_missing() {
        let acl = AccessControlManager::new();
        acl.create_role(
            Role::new("night-shift", "Night shift")
                .with_permission(Permission::new("configuration", "write").in_environment(Staging))
                .with_permission(
                    Permission::new("configuration", "read").with_condition(PermissionCondition::new(
                        ConditionType::Custom("shift".into()),
                        ConditionOperator::Equals,
                        json!("night"),
                    )),
                ),
        )
        .unwrap();
        acl.create_user(User::new("nora").with_role("night-shift")).unwrap();

        let write = acl.check_access(&request("nora", "write", Production));
        assert!(!write.granted);
        assert_eq!(write.missing_permissions, vec!["configuration:write"]);

        let read = acl.check_access(&request("nora", "read", Production));
        assert!(!read.granted);
        assert_eq!(read.required_permissions, vec!["configuration:read"]);

        let night = acl.check_access(
            &request("nora", "read", Production).with_attribute("shift", json!("night")),
        );
        assert!(night.granted);
        assert_eq!(night.matched_roles, vec!["night-shift"]);
    }

    #[test]
    fn test_system_roles_are_immutable() {
        let acl = AccessControlManager::new();
        assert!(matches!(
            acl.delete_role("admin"),
            Err(TrustError::SystemRoleImmutable { .. })
        ));
        assert!(matches!(
            acl.update_role("admin", RoleUpdate::default()),
            Err(TrustError::SystemRoleImmutable { .. })
        ));
        assert!(matches!(
            acl.create_role(Role::new("admin", "Impostor")),
            Err(TrustError::DuplicateRole { .. })
        ));
    }

    #[test]
    fn test_role_in_use_reports_count() {
        let acl = AccessControlManager::new();
        acl.create_role(Role::new("editor", "Editor").with_permission(Permission::new("configuration", "write")))
            .unwrap();
        acl.create_user(User::new("a").with_role("editor")).unwrap();
        acl.create_user(User::new("b").with_role("editor")).unwrap();
        match acl.delete_role("editor") {
            Err(TrustError::RoleInUse { user_count, .. }) => assert_eq!(user_count, 2),
            other => panic!("unexpected {:?}", other),
        }
        acl.revoke_role("a", "editor").unwrap();
        acl.revoke_role("b", "editor").unwrap();
        acl.delete_role("editor").unwrap();
        assert!(acl.get_role("editor").is_none());
    }

    #[test]
    fn test_update_role() {
        let acl = AccessControlManager::new();
        acl.create_role(Role::new("editor", "Editor")).unwrap();
        let updated = acl
            .update_role(
                "editor",
                RoleUpdate {
                    permissions: Some(vec![Permission::new("configuration", "write")]),
                    tenant_scope: Some(TenantScope::Multiple),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.permissions.len(), 1);
        assert_eq!(updated.name, "Editor");
        assert!(matches!(
            acl.update_role("missing", RoleUpdate::default()),
            Err(TrustError::RoleNotFound { .. })
        ));
    }

    #[test]
    fn test_user_management_errors() {
        let acl = AccessControlManager::new();
        assert!(matches!(
            acl.create_user(User::new("x").with_role("nope")),
            Err(TrustError::RoleNotFound { .. })
        ));
        assert!(matches!(
            acl.create_user(User::new("x").with_tenant("../etc")),
            Err(TrustError::InvalidTenant { .. })
        ));
        acl.create_user(User::new("x")).unwrap();
        assert!(matches!(
            acl.create_user(User::new("x")),
            Err(TrustError::DuplicateUser { .. })
        ));
        assert!(matches!(
            acl.assign_role("ghost", "admin"),
            Err(TrustError::UserNotFound { .. })
        ));
        acl.assign_role("x", "auditor").unwrap();
        acl.assign_role("x", "auditor").unwrap();
        assert_eq!(acl.get_user("x").unwrap().roles, vec!["auditor"]);
        assert!(!acl.revoke_role("x", "admin").unwrap());
    }

    #[test]
    fn test_session_lifecycle() {
        let clock = Arc::new(ManualClock::starting_now());
        let acl = AccessControlManager::with_settings(AccessSettings::default(), clock.clone());
        acl.create_user(User::new("ops").with_role("operator")).unwrap();

        let session = acl
            .create_session(
                "ops",
                Production,
                None,
                SessionOptions {
                    expiration_minutes: 30,
                    ..SessionOptions::default()
                },
            )
            .unwrap();
        clock.advance(Duration::minutes(10));
        let refreshed = acl.validate_session(&session.id).unwrap();
        assert!(refreshed.last_activity > session.last_activity);
        assert!(acl.check_access(&request("ops", "read", Production)).granted);

        clock.advance(Duration::minutes(30));
        let result = acl.check_access(&request("ops", "read", Production));
        assert_eq!(result.reason, "Session expired");
        // other environments are unaffected
        assert!(acl.check_access(&request("ops", "read", Staging)).granted);

        assert!(acl.validate_session(&session.id).is_none());
        assert!(acl.check_access(&request("ops", "read", Production)).granted);
    }

    #[test]
    fn test_session_expiration_out_of_range() {
        let acl = AccessControlManager::new();
        acl.create_user(User::new("u")).unwrap();
        let result = acl.create_session(
            "u",
            Staging,
            None,
            SessionOptions {
                expiration_minutes: 1_000_000_000_000,
                ..SessionOptions::default()
            },
        );
        assert!(matches!(result, Err(TrustError::InvalidSession { .. })));
        assert!(matches!(
            acl.create_session(
                "u",
                Staging,
                None,
                SessionOptions {
                    expiration_minutes: i64::MAX,
                    ..SessionOptions::default()
                },
            ),
            Err(TrustError::InvalidSession { .. })
        ));
        assert_eq!(acl.purge_expired_sessions(), 0);
    }

    #[test]
    fn test_assign_role_races_with_delete_role() {
        let acl = Arc::new(AccessControlManager::new());
        acl.create_user(User::new("u")).unwrap();

        for round in 0..50 {
            let role_id = format!("temp-{}", round);
            acl.create_role(Role::new(&role_id, "Temp")).unwrap();

            let assigner = {
                let acl = Arc::clone(&acl);
                let role_id = role_id.clone();
                std::thread::spawn(move || acl.assign_role("u", &role_id).is_ok())
            };
            let deleted = acl.delete_role(&role_id).is_ok();
            let assigned = assigner.join().unwrap();

            let held = acl.get_user("u").unwrap().roles.contains(&role_id);
            // A held role always exists, whichever call won.
            assert_eq!(held, acl.get_role(&role_id).is_some());
            assert!(!(deleted && held));
            if held {
                assert!(assigned);
                acl.revoke_role("u", &role_id).unwrap();
            }
            let _ = acl.delete_role(&role_id);
        }
    }

    #[test]
    fn test_session_snapshot_and_logout() {
        let acl = AccessControlManager::new();
        acl.create_user(User::new("dana").with_role("developer")).unwrap();
        let session = acl
            .create_session("dana", Staging, None, SessionOptions::default())
            .unwrap();
        acl.revoke_role("dana", "developer").unwrap();

        assert!(acl.check_session_access(&session.id, "configuration", "write").granted);
        assert!(!acl.check_access(&request("dana", "write", Staging)).granted);

        assert!(acl.invalidate_session(&session.id));
        assert!(!acl.invalidate_session(&session.id));
        assert!(!acl.check_session_access(&session.id, "configuration", "write").granted);
    }

    #[test]
    fn test_session_requires_tenant_access() {
        let acl = AccessControlManager::new();
        acl.create_user(User::new("t").with_role("tenant-admin").with_tenant("TenantAAA1"))
            .unwrap();
        assert!(acl
            .create_session("t", Staging, Some("TenantAAA1"), SessionOptions::default())
            .is_ok());
        assert!(matches!(
            acl.create_session("t", Staging, Some("TenantBBB2"), SessionOptions::default()),
            Err(TrustError::AccessDenied { .. })
        ));
        acl.set_user_active("t", false).unwrap();
        assert!(matches!(
            acl.create_session("t", Staging, None, SessionOptions::default()),
            Err(TrustError::InactiveUser { .. })
        ));
    }

    #[test]
    fn test_purge_expired_sessions() {
        let clock = Arc::new(ManualClock::starting_now());
        let acl = AccessControlManager::with_settings(AccessSettings::default(), clock.clone());
        acl.create_user(User::new("u")).unwrap();
        let short = SessionOptions {
            expiration_minutes: 5,
            ..SessionOptions::default()
        };
        acl.create_session("u", Staging, None, short.clone()).unwrap();
        acl.create_session("u", Production, None, short).unwrap();
        acl.create_session("u", Development, None, SessionOptions::default())
            .unwrap();
        clock.advance(Duration::minutes(6));
        assert_eq!(acl.purge_expired_sessions(), 2);
        assert_eq!(acl.purge_expired_sessions(), 0);
    }

    #[test]
    fn test_audit_log_is_capped() {
        let acl = AccessControlManager::with_settings(
            AccessSettings::default().with_max_audit_entries(3),
            Arc::new(SystemClock),
        );
        for i in 0..5 {
            acl.check_access(&request(&format!("user-{}", i), "read", Staging));
        }
        let log = acl.audit_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].user_id, "user-2");
        assert!(log.iter().all(|e| !e.granted));
    }
}
