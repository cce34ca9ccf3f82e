//! Role resolution and tool/resource authorization.

use crate::query::QueryBounds;
use crate::role::TableAccess;
use crate::{EffectiveGrants, Role, RolePolicy, Violation, ViolationKind};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use toolgate_audit::Severity;
use tracing::{debug, error, instrument};

/// Resolved permissions for one identity, for the administrative surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSummary {
    /// Identity summarized
    pub identity: String,
    /// Active role
    pub role: Role,
    /// Permitted tools, sorted
    pub tools: Vec<String>,
    /// Permitted tables, sorted
    pub tables: Vec<String>,
    /// Forbidden tables, sorted
    pub denied_tables: Vec<String>,
    /// Maximum free-form query length
    pub max_query_len: usize,
    /// Maximum query complexity score
    pub max_query_complexity: u32,
    /// Maximum result rows a query may request
    pub max_result_rows: u32,
    /// Allow-all override
    pub unrestricted: bool,
}

/// Role-based authorization engine.
///
/// Owns the identity-to-role map exclusively. Role assignment replaces the
/// mapping atomically: a concurrent `authorize` observes either the old or
/// the new role, never a torn state. Unknown identities and unknown tools
/// degrade to "not permitted", never to a panic.
pub struct AuthorizationEngine {
    policy: RwLock<RolePolicy>,
    assignments: RwLock<HashMap<String, Role>>,
}

impl AuthorizationEngine {
    /// Create an engine from a validated role policy.
    pub fn new(policy: RolePolicy) -> toolgate_error::ToolgateResult<Self> {
        policy.validate()?;
        Ok(Self {
            policy: RwLock::new(policy),
            assignments: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve the active role for an identity. Unmapped identities are
    /// guests; a poisoned map resolves to the least privilege rather than
    /// failing open.
    pub fn resolve_role(&self, identity: &str) -> Role {
        match self.assignments.read() {
            Ok(assignments) => assignments.get(identity).copied().unwrap_or(Role::Guest),
            Err(_) => {
                error!("Role assignment map poisoned, resolving to guest");
                Role::Guest
            }
        }
    }

    /// Assign a role to an identity, replacing any previous mapping.
    #[instrument(skip(self))]
    pub fn assign_role(&self, identity: &str, role: Role) {
        match self.assignments.write() {
            Ok(mut assignments) => {
                assignments.insert(identity.to_string(), role);
                debug!("Role assigned");
            }
            Err(_) => {
                // Resolution already degrades to guest on poisoning; the
                // assignment is dropped rather than risked half-applied.
                error!("Role assignment map poisoned, assignment dropped");
            }
        }
    }

    /// Check whether an identity may invoke a tool, optionally touching a
    /// named resource (a table parsed out of query text).
    ///
    /// Returns the violation to report, or `None` when permitted.
    #[instrument(skip(self), fields(identity, tool_name))]
    pub fn authorize(
        &self,
        identity: &str,
        tool_name: &str,
        resource: Option<&str>,
    ) -> Option<Violation> {
        let role = self.resolve_role(identity);
        // Unreadable policy denies everything rather than admitting anything.
        let Some(grants) = self.effective_grants(role) else {
            return Some(Violation::new(
                ViolationKind::UnauthorizedTool,
                Severity::High,
                "authorization policy unavailable, request denied",
            ));
        };

        if !grants.permits_tool(tool_name) {
            debug!(%role, "Tool not permitted");
            return Some(Violation::new(
                ViolationKind::UnauthorizedTool,
                Severity::Medium,
                format!("tool '{tool_name}' not permitted for role '{role}'"),
            ));
        }

        if let Some(table) = resource {
            match grants.table_access(table) {
                TableAccess::Permitted => {}
                TableAccess::Forbidden => {
                    debug!(%role, table, "Table forbidden");
                    return Some(Violation::new(
                        ViolationKind::UnauthorizedResource,
                        Severity::High,
                        format!("table '{table}' is forbidden for role '{role}'"),
                    ));
                }
                TableAccess::NotGranted => {
                    debug!(%role, table, "Table not granted");
                    return Some(Violation::new(
                        ViolationKind::UnauthorizedResource,
                        Severity::Medium,
                        format!("table '{table}' not allowed for role '{role}'"),
                    ));
                }
            }
        }

        None
    }

    /// Query-text bounds for an identity's role. Zero bounds (reject
    /// everything) when the policy is unreadable.
    pub fn query_bounds(&self, identity: &str) -> QueryBounds {
        let role = self.resolve_role(identity);
        self.effective_grants(role)
            .map_or_else(QueryBounds::deny_all, |grants| QueryBounds {
                max_len: grants.max_query_len,
                max_complexity: grants.max_query_complexity,
                max_result_rows: grants.max_result_rows,
            })
    }

    /// Administrative summary of an identity's resolved permissions.
    pub fn permissions_for(&self, identity: &str) -> Option<PermissionSummary> {
        let role = self.resolve_role(identity);
        let grants = self.effective_grants(role)?;

        let mut tools: Vec<String> = grants.tools.into_iter().collect();
        let mut tables: Vec<String> = grants.tables.into_iter().collect();
        let mut denied_tables: Vec<String> = grants.denied_tables.into_iter().collect();
        tools.sort();
        tables.sort();
        denied_tables.sort();

        Some(PermissionSummary {
            identity: identity.to_string(),
            role,
            tools,
            tables,
            denied_tables,
            max_query_len: grants.max_query_len,
            max_query_complexity: grants.max_query_complexity,
            max_result_rows: grants.max_result_rows,
            unrestricted: grants.unrestricted,
        })
    }

    /// Replace the role policy. Fails fast on invalid grants and leaves the
    /// previous policy in place.
    #[instrument(skip(self, policy))]
    pub fn replace_policy(&self, policy: RolePolicy) -> toolgate_error::ToolgateResult<()> {
        policy.validate()?;
        match self.policy.write() {
            Ok(mut current) => {
                *current = policy;
                Ok(())
            }
            Err(_) => Err(toolgate_error::ConfigError::new("role policy lock poisoned").into()),
        }
    }

    /// Effective grants for a role, or `None` when the policy is unreadable
    /// (callers treat that as "not permitted").
    fn effective_grants(&self, role: Role) -> Option<EffectiveGrants> {
        match self.policy.read() {
            Ok(policy) => Some(policy.effective(role)),
            Err(_) => {
                error!("Role policy lock poisoned, failing closed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new(RolePolicy::default()).unwrap()
    }

    #[test]
    fn test_unmapped_identity_is_guest() {
        let engine = engine();
        assert_eq!(engine.resolve_role("stranger"), Role::Guest);

        let violation = engine.authorize("stranger", "processes", None).unwrap();
        assert_eq!(violation.kind, ViolationKind::UnauthorizedTool);
    }

    #[test]
    fn test_guest_denied_every_nonguest_tool() {
        let engine = engine();
        for tool in ["processes", "users", "network_connections", "custom_query"] {
            assert!(engine.authorize("stranger", tool, None).is_some());
        }
        assert!(engine.authorize("stranger", "system_info", None).is_none());
    }

    #[test]
    fn test_assignment_changes_resolution() {
        let engine = engine();
        engine.assign_role("alice", Role::Analyst);
        assert_eq!(engine.resolve_role("alice"), Role::Analyst);
        assert!(engine.authorize("alice", "custom_query", None).is_none());

        engine.assign_role("alice", Role::Guest);
        assert!(engine.authorize("alice", "custom_query", None).is_some());
    }

    #[test]
    fn test_resource_denial() {
        let engine = engine();
        engine.assign_role("alice", Role::Analyst);

        assert!(engine
            .authorize("alice", "custom_query", Some("processes"))
            .is_none());
        let violation = engine
            .authorize("alice", "custom_query", Some("yara"))
            .unwrap();
        assert_eq!(violation.kind, ViolationKind::UnauthorizedResource);
        assert_eq!(violation.severity, Severity::High);
    }

    #[test]
    fn test_not_granted_table_is_medium_severity() {
        let engine = engine();
        engine.assign_role("alice", Role::Analyst);

        // `tpm_info` is neither granted nor on the deny list.
        let violation = engine
            .authorize("alice", "custom_query", Some("tpm_info"))
            .unwrap();
        assert_eq!(violation.kind, ViolationKind::UnauthorizedResource);
        assert_eq!(violation.severity, Severity::Medium);
    }

    #[test]
    fn test_poisoned_policy_fails_closed() {
        let engine = std::sync::Arc::new(engine());
        engine.assign_role("root", Role::Admin);

        let poisoner = engine.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.policy.write().unwrap();
            panic!("poison the policy lock");
        })
        .join();

        // Everyone is denied once the policy is unreadable, admins included.
        let violation = engine.authorize("stranger", "system_info", None).unwrap();
        assert_eq!(violation.severity, Severity::High);
        assert!(engine.authorize("root", "system_info", None).is_some());

        // Query bounds collapse to reject-everything.
        assert_eq!(engine.query_bounds("root").max_len, 0);
    }

    #[test]
    fn test_unknown_tool_degrades_to_denial() {
        let engine = engine();
        engine.assign_role("alice", Role::Analyst);
        assert!(engine.authorize("alice", "no_such_tool", None).is_some());
    }

    #[test]
    fn test_concurrent_reads_and_assignment() {
        let engine = std::sync::Arc::new(engine());
        engine.assign_role("bob", Role::User);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    // Either the old or the new role, never a torn state:
                    // both roles permit `users`, so this must always pass.
                    assert!(engine.authorize("bob", "users", None).is_none());
                }
            }));
        }
        for _ in 0..50 {
            engine.assign_role("bob", Role::Analyst);
            engine.assign_role("bob", Role::User);
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_invalid_replacement_keeps_old_policy() {
        let engine = engine();
        engine.assign_role("alice", Role::User);

        let mut bad = RolePolicy::default();
        bad.user.tables.insert("file".to_string()); // also denied at user level
        assert!(engine.replace_policy(bad).is_err());

        // Old policy still in force.
        assert!(engine.authorize("alice", "processes", None).is_none());
    }
}
