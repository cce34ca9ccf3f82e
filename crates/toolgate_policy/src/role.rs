//! Roles and their permission grants.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use toolgate_error::{ConfigError, ToolgateResult};

/// Query-text length bound applied when no role in the chain sets one.
const DEFAULT_MAX_QUERY_LEN: usize = 2048;

/// Complexity score bound applied when no role in the chain sets one.
const DEFAULT_MAX_QUERY_COMPLEXITY: u32 = 50;

/// Result-row bound applied when no role in the chain sets one.
const DEFAULT_MAX_RESULT_ROWS: u32 = 500;

/// Caller privilege level.
///
/// Roles form a strict hierarchy: each role inherits every grant of the
/// roles below it, which the derived ordering expresses directly.
///
/// ```
/// use toolgate_policy::Role;
/// assert!(Role::Analyst > Role::User);
/// assert!(Role::Admin.inherits(Role::Guest));
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Unmapped or untrusted callers; the default
    Guest,
    /// Ordinary callers with read access to common tables
    User,
    /// Investigators with free-form query access
    Analyst,
    /// Unrestricted operators
    Admin,
}

impl Role {
    /// All roles in ascending privilege order.
    pub const ALL: [Role; 4] = [Role::Guest, Role::User, Role::Analyst, Role::Admin];

    /// Whether this role inherits the grants of `other`.
    pub fn inherits(self, other: Role) -> bool {
        self >= other
    }
}

/// Grants introduced at one level of the role hierarchy.
///
/// Tools and tables accumulate upward through inheritance; denied tables
/// apply only at the level that declares them, so a higher role can regain
/// access a lower role forbids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleGrants {
    /// Tool names granted at this level
    pub tools: HashSet<String>,
    /// Tables reachable from free-form query text at this level
    pub tables: HashSet<String>,
    /// Tables explicitly forbidden for this role (deny wins)
    pub denied_tables: HashSet<String>,
    /// Maximum free-form query length for this role
    pub max_query_len: Option<usize>,
    /// Maximum query complexity score for this role
    pub max_query_complexity: Option<u32>,
    /// Maximum result rows a query may request for this role
    pub max_result_rows: Option<u32>,
    /// When set, the role ignores allow lists entirely
    pub unrestricted: bool,
}

/// The full role table: one set of grants per role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolePolicy {
    /// Grants introduced at the guest level
    pub guest: RoleGrants,
    /// Grants introduced at the user level
    pub user: RoleGrants,
    /// Grants introduced at the analyst level
    pub analyst: RoleGrants,
    /// Grants introduced at the admin level
    pub admin: RoleGrants,
}

impl RolePolicy {
    /// Grants declared at exactly one level.
    pub fn grants(&self, role: Role) -> &RoleGrants {
        match role {
            Role::Guest => &self.guest,
            Role::User => &self.user,
            Role::Analyst => &self.analyst,
            Role::Admin => &self.admin,
        }
    }

    /// Mutable grants for one level.
    pub fn grants_mut(&mut self, role: Role) -> &mut RoleGrants {
        match role {
            Role::Guest => &mut self.guest,
            Role::User => &mut self.user,
            Role::Analyst => &mut self.analyst,
            Role::Admin => &mut self.admin,
        }
    }

    /// Resolve the effective grants for a role: the union of everything at
    /// or below it, with the role's own deny list applied.
    pub fn effective(&self, role: Role) -> EffectiveGrants {
        let mut tools = HashSet::new();
        let mut tables = HashSet::new();
        let mut max_query_len = None;
        let mut max_query_complexity = None;
        let mut max_result_rows = None;
        let mut unrestricted = false;

        for level in Role::ALL.into_iter().filter(|level| role.inherits(*level)) {
            let grants = self.grants(level);
            tools.extend(grants.tools.iter().cloned());
            tables.extend(grants.tables.iter().cloned());
            if let Some(len) = grants.max_query_len {
                max_query_len = Some(max_query_len.map_or(len, |current: usize| current.max(len)));
            }
            if let Some(score) = grants.max_query_complexity {
                max_query_complexity =
                    Some(max_query_complexity.map_or(score, |current: u32| current.max(score)));
            }
            if let Some(rows) = grants.max_result_rows {
                max_result_rows =
                    Some(max_result_rows.map_or(rows, |current: u32| current.max(rows)));
            }
            unrestricted |= grants.unrestricted;
        }

        EffectiveGrants {
            tools,
            tables,
            denied_tables: self.grants(role).denied_tables.clone(),
            max_query_len: max_query_len.unwrap_or(DEFAULT_MAX_QUERY_LEN),
            max_query_complexity: max_query_complexity.unwrap_or(DEFAULT_MAX_QUERY_COMPLEXITY),
            max_result_rows: max_result_rows.unwrap_or(DEFAULT_MAX_RESULT_ROWS),
            unrestricted,
        }
    }

    /// Reject role tables that cannot be enforced coherently.
    pub fn validate(&self) -> ToolgateResult<()> {
        for role in Role::ALL {
            let grants = self.grants(role);
            if let Some(0) = grants.max_query_len {
                return Err(ConfigError::new(format!(
                    "role '{role}' has a zero max query length"
                ))
                .into());
            }
            if let Some(0) = grants.max_query_complexity {
                return Err(ConfigError::new(format!(
                    "role '{role}' has a zero max query complexity"
                ))
                .into());
            }
            if let Some(0) = grants.max_result_rows {
                return Err(ConfigError::new(format!(
                    "role '{role}' has a zero max result row count"
                ))
                .into());
            }
            if let Some(table) = grants.tables.intersection(&grants.denied_tables).next() {
                return Err(ConfigError::new(format!(
                    "role '{role}' both grants and denies table '{table}'"
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl Default for RolePolicy {
    /// Default grants for a system-inventory deployment.
    fn default() -> Self {
        let to_set = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<HashSet<_>>();

        Self {
            guest: RoleGrants {
                tools: to_set(&["system_info"]),
                tables: to_set(&["system_info", "os_version", "uptime"]),
                denied_tables: HashSet::new(),
                max_query_len: Some(512),
                max_query_complexity: Some(10),
                max_result_rows: Some(50),
                unrestricted: false,
            },
            user: RoleGrants {
                tools: to_set(&["processes", "users", "network_interfaces"]),
                tables: to_set(&["processes", "users", "interface_details", "listening_ports"]),
                denied_tables: to_set(&["file", "hash", "yara"]),
                max_query_len: Some(2048),
                max_query_complexity: Some(50),
                max_result_rows: Some(500),
                unrestricted: false,
            },
            analyst: RoleGrants {
                tools: to_set(&["network_connections", "custom_query"]),
                tables: to_set(&["process_open_sockets", "file", "hash"]),
                denied_tables: to_set(&["yara", "kernel_modules"]),
                max_query_len: Some(4096),
                max_query_complexity: Some(200),
                max_result_rows: Some(2000),
                unrestricted: false,
            },
            admin: RoleGrants {
                tools: HashSet::new(),
                tables: HashSet::new(),
                denied_tables: HashSet::new(),
                max_query_len: Some(8192),
                max_query_complexity: Some(1000),
                max_result_rows: Some(10_000),
                unrestricted: true,
            },
        }
    }
}

/// How a role may touch one table.
///
/// Explicitly forbidden tables are a stronger signal than tables a role
/// merely never earned, and the two are reported at different severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAccess {
    /// The table is reachable for this role
    Permitted,
    /// The table is on the role's deny list
    Forbidden,
    /// The table is outside the role's allow list
    NotGranted,
}

/// Resolved permissions for one role, inheritance applied.
#[derive(Debug, Clone)]
pub struct EffectiveGrants {
    /// Permitted tool names
    pub tools: HashSet<String>,
    /// Permitted tables for free-form query text
    pub tables: HashSet<String>,
    /// Tables forbidden regardless of grants
    pub denied_tables: HashSet<String>,
    /// Maximum free-form query length
    pub max_query_len: usize,
    /// Maximum query complexity score
    pub max_query_complexity: u32,
    /// Maximum result rows a query may request
    pub max_result_rows: u32,
    /// Allow-all override (admin)
    pub unrestricted: bool,
}

impl EffectiveGrants {
    /// Whether a tool is permitted.
    pub fn permits_tool(&self, tool_name: &str) -> bool {
        self.unrestricted || self.tools.contains(tool_name)
    }

    /// Classify a table reference. The deny list wins even for unrestricted
    /// roles.
    pub fn table_access(&self, table: &str) -> TableAccess {
        if self.denied_tables.contains(table) {
            return TableAccess::Forbidden;
        }
        if self.unrestricted || self.tables.contains(table) {
            TableAccess::Permitted
        } else {
            TableAccess::NotGranted
        }
    }

    /// Whether a table reference is permitted.
    pub fn permits_table(&self, table: &str) -> bool {
        self.table_access(table) == TableAccess::Permitted
    }
}
