//! Policy layer for the Toolgate security interception layer.
//!
//! This crate composes the leaf components into one per-request decision
//! pipeline, the only surface the external protocol layer calls:
//!
//! 1. **Authorization** - role-based tool and resource permissions
//! 2. **Rate limiting** - token bucket, sliding window, concurrency cap
//! 3. **Query validation** - injection screening of free-form query text
//!
//! Authorization runs first so unauthorized callers never consume rate
//! budget. The first violation wins and is recorded in the audit trail
//! before the decision returns. Denials are values, never errors: every
//! check returns a violation-or-none, and the dispatcher never panics for
//! an expected denial.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod authorizer;
mod config;
mod dispatcher;
mod query;
mod role;
mod violation;

pub use authorizer::{AuthorizationEngine, PermissionSummary};
pub use config::ToolgateConfig;
pub use dispatcher::{
    AdmissionTicket, Decision, PolicyDispatcher, ToolRequest, ToolRunError,
};
pub use query::{QueryBounds, QueryValidator};
pub use role::{EffectiveGrants, Role, RoleGrants, RolePolicy, TableAccess};
pub use violation::{Violation, ViolationKind};

// The severity scale is shared with the audit trail.
pub use toolgate_audit::Severity;
