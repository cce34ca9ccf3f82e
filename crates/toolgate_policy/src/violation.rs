//! Structured denial reasons.

use std::time::Duration;
use toolgate_audit::Severity;

/// Machine-readable classification of a denial.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViolationKind {
    /// The caller's role does not permit the requested tool
    UnauthorizedTool,
    /// The caller's role does not permit a referenced table or resource
    UnauthorizedResource,
    /// An admission-control budget was exhausted
    RateLimited,
    /// Query text matched an injection heuristic
    InjectionSuspected,
    /// Query exceeds the role's complexity or result-size bounds
    ExcessiveQuery,
    /// Request shape was invalid (for example, oversized query text)
    MalformedInput,
}

/// A structured reason why a request was denied.
///
/// Violations are immutable values, not errors: the dispatcher returns the
/// first one encountered and never throws for an expected denial.
#[derive(Debug, Clone, derive_more::Display)]
#[display("{} ({}): {}", kind, severity, message)]
pub struct Violation {
    /// Machine-readable kind
    pub kind: ViolationKind,
    /// Severity recorded in the audit trail
    pub severity: Severity,
    /// Human-readable explanation
    pub message: String,
    /// Deterministic back-off hint, present on rate-limit denials
    pub retry_after: Option<Duration>,
}

impl Violation {
    /// Create a new violation.
    pub fn new(kind: ViolationKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach a back-off hint for rate-limit denials.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}
