//! Audit plumbing error types.

/// Specific audit failure conditions.
///
/// These never reach callers of the request path: the audit store catches
/// them, counts the lost event, and degrades to its in-memory record.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum AuditErrorKind {
    /// A sink rejected an event write
    #[display("Sink write failed: {}", _0)]
    SinkWrite(String),

    /// An event could not be serialized for a sink
    #[display("Event serialization failed: {}", _0)]
    Serialization(String),
}

/// Audit error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Audit Error: {} at line {} in {}", kind, line, file)]
pub struct AuditError {
    /// The specific error kind
    pub kind: AuditErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl AuditError {
    /// Create a new audit error with location tracking.
    #[track_caller]
    pub fn new(kind: AuditErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &AuditErrorKind {
        &self.kind
    }
}
