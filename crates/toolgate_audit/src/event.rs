//! Audit event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of an audit event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    /// A request was denied by a policy check
    SecurityViolation,
    /// A request passed all policy checks
    ToolAuthorized,
    /// A tool finished executing (closing record with outcome and duration)
    ToolExecution,
    /// A new caller session was opened
    SessionCreated,
}

/// Severity of an audit event or violation.
///
/// Ordered so that severity floors can be expressed with comparisons:
///
/// ```
/// use toolgate_audit::Severity;
/// assert!(Severity::Critical > Severity::High);
/// assert!(Severity::Medium > Severity::Low);
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
pub enum Severity {
    /// Informational, routine activity
    Low,
    /// Worth attention during review
    Medium,
    /// Security-relevant, listed in compliance reports
    High,
    /// Immediate attention, listed in compliance reports
    Critical,
}

/// Terminal result of a request as seen by the audit trail.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    /// Tool executed and returned normally
    Success,
    /// Tool executed and failed
    Failure,
    /// Request never reached the tool
    Denied,
}

/// An immutable record of a security-relevant decision or outcome.
///
/// Field names in the serialized form are stable and camel-cased; they are
/// the export contract for compliance tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event id
    pub event_id: String,
    /// Event creation time (UTC, ISO-8601 in serialized form)
    pub timestamp: DateTime<Utc>,
    /// Session correlation key
    pub session_id: String,
    /// Caller id the event concerns
    pub identity: String,
    /// Event classification
    pub event_type: EventType,
    /// Event severity
    pub severity: Severity,
    /// Tool the request targeted, if any
    pub tool_name: Option<String>,
    /// Redacted digest of the request arguments; raw secrets never persist
    pub arguments_digest: Option<String>,
    /// Terminal result
    pub outcome: Outcome,
    /// Tool execution duration, present only on closing records
    pub duration_ms: Option<u64>,
    /// Free-form structured context
    pub additional_data: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// Create a new event stamped with the current time and a fresh id.
    pub fn new(
        event_type: EventType,
        severity: Severity,
        outcome: Outcome,
        identity: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            identity: identity.into(),
            event_type,
            severity,
            tool_name: None,
            arguments_digest: None,
            outcome,
            duration_ms: None,
            additional_data: BTreeMap::new(),
        }
    }

    /// Set the tool name.
    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Set the redacted arguments digest.
    pub fn with_arguments_digest(mut self, digest: impl Into<String>) -> Self {
        self.arguments_digest = Some(digest.into());
        self
    }

    /// Set the execution duration in milliseconds.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach a key/value pair of structured context.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.additional_data.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(EventType::SecurityViolation.as_ref(), "security_violation");
        assert_eq!(EventType::ToolAuthorized.as_ref(), "tool_authorized");
        assert_eq!(EventType::ToolExecution.as_ref(), "tool_execution");
    }

    #[test]
    fn test_serialized_field_names_are_stable() {
        let event = AuditEvent::new(
            EventType::ToolExecution,
            Severity::Low,
            Outcome::Success,
            "analyst1",
            "session-1",
        )
        .with_tool("processes")
        .with_duration_ms(42);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "tool_execution");
        assert_eq!(json["severity"], "low");
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["toolName"], "processes");
        assert_eq!(json["durationMs"], 42);
        assert!(json["timestamp"].is_string());
        assert_eq!(json["identity"], "analyst1");
        assert_eq!(json["sessionId"], "session-1");
    }

    #[test]
    fn test_roundtrip() {
        let event = AuditEvent::new(
            EventType::SecurityViolation,
            Severity::Critical,
            Outcome::Denied,
            "guest1",
            "session-2",
        )
        .with_data("violation", serde_json::json!("injection_suspected"));

        let json = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.event_type, EventType::SecurityViolation);
        assert_eq!(back.additional_data, event.additional_data);
    }
}
