//! Compliance reporting over the audit trail.

use crate::AuditEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregated summary of audit events over a time range.
///
/// Used for periodic review, never for request-path decisions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    /// Inclusive start of the reporting range
    pub range_start: DateTime<Utc>,
    /// Inclusive end of the reporting range
    pub range_end: DateTime<Utc>,
    /// Total events in range
    pub total_events: usize,
    /// Event counts keyed by event type wire name
    pub totals_by_type: BTreeMap<String, u64>,
    /// Event counts keyed by severity wire name
    pub totals_by_severity: BTreeMap<String, u64>,
    /// All high and critical severity events in range, verbatim
    pub notable_events: Vec<AuditEvent>,
}

impl ComplianceReport {
    /// Build a report from events already filtered to the range, in
    /// chronological order.
    pub(crate) fn from_events(
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        events: Vec<AuditEvent>,
    ) -> Self {
        let mut totals_by_type = BTreeMap::new();
        let mut totals_by_severity = BTreeMap::new();
        let mut notable_events = Vec::new();

        for event in &events {
            *totals_by_type
                .entry(event.event_type.as_ref().to_string())
                .or_insert(0u64) += 1;
            *totals_by_severity
                .entry(event.severity.as_ref().to_string())
                .or_insert(0u64) += 1;
            if event.severity >= crate::Severity::High {
                notable_events.push(event.clone());
            }
        }

        Self {
            range_start,
            range_end,
            total_events: events.len(),
            totals_by_type,
            totals_by_severity,
            notable_events,
        }
    }
}
