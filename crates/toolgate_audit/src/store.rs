//! Append-only audit store with a query and report interface.

use crate::{
    AuditEvent, ComplianceReport, EventSink, EventType, Outcome, Session, SessionSummary, Severity,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, instrument, warn};

/// Filter for querying the audit trail.
///
/// All criteria are conjunctive; unset criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Inclusive lower bound on timestamp
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamp
    pub end: Option<DateTime<Utc>>,
    /// Exact identity match
    pub identity: Option<String>,
    /// Exact session match
    pub session_id: Option<String>,
    /// Exact event type match
    pub event_type: Option<EventType>,
    /// Minimum severity (inclusive)
    pub min_severity: Option<Severity>,
    /// Cap on the number of events returned, newest dropped first
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Restrict to a time range.
    pub fn in_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Restrict to one identity.
    pub fn for_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Restrict to one session.
    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restrict to one event type.
    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Restrict to events at or above a severity.
    pub fn at_least(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Cap the number of returned events.
    pub fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(start) = self.start
            && event.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end
            && event.timestamp > end
        {
            return false;
        }
        if let Some(identity) = &self.identity
            && &event.identity != identity
        {
            return false;
        }
        if let Some(session_id) = &self.session_id
            && &event.session_id != session_id
        {
            return false;
        }
        if let Some(event_type) = self.event_type
            && event.event_type != event_type
        {
            return false;
        }
        if let Some(min) = self.min_severity
            && event.severity < min
        {
            return false;
        }
        true
    }
}

/// Append-only structured event log.
///
/// The store is the exclusive owner of the event sequence. Appends are
/// serialized by a single lock, which also provides the chronological order
/// that `query` preserves. Sink failures and internal inconsistencies degrade
/// to a lost-event counter so the request path is never blocked.
pub struct AuditStore {
    events: Mutex<Vec<AuditEvent>>,
    sessions: Mutex<HashMap<String, Session>>,
    sinks: Vec<Box<dyn EventSink>>,
    lost_events: AtomicU64,
}

impl AuditStore {
    /// Create a store with no export sinks.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            sinks: Vec::new(),
            lost_events: AtomicU64::new(0),
        }
    }

    /// Attach an export sink. Sinks are best-effort; see [`EventSink`].
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Append an event.
    ///
    /// Never fails from the caller's perspective. If internal bookkeeping
    /// cannot record the event, the loss is counted and logged instead.
    #[instrument(skip(self, event), fields(event_type = event.event_type.as_ref()))]
    pub fn append(&self, event: AuditEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.write(&event) {
                self.lost_events.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Audit sink write failed, event counted as lost");
            }
        }

        match self.events.lock() {
            Ok(mut events) => {
                events.push(event);
                debug!(total = events.len(), "Audit event appended");
            }
            Err(_) => {
                self.lost_events.fetch_add(1, Ordering::Relaxed);
                error!("Audit event sequence lock poisoned, event lost");
            }
        }
    }

    /// Query the trail.
    ///
    /// Results are chronological (append order) and deterministic: the same
    /// filter with no intervening writes returns identical results.
    #[instrument(skip(self, filter))]
    pub fn query(&self, filter: &EventFilter) -> Vec<AuditEvent> {
        let Ok(events) = self.events.lock() else {
            error!("Audit event sequence lock poisoned, returning empty result");
            return Vec::new();
        };

        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Number of events lost to internal failures since construction.
    ///
    /// Operators watch this to detect silent data loss; the request path
    /// never sees those failures.
    pub fn lost_events(&self) -> u64 {
        self.lost_events.load(Ordering::Relaxed)
    }

    /// Open a new session for an identity, recording a `session_created`
    /// event.
    #[instrument(skip(self))]
    pub fn create_session(&self, identity: &str) -> Session {
        let session = Session::new(identity);

        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session.session_id.clone(), session.clone());
        } else {
            error!("Session map lock poisoned, session not tracked");
        }

        self.append(AuditEvent::new(
            EventType::SessionCreated,
            Severity::Low,
            Outcome::Success,
            identity,
            session.session_id.clone(),
        ));
        session
    }

    /// Summarize one session's recorded activity.
    pub fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        let session = {
            let sessions = self.sessions.lock().ok()?;
            sessions.get(session_id).cloned()?
        };

        let events = self.query(&EventFilter::default().for_session(session_id));
        let mut tools_used: Vec<String> = events
            .iter()
            .filter_map(|event| event.tool_name.clone())
            .collect();
        tools_used.sort();
        tools_used.dedup();

        let violation_count = events
            .iter()
            .filter(|event| event.event_type == EventType::SecurityViolation)
            .count();

        Some(SessionSummary {
            session_id: session.session_id,
            identity: session.identity,
            created_at: session.created_at,
            event_count: events.len(),
            tools_used,
            violation_count,
        })
    }

    /// Aggregate events in `[start, end]` into a compliance report.
    #[instrument(skip(self))]
    pub fn compliance_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ComplianceReport {
        let events = self.query(&EventFilter::default().in_range(start, end));
        ComplianceReport::from_events(start, end, events)
    }
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new()
    }
}
