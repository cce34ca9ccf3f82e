//! Session correlation keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logical caller interaction, referenced by every audit event it produces.
///
/// Sessions are correlation keys only, never an authorization unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session id
    pub session_id: String,
    /// Caller the session belongs to
    pub identity: String,
    /// Session creation time
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with a fresh id for the given identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            identity: identity.into(),
            created_at: Utc::now(),
        }
    }
}

/// Aggregated view of one session's activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id summarized
    pub session_id: String,
    /// Caller the session belongs to
    pub identity: String,
    /// Session creation time
    pub created_at: DateTime<Utc>,
    /// Total events recorded for the session
    pub event_count: usize,
    /// Distinct tools referenced by the session's events
    pub tools_used: Vec<String>,
    /// Number of security violations recorded for the session
    pub violation_count: usize,
}
