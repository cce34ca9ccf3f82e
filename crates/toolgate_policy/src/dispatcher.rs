//! The per-request decision pipeline.

use crate::{
    AuthorizationEngine, PermissionSummary, QueryValidator, Role, ToolgateConfig, Violation,
    ViolationKind,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use toolgate_audit::{
    AuditEvent, AuditStore, EventType, Outcome, Severity, digest_arguments,
};
use toolgate_limit::{ConcurrencyGuard, LimitConfig, RateDecision, RateLimiter, RateStatus};
use toolgate_error::ToolgateResult;
use tracing::{debug, info, instrument, warn};

/// One tool invocation as presented to the policy layer.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    /// Caller identity
    pub identity: String,
    /// Requested tool
    pub tool_name: String,
    /// Tool arguments; digested (never stored raw) in the audit trail
    pub arguments: HashMap<String, serde_json::Value>,
    /// Session correlation key
    pub session_id: String,
}

impl ToolRequest {
    /// Create a request with no arguments.
    pub fn new(
        identity: impl Into<String>,
        tool_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            tool_name: tool_name.into(),
            arguments: HashMap::new(),
            session_id: session_id.into(),
        }
    }

    /// Attach one argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

/// Proof that a request passed every check.
///
/// Holds the request's concurrency slot; the caller keeps the ticket alive
/// while the tool runs and passes it back to [`PolicyDispatcher::record_outcome`]
/// so the closing audit record carries the real duration. Dropping the ticket
/// on any path releases the slot.
#[derive(Debug)]
pub struct AdmissionTicket {
    _guard: ConcurrencyGuard,
    started: Instant,
}

/// Result of the admission pipeline. Denials are values, not errors.
#[derive(Debug)]
pub enum Decision {
    /// Every check passed; the ticket holds the concurrency slot
    Admitted(AdmissionTicket),
    /// The first check that failed
    Denied(Violation),
}

impl Decision {
    /// Whether the request was admitted.
    pub fn allowed(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Why [`PolicyDispatcher::run`] did not return the tool's output.
#[derive(Debug, derive_more::Display)]
pub enum ToolRunError<E> {
    /// The pipeline denied the request; the tool never ran
    #[display("request denied: {_0}")]
    Denied(Violation),
    /// The tool ran and failed
    #[display("tool failed: {_0}")]
    Failed(E),
}

/// The single entry point the protocol layer calls per request.
///
/// Composes authorization, admission control, and query screening in a fixed
/// order: authorization first, so unauthorized callers never consume rate
/// budget; the first violation wins and later stages are skipped. Every
/// decision lands in the audit trail before it returns.
pub struct PolicyDispatcher {
    authorizer: AuthorizationEngine,
    limiter: RateLimiter,
    validator: QueryValidator,
    audit: Arc<AuditStore>,
    query_tools: HashSet<String>,
    query_argument: String,
}

impl PolicyDispatcher {
    /// Build a dispatcher from a validated configuration and a shared audit
    /// store.
    pub fn new(config: ToolgateConfig, audit: Arc<AuditStore>) -> ToolgateResult<Self> {
        config.validate()?;
        Ok(Self {
            authorizer: AuthorizationEngine::new(config.roles)?,
            limiter: RateLimiter::new(config.limits)?,
            validator: QueryValidator::new(),
            audit,
            query_tools: config.query_tools,
            query_argument: config.query_argument,
        })
    }

    /// Run the full pipeline for one request: authorization, admission
    /// control, then query screening. Authorization comes first so
    /// unauthorized callers never consume rate budget.
    #[instrument(skip(self, request), fields(identity = %request.identity, tool_name = %request.tool_name))]
    pub fn check(&self, request: &ToolRequest) -> Decision {
        if let Some(violation) = self.authorization_violation(request) {
            warn!(kind = violation.kind.as_ref(), "Request denied");
            self.record_violation(request, &violation);
            return Decision::Denied(violation);
        }

        let guard = match self
            .limiter
            .check_and_consume(&request.identity, &request.tool_name)
        {
            RateDecision::Admitted(guard) => guard,
            RateDecision::Denied { stage, retry_after } => {
                let violation = Violation::new(
                    ViolationKind::RateLimited,
                    Severity::Medium,
                    format!("admission denied by {stage}"),
                )
                .with_retry_after(retry_after);
                warn!(stage = stage.as_ref(), "Request rate limited");
                self.record_violation(request, &violation);
                return Decision::Denied(violation);
            }
        };

        if let Some(violation) = self.validation_violation(request) {
            // The guard drops here, releasing the concurrency slot; the
            // consumed rate token is not refunded.
            warn!(kind = violation.kind.as_ref(), "Query text rejected");
            self.record_violation(request, &violation);
            return Decision::Denied(violation);
        }

        debug!("Request admitted");
        self.audit.append(
            AuditEvent::new(
                EventType::ToolAuthorized,
                Severity::Low,
                Outcome::Success,
                request.identity.clone(),
                request.session_id.clone(),
            )
            .with_tool(request.tool_name.clone())
            .with_arguments_digest(digest_arguments(&request.arguments)),
        );
        Decision::Admitted(AdmissionTicket {
            _guard: guard,
            started: Instant::now(),
        })
    }

    /// Record the terminal outcome of an admitted request.
    ///
    /// Consumes the ticket, releasing the concurrency slot, and appends the
    /// closing `tool_execution` record with the measured duration.
    #[instrument(skip(self, request, ticket), fields(identity = %request.identity, tool_name = %request.tool_name))]
    pub fn record_outcome(
        &self,
        request: &ToolRequest,
        ticket: AdmissionTicket,
        outcome: Outcome,
        error: Option<&str>,
    ) {
        let duration_ms = ticket.started.elapsed().as_millis() as u64;
        let severity = match outcome {
            Outcome::Success => Severity::Low,
            Outcome::Failure | Outcome::Denied => Severity::Medium,
        };

        let mut event = AuditEvent::new(
            EventType::ToolExecution,
            severity,
            outcome,
            request.identity.clone(),
            request.session_id.clone(),
        )
        .with_tool(request.tool_name.clone())
        .with_arguments_digest(digest_arguments(&request.arguments))
        .with_duration_ms(duration_ms);
        if let Some(error) = error {
            event = event.with_data("error", json!(error));
        }
        info!(duration_ms, outcome = outcome.as_ref(), "Tool execution recorded");
        self.audit.append(event);
    }

    /// Check, execute, and record in one call.
    ///
    /// The concurrency slot is held for exactly the duration of `execute`,
    /// and the closing audit record is written on both outcomes.
    pub fn run<T, E, F>(&self, request: &ToolRequest, execute: F) -> Result<T, ToolRunError<E>>
    where
        E: std::fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        let ticket = match self.check(request) {
            Decision::Admitted(ticket) => ticket,
            Decision::Denied(violation) => return Err(ToolRunError::Denied(violation)),
        };

        match execute() {
            Ok(output) => {
                self.record_outcome(request, ticket, Outcome::Success, None);
                Ok(output)
            }
            Err(e) => {
                self.record_outcome(request, ticket, Outcome::Failure, Some(&e.to_string()));
                Err(ToolRunError::Failed(e))
            }
        }
    }

    /// First tool or resource authorization violation, or `None`.
    fn authorization_violation(&self, request: &ToolRequest) -> Option<Violation> {
        if let Some(violation) =
            self.authorizer
                .authorize(&request.identity, &request.tool_name, None)
        {
            return Some(violation);
        }

        // Table references in query text are an authorization concern even
        // though the text itself is screened later.
        if let Some(query) = self.query_text(request) {
            for table in self.validator.target_tables(query) {
                if let Some(violation) =
                    self.authorizer
                        .authorize(&request.identity, &request.tool_name, Some(&table))
                {
                    return Some(violation);
                }
            }
        }
        None
    }

    /// First query-screening violation, or `None`.
    fn validation_violation(&self, request: &ToolRequest) -> Option<Violation> {
        if !self.query_tools.contains(&request.tool_name) {
            return None;
        }

        let Some(query) = self.query_text(request) else {
            return Some(Violation::new(
                ViolationKind::MalformedInput,
                Severity::Low,
                format!("missing query text argument '{}'", self.query_argument),
            ));
        };

        let bounds = self.authorizer.query_bounds(&request.identity);
        self.validator.validate(query, &bounds)
    }

    /// The query text argument, when the tool carries one.
    fn query_text<'a>(&self, request: &'a ToolRequest) -> Option<&'a str> {
        if !self.query_tools.contains(&request.tool_name) {
            return None;
        }
        match request.arguments.get(&self.query_argument) {
            Some(serde_json::Value::String(query)) => Some(query),
            _ => None,
        }
    }

    /// Append the `security_violation` record for a denial.
    fn record_violation(&self, request: &ToolRequest, violation: &Violation) {
        let mut event = AuditEvent::new(
            EventType::SecurityViolation,
            violation.severity,
            Outcome::Denied,
            request.identity.clone(),
            request.session_id.clone(),
        )
        .with_tool(request.tool_name.clone())
        .with_arguments_digest(digest_arguments(&request.arguments))
        .with_data("violation", json!(violation.kind.as_ref()))
        .with_data("message", json!(violation.message));
        if let Some(retry_after) = violation.retry_after {
            event = event.with_data("retryAfterSecs", json!(retry_after.as_secs_f64()));
        }
        self.audit.append(event);
    }

    /// Assign a role to an identity.
    pub fn assign_role(&self, identity: &str, role: Role) {
        self.authorizer.assign_role(identity, role);
    }

    /// Resolved permissions for an identity.
    pub fn permissions_for(&self, identity: &str) -> Option<PermissionSummary> {
        self.authorizer.permissions_for(identity)
    }

    /// Replace the limits for one tool, or the default when `tool_name` is
    /// `None`.
    pub fn configure_limits(
        &self,
        tool_name: Option<&str>,
        config: LimitConfig,
    ) -> ToolgateResult<()> {
        self.limiter.configure_limits(tool_name, config)
    }

    /// Replace the global concurrency cap.
    pub fn configure_max_concurrent(&self, max: u32) -> ToolgateResult<()> {
        self.limiter.configure_max_concurrent(max)
    }

    /// Snapshot an identity's default rate budget.
    pub fn rate_status(&self, identity: &str) -> Option<RateStatus> {
        self.limiter.status(identity)
    }

    /// Discard an identity's accumulated rate state.
    pub fn reset_limits(&self, identity: &str) {
        self.limiter.reset(identity);
    }

    /// The shared audit store.
    pub fn audit(&self) -> &Arc<AuditStore> {
        &self.audit
    }
}
