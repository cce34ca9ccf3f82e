//! End-to-end pipeline tests: authorization, admission control, query
//! screening, and the audit records each path leaves behind.

use serde_json::json;
use std::sync::Arc;
use toolgate_audit::{AuditStore, EventFilter, EventType, Outcome, Severity};
use toolgate_limit::LimitConfig;
use toolgate_policy::{
    Decision, PolicyDispatcher, Role, ToolRequest, ToolRunError, ToolgateConfig, ViolationKind,
};

fn dispatcher() -> (PolicyDispatcher, Arc<AuditStore>) {
    let audit = Arc::new(AuditStore::new());
    let dispatcher = PolicyDispatcher::new(ToolgateConfig::default(), audit.clone()).unwrap();
    (dispatcher, audit)
}

fn query_request(identity: &str, sql: &str) -> ToolRequest {
    ToolRequest::new(identity, "custom_query", "s1").with_argument("sql", json!(sql))
}

#[test]
fn test_guest_denied_with_one_violation_event() {
    let (dispatcher, audit) = dispatcher();

    let request = ToolRequest::new("stranger", "processes", "s1");
    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("guest must not reach the processes tool");
    };
    assert_eq!(violation.kind, ViolationKind::UnauthorizedTool);

    let violations = audit.query(&EventFilter::default().of_type(EventType::SecurityViolation));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].identity, "stranger");
    assert_eq!(violations[0].outcome, Outcome::Denied);
    assert_eq!(violations[0].additional_data["violation"], "unauthorized_tool");
}

#[test]
fn test_denied_table_in_query_text() {
    let (dispatcher, audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    // Analyst may run custom queries, but `yara` is on the analyst deny list.
    let request = query_request("alice", "SELECT * FROM yara");
    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("denied table must not pass");
    };
    assert_eq!(violation.kind, ViolationKind::UnauthorizedResource);
    assert_eq!(violation.severity, Severity::High);

    let violations = audit.query(&EventFilter::default().of_type(EventType::SecurityViolation));
    assert_eq!(violations.len(), 1);
}

#[test]
fn test_injection_attempt_is_critical() {
    let (dispatcher, audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    let request = query_request("alice", "SELECT * FROM processes; DROP TABLE processes");
    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("injection attempt must not pass");
    };
    assert_eq!(violation.kind, ViolationKind::InjectionSuspected);
    assert_eq!(violation.severity, Severity::Critical);

    let critical = audit.query(&EventFilter::default().at_least(Severity::Critical));
    assert_eq!(critical.len(), 1);
    // Raw query text never lands in the trail, only the redacted digest.
    assert!(critical[0].arguments_digest.as_deref().unwrap().starts_with("sha256:"));
}

#[test]
fn test_oversized_query_is_malformed_input() {
    let (dispatcher, _audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    let huge = format!("SELECT {} FROM processes", "x, ".repeat(20_000));
    let request = query_request("alice", &huge);
    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("oversized query must not pass");
    };
    assert_eq!(violation.kind, ViolationKind::MalformedInput);
}

#[test]
fn test_missing_query_argument_is_malformed_input() {
    let (dispatcher, _audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    let request = ToolRequest::new("alice", "custom_query", "s1");
    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("query tool without query text must not pass");
    };
    assert_eq!(violation.kind, ViolationKind::MalformedInput);
}

#[test]
fn test_happy_path_leaves_authorized_and_execution_records() {
    let (dispatcher, audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    let request = query_request("alice", "SELECT pid, name FROM processes LIMIT 10");
    let result: Result<u32, ToolRunError<String>> = dispatcher.run(&request, || Ok(7));
    assert_eq!(result.unwrap(), 7);

    let authorized = audit.query(&EventFilter::default().of_type(EventType::ToolAuthorized));
    assert_eq!(authorized.len(), 1);

    let executions = audit.query(&EventFilter::default().of_type(EventType::ToolExecution));
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].outcome, Outcome::Success);
    assert!(executions[0].duration_ms.is_some());
}

#[test]
fn test_tool_failure_is_recorded_and_returned() {
    let (dispatcher, audit) = dispatcher();
    dispatcher.assign_role("bob", Role::User);

    let request = ToolRequest::new("bob", "processes", "s1");
    let result: Result<u32, ToolRunError<String>> =
        dispatcher.run(&request, || Err("daemon unreachable".to_string()));
    assert!(matches!(result, Err(ToolRunError::Failed(_))));

    let executions = audit.query(&EventFilter::default().of_type(EventType::ToolExecution));
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].outcome, Outcome::Failure);
    assert_eq!(executions[0].additional_data["error"], "daemon unreachable");
}

#[test]
fn test_unauthorized_callers_consume_no_rate_budget() {
    let (dispatcher, _audit) = dispatcher();

    for _ in 0..5 {
        assert!(!dispatcher
            .check(&ToolRequest::new("stranger", "processes", "s1"))
            .allowed());
    }
    // No admission check ever ran, so no limiter state was materialized.
    assert!(dispatcher.rate_status("stranger").is_none());
}

#[test]
fn test_rate_limit_denial_carries_retry_hint() {
    let audit = Arc::new(AuditStore::new());
    let mut config = ToolgateConfig::default();
    config.limits.default = LimitConfig::new(2, 0.5, 100, 60);
    let dispatcher = PolicyDispatcher::new(config, audit.clone()).unwrap();
    dispatcher.assign_role("bob", Role::User);

    let request = ToolRequest::new("bob", "processes", "s1");
    assert!(dispatcher.check(&request).allowed());
    assert!(dispatcher.check(&request).allowed());

    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("third burst request must be rate limited");
    };
    assert_eq!(violation.kind, ViolationKind::RateLimited);
    let retry_after = violation.retry_after.unwrap();
    assert!(retry_after.as_secs_f64() > 0.0);

    let violations = audit.query(&EventFilter::default().of_type(EventType::SecurityViolation));
    assert_eq!(violations.len(), 1);
    assert!(violations[0].additional_data.contains_key("retryAfterSecs"));
}

#[test]
fn test_runtime_reconfiguration_applies_to_next_request() {
    let (dispatcher, _audit) = dispatcher();
    dispatcher.assign_role("bob", Role::User);

    // Restrict the processes tool to a single-request burst.
    dispatcher
        .configure_limits(Some("processes"), LimitConfig::new(1, 0.01, 100, 60))
        .unwrap();

    let request = ToolRequest::new("bob", "processes", "s1");
    assert!(dispatcher.check(&request).allowed());
    assert!(!dispatcher.check(&request).allowed());

    // Other tools still run on the default budget.
    assert!(dispatcher
        .check(&ToolRequest::new("bob", "users", "s1"))
        .allowed());
}

#[test]
fn test_admin_bypasses_allow_lists_but_not_screening() {
    let (dispatcher, _audit) = dispatcher();
    dispatcher.assign_role("root", Role::Admin);

    assert!(dispatcher
        .check(&query_request("root", "SELECT * FROM kernel_modules"))
        .allowed());

    // Injection screening still applies to admins.
    let Decision::Denied(violation) = dispatcher.check(&query_request(
        "root",
        "SELECT 1; DELETE FROM kernel_modules",
    )) else {
        panic!("injection must be denied regardless of role");
    };
    assert_eq!(violation.kind, ViolationKind::InjectionSuspected);
}

#[test]
fn test_result_rows_bounded_per_role() {
    let (dispatcher, audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    // Analyst row bound is 2000; a larger LIMIT is an excessive query.
    let request = query_request("alice", "SELECT name FROM processes LIMIT 100000");
    let Decision::Denied(violation) = dispatcher.check(&request) else {
        panic!("over-bound LIMIT must not pass");
    };
    assert_eq!(violation.kind, ViolationKind::ExcessiveQuery);
    assert_eq!(violation.severity, Severity::Medium);

    let violations = audit.query(&EventFilter::default().of_type(EventType::SecurityViolation));
    assert_eq!(violations[0].additional_data["violation"], "excessive_query");

    // Within the bound the same query passes.
    assert!(dispatcher
        .check(&query_request("alice", "SELECT name FROM processes LIMIT 100"))
        .allowed());
}

#[test]
fn test_unbounded_large_table_query_denied() {
    let (dispatcher, _audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    let Decision::Denied(violation) =
        dispatcher.check(&query_request("alice", "SELECT name FROM processes"))
    else {
        panic!("unbounded large-table query must not pass");
    };
    assert_eq!(violation.kind, ViolationKind::ExcessiveQuery);
}

#[test]
fn test_permissions_summary_reflects_assignment() {
    let (dispatcher, _audit) = dispatcher();
    dispatcher.assign_role("alice", Role::Analyst);

    let summary = dispatcher.permissions_for("alice").unwrap();
    assert_eq!(summary.role, Role::Analyst);
    assert!(summary.tools.contains(&"custom_query".to_string()));
    assert!(summary.denied_tables.contains(&"yara".to_string()));
    assert_eq!(summary.max_query_len, 4096);
    assert_eq!(summary.max_result_rows, 2000);
    assert_eq!(summary.max_query_complexity, 200);
}
