//! Heuristic screening of free-form query text.

use crate::{Violation, ViolationKind};
use regex::Regex;
use std::sync::LazyLock;
use toolgate_audit::Severity;
use tracing::debug;

// The screen is a conservative pre-filter, not a SQL parser: it must never
// pass text a parser would reject as mutating, and false positives on exotic
// but legitimate queries are acceptable.

static MUTATING_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|create|attach|detach)\b")
        .expect("mutating keyword pattern is valid")
});

/// Statement separator followed by more text, i.e. a second statement.
static MULTI_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*\S").expect("multi-statement pattern is valid"));

static DANGEROUS_FUNCTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(load_extension|load_file|benchmark|sleep|exec|eval)\s*\(")
        .expect("dangerous function pattern is valid")
});

static TABLE_REFERENCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("table reference pattern is valid")
});

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\s+(\d+)").expect("limit clause pattern is valid"));

static JOINS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bjoin\b").expect("join pattern is valid"));
static GROUP_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bgroup\s+by\b").expect("group by pattern is valid"));
static ORDER_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\border\s+by\b").expect("order by pattern is valid"));
static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("where pattern is valid"));
static CONDITIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(and|or)\b").expect("condition pattern is valid"));
static WILDCARD_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)select\s+\*").expect("wildcard pattern is valid"));

/// Tables that can return very large result sets; queries against them must
/// carry an explicit LIMIT.
const LARGE_TABLES: &[&str] = &[
    "processes",
    "file",
    "hash",
    "process_open_sockets",
    "listening_ports",
];

/// Per-role bounds applied to query text.
#[derive(Debug, Clone, Copy)]
pub struct QueryBounds {
    /// Maximum query-text length in bytes
    pub max_len: usize,
    /// Maximum complexity score
    pub max_complexity: u32,
    /// Maximum result rows a LIMIT clause may request
    pub max_result_rows: u32,
}

impl QueryBounds {
    /// Bounds that reject every query, for fail-closed paths.
    pub fn deny_all() -> Self {
        Self {
            max_len: 0,
            max_complexity: 0,
            max_result_rows: 0,
        }
    }
}

/// Injection and shape screening for query text.
///
/// Stateless and cheap to share; every method takes the text by reference
/// and returns the first violation found, ordered from cheapest check to
/// most expensive.
#[derive(Debug, Default, Clone)]
pub struct QueryValidator;

impl QueryValidator {
    /// Create a validator.
    pub fn new() -> Self {
        Self
    }

    /// Screen query text. Returns the first violation, or `None` when the
    /// text looks like a single read-only statement within the bounds.
    pub fn validate(&self, query: &str, bounds: &QueryBounds) -> Option<Violation> {
        if query.len() > bounds.max_len {
            debug!(
                len = query.len(),
                max_len = bounds.max_len,
                "Query text over length bound"
            );
            return Some(Violation::new(
                ViolationKind::MalformedInput,
                Severity::Low,
                format!(
                    "query text is {} bytes, limit is {}",
                    query.len(),
                    bounds.max_len
                ),
            ));
        }

        let trimmed = query.trim_start();
        if trimmed.is_empty() {
            return Some(Violation::new(
                ViolationKind::MalformedInput,
                Severity::Low,
                "query text is empty",
            ));
        }

        // Only plain SELECT statements are read-only by construction; WITH,
        // PRAGMA, and EXPLAIN are all outside the screen's allow shape.
        let starts_with_select = trimmed
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"))
            && trimmed[6..].starts_with(char::is_whitespace);
        if !starts_with_select {
            debug!("Query text does not start with SELECT");
            return Some(Violation::new(
                ViolationKind::InjectionSuspected,
                Severity::Critical,
                "query text must be a single SELECT statement",
            ));
        }

        if let Some(found) = MUTATING_KEYWORDS.find(trimmed) {
            debug!(keyword = found.as_str(), "Mutating keyword in query text");
            return Some(Violation::new(
                ViolationKind::InjectionSuspected,
                Severity::Critical,
                format!("mutating keyword '{}' in query text", found.as_str()),
            ));
        }

        if MULTI_STATEMENT.is_match(trimmed) {
            debug!("Statement separator in query text");
            return Some(Violation::new(
                ViolationKind::InjectionSuspected,
                Severity::High,
                "multiple statements in query text",
            ));
        }

        if trimmed.contains("--") || trimmed.contains("/*") || trimmed.contains('#') {
            debug!("Comment marker in query text");
            return Some(Violation::new(
                ViolationKind::InjectionSuspected,
                Severity::High,
                "comment marker in query text",
            ));
        }

        if let Some(found) = DANGEROUS_FUNCTIONS.find(trimmed) {
            debug!(function = found.as_str(), "Dangerous function in query text");
            return Some(Violation::new(
                ViolationKind::InjectionSuspected,
                Severity::High,
                format!("dangerous function call in query text: {}", found.as_str()),
            ));
        }

        let score = complexity_score(trimmed);
        if score > bounds.max_complexity {
            debug!(score, max = bounds.max_complexity, "Query too complex");
            return Some(Violation::new(
                ViolationKind::ExcessiveQuery,
                Severity::Medium,
                format!(
                    "query complexity {score} exceeds limit {}",
                    bounds.max_complexity
                ),
            ));
        }

        self.result_limit_violation(trimmed, bounds)
    }

    /// Bound the result size a query may request.
    ///
    /// A present LIMIT must be within the role's row bound; an absent LIMIT
    /// is rejected when the query touches a table that can return very large
    /// result sets.
    fn result_limit_violation(&self, query: &str, bounds: &QueryBounds) -> Option<Violation> {
        if let Some(capture) = LIMIT_CLAUSE.captures(query) {
            // An unparseable number is over any bound.
            let requested = capture[1].parse::<u64>().unwrap_or(u64::MAX);
            if requested > u64::from(bounds.max_result_rows) {
                debug!(requested, max = bounds.max_result_rows, "LIMIT over row bound");
                return Some(Violation::new(
                    ViolationKind::ExcessiveQuery,
                    Severity::Medium,
                    format!(
                        "LIMIT {requested} exceeds maximum {}",
                        bounds.max_result_rows
                    ),
                ));
            }
            return None;
        }

        let large = self
            .target_tables(query)
            .into_iter()
            .find(|table| LARGE_TABLES.contains(&table.as_str()));
        if let Some(table) = large {
            debug!(table, "Unbounded query on a large table");
            return Some(Violation::new(
                ViolationKind::ExcessiveQuery,
                Severity::Medium,
                format!(
                    "query on large table '{table}' without a LIMIT clause (max {})",
                    bounds.max_result_rows
                ),
            ));
        }
        None
    }

    /// Table names referenced by FROM and JOIN clauses, lowercased and
    /// deduplicated, in order of first appearance.
    pub fn target_tables(&self, query: &str) -> Vec<String> {
        let mut tables = Vec::new();
        for capture in TABLE_REFERENCES.captures_iter(query) {
            let table = capture[1].to_ascii_lowercase();
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }
}

/// Score a query's structural complexity: joins and aggregation clauses
/// weigh more than simple conditions, and wildcard projections add a flat
/// penalty.
fn complexity_score(query: &str) -> u32 {
    let count = |re: &Regex| re.find_iter(query).count() as u32;

    let mut score = 1;
    score += count(&JOINS) * 5;
    score += count(&GROUP_BY) * 3;
    score += count(&ORDER_BY) * 2;
    score += count(&WHERE_CLAUSE) * 2;
    score += count(&CONDITIONS);
    if WILDCARD_SELECT.is_match(query) {
        score += 5;
    }
    score
}
