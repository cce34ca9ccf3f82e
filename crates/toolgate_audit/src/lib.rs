//! Append-only audit trail for the Toolgate security interception layer.
//!
//! Every security decision made by the policy dispatcher lands here as a
//! structured [`AuditEvent`]. The store is the single writer of durable
//! history: other components only produce events, never read or delete them.
//!
//! Two guarantees shape the API:
//!
//! - `append` is infallible for the caller. Sink write errors are caught,
//!   counted in a lost-event metric, and logged, so bookkeeping can never
//!   block or corrupt a caller-visible outcome.
//! - Once `append` returns, the event is visible to `query` from the same
//!   process, and re-querying with the same filter is deterministic given no
//!   new writes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod digest;
mod event;
mod report;
mod session;
mod sink;
mod store;

pub use digest::digest_arguments;
pub use event::{AuditEvent, EventType, Outcome, Severity};
pub use report::ComplianceReport;
pub use session::{Session, SessionSummary};
pub use sink::{EventSink, JsonlSink};
pub use store::{AuditStore, EventFilter};
