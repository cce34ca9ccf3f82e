//! Multi-tier admission control for the Toolgate security interception layer.
//!
//! Three independent checks gate every request, cheapest first:
//!
//! 1. **Token bucket** per identity — absorbs bursts up to a capacity,
//!    refilled continuously over time.
//! 2. **Sliding window** per identity — bounds sustained rate independent of
//!    the burst allowance.
//! 3. **Global concurrency cap** — bounds resource pressure on the downstream
//!    executor regardless of rate. Admission yields an RAII guard whose drop
//!    releases the slot, so release happens exactly once on every exit path.
//!
//! Denial from any stage skips the later stages and carries a back-off hint.
//! Internal inconsistencies fail closed: a request is denied, never silently
//! admitted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod config;
mod limiter;
mod window;

pub use config::{LimitConfig, RateLimitSettings};
pub use limiter::{ConcurrencyGuard, LimitStage, RateDecision, RateLimiter, RateStatus};
