//! Token bucket with fractional tokens and continuous refill.

use std::time::{Duration, Instant};

/// Per-identity token bucket state.
///
/// Capacity and refill rate are passed in on each call rather than stored, so
/// runtime reconfiguration applies to existing identities on their next
/// request.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    /// Current available tokens
    tokens: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: Instant::now(),
        }
    }

    /// Refill tokens based on elapsed time, clamped to capacity.
    fn refill(&mut self, capacity: u32, refill_rate_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate_per_sec).min(f64::from(capacity));
        self.last_refill = now;
    }

    /// Try to consume one token. Returns the wait until a token is available
    /// on failure.
    pub(crate) fn try_consume(
        &mut self,
        capacity: u32,
        refill_rate_per_sec: f64,
    ) -> Result<(), Duration> {
        self.refill(capacity, refill_rate_per_sec);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let secs_to_wait = (1.0 - self.tokens) / refill_rate_per_sec;
            Err(Duration::from_secs_f64(secs_to_wait))
        }
    }

    /// Current whole tokens after a refill.
    pub(crate) fn available(&mut self, capacity: u32, refill_rate_per_sec: f64) -> u32 {
        self.refill(capacity, refill_rate_per_sec);
        self.tokens.floor() as u32
    }
}
