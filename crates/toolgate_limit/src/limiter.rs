//! Per-identity admission control with a global concurrency cap.

use crate::bucket::TokenBucket;
use crate::window::SlidingWindow;
use crate::{LimitConfig, RateLimitSettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use toolgate_error::ToolgateResult;
use tracing::{debug, error, instrument, warn};

/// Back-off hint when the concurrency cap is saturated. Slots free as soon as
/// a guard drops, so the hint is short and fixed.
const CONCURRENCY_RETRY: Duration = Duration::from_secs(1);

/// Which stage of the admission pipeline denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum LimitStage {
    /// Burst budget exhausted
    TokenBucket,
    /// Sustained-rate budget exhausted
    SlidingWindow,
    /// Too many requests in flight
    Concurrency,
    /// Internal limiter state was unusable; denied rather than admitted
    Internal,
}

/// RAII handle for an admitted request's concurrency slot.
///
/// Dropping the guard releases the slot. The caller must keep it alive for
/// the duration of tool execution and drop it on every exit path, which
/// ownership makes automatic.
pub struct ConcurrencyGuard {
    in_flight: Arc<AtomicU32>,
}

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ConcurrencyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGuard").finish_non_exhaustive()
    }
}

/// Outcome of `check_and_consume`.
#[derive(Debug)]
pub enum RateDecision {
    /// All three checks passed
    Admitted(ConcurrencyGuard),
    /// A check failed; later stages were skipped
    Denied {
        /// Stage that denied the request
        stage: LimitStage,
        /// Deterministic back-off hint for the caller
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request was admitted.
    pub fn allowed(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    /// Back-off hint, present only on denial.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Admitted(_) => None,
            Self::Denied { retry_after, .. } => Some(*retry_after),
        }
    }
}

/// Operator-facing snapshot of one identity's budget.
#[derive(Debug, Clone)]
pub struct RateStatus {
    /// Whole tokens currently available in the bucket
    pub tokens_available: u32,
    /// Requests remaining in the current window
    pub window_remaining: u32,
    /// Requests currently in flight (global)
    pub in_flight: u32,
    /// Concurrency cap (global)
    pub max_concurrent: u32,
}

/// Bucket/window state is keyed per identity, with separate state for tools
/// that carry their own override so a strict tool budget cannot be drained
/// through the default budget (or vice versa).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
    identity: String,
    tool_override: Option<String>,
}

struct IdentityState {
    bucket: TokenBucket,
    window: SlidingWindow,
}

/// Per-identity and global admission control.
///
/// Each identity's state sits behind its own mutex inside a shared map, so
/// unrelated identities never contend. The global in-flight counter is a
/// lock-free atomic. No lock is held across a call into another stage.
pub struct RateLimiter {
    settings: RwLock<RateLimitSettings>,
    states: RwLock<HashMap<StateKey, Arc<Mutex<IdentityState>>>>,
    in_flight: Arc<AtomicU32>,
    max_concurrent: AtomicU32,
}

impl RateLimiter {
    /// Create a limiter from validated settings.
    pub fn new(settings: RateLimitSettings) -> ToolgateResult<Self> {
        settings.validate()?;
        let max_concurrent = settings.max_concurrent;
        Ok(Self {
            settings: RwLock::new(settings),
            states: RwLock::new(HashMap::new()),
            in_flight: Arc::new(AtomicU32::new(0)),
            max_concurrent: AtomicU32::new(max_concurrent),
        })
    }

    /// Run the three-stage admission check for one request.
    ///
    /// Order is cheapest-first: token bucket, sliding window, then the
    /// concurrency cap, since only concurrency acquisition carries a release
    /// obligation. Any internal inconsistency denies rather than admits.
    #[instrument(skip(self), fields(identity, tool_name))]
    pub fn check_and_consume(&self, identity: &str, tool_name: &str) -> RateDecision {
        let (config, keyed_by_tool) = match self.settings.read() {
            Ok(settings) => (
                settings.for_tool(tool_name).clone(),
                settings.has_override(tool_name),
            ),
            Err(_) => {
                error!("Limiter settings lock poisoned, failing closed");
                return Self::internal_denial();
            }
        };

        let key = StateKey {
            identity: identity.to_string(),
            tool_override: keyed_by_tool.then(|| tool_name.to_string()),
        };
        let Some(state) = self.state_for(&key, &config) else {
            return Self::internal_denial();
        };

        // Bucket and window share the identity lock; it is released before
        // the global concurrency stage runs.
        {
            let Ok(mut state) = state.lock() else {
                error!("Identity limiter state poisoned, failing closed");
                return Self::internal_denial();
            };

            if let Err(retry_after) = state
                .bucket
                .try_consume(config.capacity, config.refill_rate_per_sec)
            {
                debug!(retry_after_secs = retry_after.as_secs_f64(), "Token bucket exhausted");
                return RateDecision::Denied {
                    stage: LimitStage::TokenBucket,
                    retry_after,
                };
            }

            let window_duration = Duration::from_secs(config.window_duration_secs);
            if let Err(retry_after) = state
                .window
                .try_consume(config.window_limit, window_duration)
            {
                debug!(retry_after_secs = retry_after.as_secs_f64(), "Sliding window exhausted");
                return RateDecision::Denied {
                    stage: LimitStage::SlidingWindow,
                    retry_after,
                };
            }
        }

        self.acquire_slot()
    }

    /// Atomically claim a concurrency slot.
    fn acquire_slot(&self) -> RateDecision {
        let max = self.max_concurrent.load(Ordering::Acquire);
        let claimed = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            });

        match claimed {
            Ok(_) => RateDecision::Admitted(ConcurrencyGuard {
                in_flight: Arc::clone(&self.in_flight),
            }),
            Err(current) => {
                warn!(in_flight = current, max, "Concurrency cap saturated");
                RateDecision::Denied {
                    stage: LimitStage::Concurrency,
                    retry_after: CONCURRENCY_RETRY,
                }
            }
        }
    }

    /// Fetch or lazily create the state for a key.
    fn state_for(
        &self,
        key: &StateKey,
        config: &LimitConfig,
    ) -> Option<Arc<Mutex<IdentityState>>> {
        if let Ok(states) = self.states.read()
            && let Some(state) = states.get(key)
        {
            return Some(Arc::clone(state));
        }

        let Ok(mut states) = self.states.write() else {
            error!("Limiter state map poisoned, failing closed");
            return None;
        };
        Some(Arc::clone(states.entry(key.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(IdentityState {
                bucket: TokenBucket::new(config.capacity),
                window: SlidingWindow::new(),
            }))
        })))
    }

    fn internal_denial() -> RateDecision {
        RateDecision::Denied {
            stage: LimitStage::Internal,
            retry_after: CONCURRENCY_RETRY,
        }
    }

    /// Replace the limits for one tool, or the default when `tool_name` is
    /// `None`. Takes effect for subsequent requests without restart.
    #[instrument(skip(self, config))]
    pub fn configure_limits(
        &self,
        tool_name: Option<&str>,
        config: LimitConfig,
    ) -> ToolgateResult<()> {
        config.validate()?;
        let Ok(mut settings) = self.settings.write() else {
            // A poisoned settings lock already fails every request closed.
            return Err(
                toolgate_error::ConfigError::new("limiter settings lock poisoned").into(),
            );
        };
        match tool_name {
            Some(tool) => {
                settings.tool_overrides.insert(tool.to_string(), config);
            }
            None => settings.default = config,
        }
        Ok(())
    }

    /// Replace the global concurrency cap. Lowering it below the current
    /// in-flight count denies new requests until enough guards drop.
    #[instrument(skip(self))]
    pub fn configure_max_concurrent(&self, max: u32) -> ToolgateResult<()> {
        if max == 0 {
            return Err(
                toolgate_error::ConfigError::new("max concurrent must be nonzero").into(),
            );
        }
        self.max_concurrent.store(max, Ordering::Release);
        if let Ok(mut settings) = self.settings.write() {
            settings.max_concurrent = max;
        }
        Ok(())
    }

    /// Snapshot one identity's default-budget status.
    pub fn status(&self, identity: &str) -> Option<RateStatus> {
        let config = self.settings.read().ok()?.default.clone();
        let key = StateKey {
            identity: identity.to_string(),
            tool_override: None,
        };
        let state = {
            let states = self.states.read().ok()?;
            Arc::clone(states.get(&key)?)
        };
        let mut state = state.lock().ok()?;

        Some(RateStatus {
            tokens_available: state
                .bucket
                .available(config.capacity, config.refill_rate_per_sec),
            window_remaining: state.window.remaining(
                config.window_limit,
                Duration::from_secs(config.window_duration_secs),
            ),
            in_flight: self.in_flight.load(Ordering::Acquire),
            max_concurrent: self.max_concurrent.load(Ordering::Acquire),
        })
    }

    /// Operator reset: discard all accumulated state for an identity.
    #[instrument(skip(self))]
    pub fn reset(&self, identity: &str) {
        if let Ok(mut states) = self.states.write() {
            states.retain(|key, _| key.identity != identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(config: LimitConfig, max_concurrent: u32) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            default: config,
            tool_overrides: HashMap::new(),
            max_concurrent,
        })
        .unwrap()
    }

    #[test]
    fn test_admission_within_budget() {
        let limiter = limiter(LimitConfig::new(5, 1.0, 100, 60), 10);
        for _ in 0..5 {
            assert!(limiter.check_and_consume("u1", "processes").allowed());
        }
    }

    #[test]
    fn test_identities_do_not_share_budgets() {
        let limiter = limiter(LimitConfig::new(1, 0.01, 100, 60), 10);
        assert!(limiter.check_and_consume("u1", "processes").allowed());
        assert!(!limiter.check_and_consume("u1", "processes").allowed());
        assert!(limiter.check_and_consume("u2", "processes").allowed());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = RateLimitSettings {
            default: LimitConfig::new(0, 1.0, 10, 60),
            tool_overrides: HashMap::new(),
            max_concurrent: 10,
        };
        assert!(RateLimiter::new(settings).is_err());
    }

    #[test]
    fn test_poisoned_identity_state_fails_closed() {
        let limiter = Arc::new(limiter(LimitConfig::new(5, 1.0, 100, 60), 10));
        // Materialize state for u1, then poison its mutex.
        assert!(limiter.check_and_consume("u1", "processes").allowed());

        let state = {
            let states = limiter.states.read().unwrap();
            let key = StateKey {
                identity: "u1".to_string(),
                tool_override: None,
            };
            Arc::clone(states.get(&key).unwrap())
        };
        let _ = std::thread::spawn(move || {
            let _guard = state.lock().unwrap();
            panic!("poison the identity state");
        })
        .join();

        let decision = limiter.check_and_consume("u1", "processes");
        assert!(!decision.allowed());
        assert!(matches!(
            decision,
            RateDecision::Denied {
                stage: LimitStage::Internal,
                ..
            }
        ));
    }

    #[test]
    fn test_reset_restores_budget() {
        let limiter = limiter(LimitConfig::new(1, 0.01, 100, 60), 10);
        assert!(limiter.check_and_consume("u1", "processes").allowed());
        assert!(!limiter.check_and_consume("u1", "processes").allowed());

        limiter.reset("u1");
        assert!(limiter.check_and_consume("u1", "processes").allowed());
    }
}
