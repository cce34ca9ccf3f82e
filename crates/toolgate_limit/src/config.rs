//! Rate limit configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use toolgate_error::{ConfigError, ToolgateResult};

/// Limits applied to one identity for one tool class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Token bucket capacity (burst allowance)
    pub capacity: u32,
    /// Tokens restored per second
    pub refill_rate_per_sec: f64,
    /// Maximum requests per sliding window
    pub window_limit: u32,
    /// Sliding window duration in seconds
    pub window_duration_secs: u64,
}

impl LimitConfig {
    /// Create a new limit configuration.
    pub fn new(
        capacity: u32,
        refill_rate_per_sec: f64,
        window_limit: u32,
        window_duration_secs: u64,
    ) -> Self {
        Self {
            capacity,
            refill_rate_per_sec,
            window_limit,
            window_duration_secs,
        }
    }

    /// Reject configurations that would make admission undecidable.
    pub fn validate(&self) -> ToolgateResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::new("bucket capacity must be nonzero").into());
        }
        if !(self.refill_rate_per_sec.is_finite() && self.refill_rate_per_sec > 0.0) {
            return Err(ConfigError::new("refill rate must be positive and finite").into());
        }
        if self.window_limit == 0 {
            return Err(ConfigError::new("window limit must be nonzero").into());
        }
        if self.window_duration_secs == 0 {
            return Err(ConfigError::new("window duration must be nonzero").into());
        }
        Ok(())
    }
}

impl Default for LimitConfig {
    /// 30-request burst refilled at one token every two seconds, bounded to
    /// 500 requests per hour.
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_rate_per_sec: 0.5,
            window_limit: 500,
            window_duration_secs: 3600,
        }
    }
}

/// Full limiter configuration: a default, per-tool overrides, and the global
/// concurrency cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Limits applied when no tool override matches
    #[serde(default)]
    pub default: LimitConfig,

    /// Stricter (or looser) limits for specific tools
    #[serde(default)]
    pub tool_overrides: HashMap<String, LimitConfig>,

    /// Maximum requests in flight across all identities
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
}

fn default_max_concurrent() -> u32 {
    10
}

impl RateLimitSettings {
    /// Look up the limits for a tool, falling back to the default.
    pub fn for_tool(&self, tool_name: &str) -> &LimitConfig {
        self.tool_overrides.get(tool_name).unwrap_or(&self.default)
    }

    /// Whether a tool has its own override (and therefore its own state).
    pub(crate) fn has_override(&self, tool_name: &str) -> bool {
        self.tool_overrides.contains_key(tool_name)
    }

    /// Validate every contained configuration.
    pub fn validate(&self) -> ToolgateResult<()> {
        self.default.validate()?;
        for config in self.tool_overrides.values() {
            config.validate()?;
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::new("max concurrent must be nonzero").into());
        }
        Ok(())
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default: LimitConfig::default(),
            tool_overrides: HashMap::new(),
            max_concurrent: default_max_concurrent(),
        }
    }
}
