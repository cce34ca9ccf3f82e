//! Deployment configuration for the policy layer.

use crate::RolePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use toolgate_error::{ConfigError, ToolgateResult};
use toolgate_limit::RateLimitSettings;
use tracing::instrument;

fn default_query_tools() -> HashSet<String> {
    HashSet::from(["custom_query".to_string()])
}

fn default_query_argument() -> String {
    "sql".to_string()
}

/// Top-level configuration: role grants, rate limits, and which tools carry
/// free-form query text.
///
/// Every section has a usable default, so an empty TOML document yields a
/// working (if conservative) deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolgateConfig {
    /// Role grant table
    pub roles: RolePolicy,
    /// Admission-control budgets
    pub limits: RateLimitSettings,
    /// Tools whose arguments carry query text to screen
    pub query_tools: HashSet<String>,
    /// Argument key holding the query text for those tools
    pub query_argument: String,
}

impl Default for ToolgateConfig {
    fn default() -> Self {
        Self {
            roles: RolePolicy::default(),
            limits: RateLimitSettings::default(),
            query_tools: default_query_tools(),
            query_argument: default_query_argument(),
        }
    }
}

impl ToolgateConfig {
    /// Parse a configuration from TOML text and validate it.
    #[instrument(skip(text))]
    pub fn from_toml_str(text: &str) -> ToolgateResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ConfigError::new(format!("configuration parse failed: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> ToolgateResult<()> {
        self.roles.validate()?;
        self.limits.validate()?;
        if self.query_argument.is_empty() {
            return Err(ConfigError::new("query argument key must be nonempty").into());
        }
        Ok(())
    }
}
