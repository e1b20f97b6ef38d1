//! Runtime tuning for the coordinator.

use session_config_and_utils::Config;
use std::time::Duration;

/// Timeouts and periods the coordinator runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Bound on the backend session lookup during bootstrap.
    pub bootstrap_timeout: Duration,
    /// Bound on resolving the user behind a cached token during bootstrap.
    pub cached_restore_timeout: Duration,
    /// Period of the side-effect timer while authenticated.
    pub prompt_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            bootstrap_timeout: Duration::from_millis(config.bootstrap_timeout_ms),
            cached_restore_timeout: Duration::from_millis(config.cached_restore_timeout_ms),
            prompt_interval: Duration::from_secs(config.prompt_interval_secs),
        }
    }
}
