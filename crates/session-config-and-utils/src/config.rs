//! Configuration management for the session coordinator.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://random.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "random-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Bounded wait for the explicit session lookup during bootstrap.
pub const DEFAULT_BOOTSTRAP_TIMEOUT_MS: u64 = 1_000;

/// Bounded wait for resolving a user from a cached access token.
pub const DEFAULT_CACHED_RESTORE_TIMEOUT_MS: u64 = 3_000;

/// Period of the recurring authenticated-only prompt (10 minutes).
pub const DEFAULT_PROMPT_INTERVAL_SECS: u64 = 600;

/// Keychain service name shared by every secure store entry.
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.session-coordinator.credentials";

/// Which credential store implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Secure store on platforms that have one, local store elsewhere.
    #[default]
    Auto,
    /// OS keychain / secret service.
    Secure,
    /// Plain file-backed key-value store.
    Local,
    /// Process-local store, nothing survives a restart.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "secure" | "keychain" => Ok(Self::Secure),
            "local" | "file" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => Err(CoreError::Config(format!("unknown store backend: {other}"))),
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Explicit session lookup timeout during bootstrap.
    #[serde(default = "default_bootstrap_timeout_ms")]
    pub bootstrap_timeout_ms: u64,
    /// Timeout for resolving the user behind a cached token.
    #[serde(default = "default_cached_restore_timeout_ms")]
    pub cached_restore_timeout_ms: u64,
    /// Period of the recurring prompt while authenticated.
    #[serde(default = "default_prompt_interval_secs")]
    pub prompt_interval_secs: u64,
    /// Credential store selection.
    #[serde(default)]
    pub store_backend: StoreBackend,
    /// Keychain service name for the secure store.
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_bootstrap_timeout_ms() -> u64 {
    DEFAULT_BOOTSTRAP_TIMEOUT_MS
}

fn default_cached_restore_timeout_ms() -> u64 {
    DEFAULT_CACHED_RESTORE_TIMEOUT_MS
}

fn default_prompt_interval_secs() -> u64 {
    DEFAULT_PROMPT_INTERVAL_SECS
}

fn default_keychain_service() -> String {
    DEFAULT_KEYCHAIN_SERVICE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            bootstrap_timeout_ms: DEFAULT_BOOTSTRAP_TIMEOUT_MS,
            cached_restore_timeout_ms: DEFAULT_CACHED_RESTORE_TIMEOUT_MS,
            prompt_interval_secs: DEFAULT_PROMPT_INTERVAL_SECS,
            store_backend: StoreBackend::default(),
            keychain_service: default_keychain_service(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file under `paths`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        // Unparseable values are ignored; the file/default value stays.
        let _ = self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognized names: `SESSION_LOG_LEVEL`, `SESSION_BOOTSTRAP_TIMEOUT_MS`,
    /// `SESSION_STORE_BACKEND`, `SUPABASE_URL`, `SUPABASE_PUBLISHABLE_KEY`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = lookup("SESSION_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.supabase_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("SUPABASE_PUBLISHABLE_KEY") {
            self.supabase_publishable_key = key;
        }
        if let Some(raw) = lookup("SESSION_BOOTSTRAP_TIMEOUT_MS") {
            self.bootstrap_timeout_ms = raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("SESSION_BOOTSTRAP_TIMEOUT_MS is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("SESSION_STORE_BACKEND") {
            self.store_backend = raw.parse()?;
        }
        Ok(())
    }

    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.bootstrap_timeout_ms == 0 {
            return Err(CoreError::Config(
                "bootstrap_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.prompt_interval_secs == 0 {
            return Err(CoreError::Config(
                "prompt_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.supabase_url()?;
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }
}
