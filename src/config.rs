//! Configuration for the resilience layer
//!
//! [`ResilienceConfig`] holds the feature toggles, retry settings, cache sizing
//! and per-provider quotas. It can be built in code (`Default` gives the
//! documented production values) or loaded from a TOML file whose every field
//! is optional:
//!
//! ```toml
//! fallback_enabled = true
//! max_retries = 2
//!
//! [providers.github]
//! max_calls_per_window = 30
//! window_ms = 60000
//!
//! [credentials]
//! github_token = "ghp_..."
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::Provider;

const HOUR_MS: u64 = 60 * 60 * 1000;
const MINUTE_MS: u64 = 60 * 1000;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has wrong field types
    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Values parsed but make no sense together
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Quota and backoff settings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Calls admitted per window
    pub max_calls_per_window: u32,
    /// Length of the trailing window
    pub window_ms: u64,
    /// Minimum delay before retrying; also the first backoff step
    pub base_retry_delay_ms: u64,
    /// Growth factor applied per failure beyond the throttle threshold
    pub backoff_multiplier: f64,
    /// Backoff ceiling
    pub max_backoff_delay_ms: u64,
    /// How long a live result stays fresh in the cache
    pub cache_ttl_ms: u64,
}

impl ProviderConfig {
    /// Production defaults for a provider
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::ProductHunt => Self {
                max_calls_per_window: 100,
                window_ms: HOUR_MS,
                base_retry_delay_ms: 5 * MINUTE_MS,
                backoff_multiplier: 2.0,
                max_backoff_delay_ms: 30 * MINUTE_MS,
                cache_ttl_ms: 10 * MINUTE_MS,
            },
            Provider::HackerNews => Self {
                max_calls_per_window: 1000,
                window_ms: HOUR_MS,
                base_retry_delay_ms: MINUTE_MS,
                backoff_multiplier: 1.5,
                max_backoff_delay_ms: 10 * MINUTE_MS,
                cache_ttl_ms: 5 * MINUTE_MS,
            },
            Provider::GitHub => Self {
                max_calls_per_window: 5000,
                window_ms: HOUR_MS,
                base_retry_delay_ms: MINUTE_MS,
                backoff_multiplier: 1.2,
                max_backoff_delay_ms: 5 * MINUTE_MS,
                cache_ttl_ms: 15 * MINUTE_MS,
            },
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn max_backoff_delay(&self) -> Duration {
        Duration::from_millis(self.max_backoff_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    fn validate(&self, provider: Provider) -> Result<(), ConfigError> {
        if self.max_calls_per_window == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}: max_calls_per_window must be at least 1",
                provider
            )));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}: window_ms must be positive",
                provider
            )));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "{}: backoff_multiplier must be >= 1.0, got {}",
                provider, self.backoff_multiplier
            )));
        }
        if self.max_backoff_delay_ms < self.base_retry_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "{}: max_backoff_delay_ms is below base_retry_delay_ms",
                provider
            )));
        }
        Ok(())
    }
}

/// Per-provider settings, one field per provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfigs {
    pub product_hunt: ProviderConfig,
    pub hacker_news: ProviderConfig,
    pub github: ProviderConfig,
}

impl ProviderConfigs {
    pub fn get(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::ProductHunt => &self.product_hunt,
            Provider::HackerNews => &self.hacker_news,
            Provider::GitHub => &self.github,
        }
    }

    pub fn get_mut(&mut self, provider: Provider) -> &mut ProviderConfig {
        match provider {
            Provider::ProductHunt => &mut self.product_hunt,
            Provider::HackerNews => &mut self.hacker_news,
            Provider::GitHub => &mut self.github,
        }
    }
}

impl Default for ProviderConfigs {
    fn default() -> Self {
        Self {
            product_hunt: ProviderConfig::for_provider(Provider::ProductHunt),
            hacker_news: ProviderConfig::for_provider(Provider::HackerNews),
            github: ProviderConfig::for_provider(Provider::GitHub),
        }
    }
}

/// API credentials for providers that need them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub product_hunt_token: Option<String>,
    pub github_token: Option<String>,
}

/// Settings for the orchestrator, cache and rate limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Serve fresh hits from the cache and store live results
    pub enable_caching: bool,
    /// Consult the rate limiter before each call
    pub enable_rate_limiting: bool,
    /// Serve stale or seed data instead of surfacing transient errors
    pub fallback_enabled: bool,
    /// Extra attempts after the first failed call
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
    /// Bound on a single provider call
    pub request_timeout_ms: u64,
    /// Capacity of the response cache
    pub cache_max_size: usize,
    /// Interval of the background expiry sweep
    pub sweep_interval_ms: u64,
    /// How long a last-known-good response is retained for fallback
    pub stale_ttl_ms: u64,
    pub providers: ProviderConfigs,
    pub credentials: Credentials,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            enable_rate_limiting: true,
            fallback_enabled: true,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 10_000,
            cache_max_size: 500,
            sweep_interval_ms: MINUTE_MS,
            stale_ttl_ms: 24 * HOUR_MS,
            providers: ProviderConfigs::default(),
            credentials: Credentials::default(),
        }
    }
}

/// Partial provider settings as written in a config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderOverrides {
    max_calls_per_window: Option<u32>,
    window_ms: Option<u64>,
    base_retry_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    max_backoff_delay_ms: Option<u64>,
    cache_ttl_ms: Option<u64>,
}

impl ProviderOverrides {
    fn apply(self, config: &mut ProviderConfig) {
        if let Some(v) = self.max_calls_per_window {
            config.max_calls_per_window = v;
        }
        if let Some(v) = self.window_ms {
            config.window_ms = v;
        }
        if let Some(v) = self.base_retry_delay_ms {
            config.base_retry_delay_ms = v;
        }
        if let Some(v) = self.backoff_multiplier {
            config.backoff_multiplier = v;
        }
        if let Some(v) = self.max_backoff_delay_ms {
            config.max_backoff_delay_ms = v;
        }
        if let Some(v) = self.cache_ttl_ms {
            config.cache_ttl_ms = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderOverridesFile {
    #[serde(default)]
    product_hunt: ProviderOverrides,
    #[serde(default)]
    hacker_news: ProviderOverrides,
    #[serde(default)]
    github: ProviderOverrides,
}

/// On-disk form; every field falls back to the defaults
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    enable_caching: Option<bool>,
    enable_rate_limiting: Option<bool>,
    fallback_enabled: Option<bool>,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    cache_max_size: Option<usize>,
    sweep_interval_ms: Option<u64>,
    stale_ttl_ms: Option<u64>,
    #[serde(default)]
    providers: ProviderOverridesFile,
    #[serde(default)]
    credentials: Credentials,
}

impl ResilienceConfig {
    /// Parses configuration from TOML text, filling gaps with defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let defaults = Self::default();

        let mut providers = defaults.providers;
        file.providers
            .product_hunt
            .apply(providers.get_mut(Provider::ProductHunt));
        file.providers
            .hacker_news
            .apply(providers.get_mut(Provider::HackerNews));
        file.providers.github.apply(providers.get_mut(Provider::GitHub));

        let config = Self {
            enable_caching: file.enable_caching.unwrap_or(defaults.enable_caching),
            enable_rate_limiting: file
                .enable_rate_limiting
                .unwrap_or(defaults.enable_rate_limiting),
            fallback_enabled: file.fallback_enabled.unwrap_or(defaults.fallback_enabled),
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
            retry_delay_ms: file.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            request_timeout_ms: file.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
            cache_max_size: file.cache_max_size.unwrap_or(defaults.cache_max_size),
            sweep_interval_ms: file.sweep_interval_ms.unwrap_or(defaults.sweep_interval_ms),
            stale_ttl_ms: file.stale_ttl_ms.unwrap_or(defaults.stale_ttl_ms),
            providers,
            credentials: file.credentials,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads the config file from the XDG config directory
    ///
    /// Uses `~/.config/pulsegate/config.toml` on Linux. A missing file (or no
    /// home directory) yields the defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Location of the default config file, if a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "pulsegate")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Checks values that would make the layer misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_max_size == 0 {
            return Err(ConfigError::Invalid(
                "cache_max_size must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be positive".to_string(),
            ));
        }
        for provider in Provider::ALL {
            self.providers.get(provider).validate(provider)?;
        }
        Ok(())
    }

    /// Settings for one provider
    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        self.providers.get(provider)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn stale_ttl(&self) -> Duration {
        Duration::from_millis(self.stale_ttl_ms)
    }
}
