use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, CLEANUP_THRESHOLD_BYTES, MAX_CACHE_SIZE_BYTES, STARTUP_CLEANUP_DELAY};
use crate::sources::gateway::DEFAULT_BASE_URL;
use crate::sources::Quality;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Gateway
    pub api_base_url: String,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    pub default_search_limit: u32,
    pub default_quality: Quality,

    // Paths
    pub data_dir: PathBuf,

    // Caché
    pub max_cache_size_bytes: usize,
    pub cleanup_threshold_bytes: usize,
    #[serde(with = "duration_str")]
    pub startup_cleanup_delay: Duration,
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} inválido ({:?}): {}", name, val, e)),
        _ => Ok(default),
    }
}

fn env_duration(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => {
            humantime::parse_duration(val.trim()).with_context(|| format!("{} inválido: {:?}", name, val))
        }
        _ => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Gateway
            api_base_url: env_or("API_BASE_URL", defaults.api_base_url)?,
            request_timeout: env_duration("REQUEST_TIMEOUT", defaults.request_timeout)?,
            default_search_limit: env_or("DEFAULT_SEARCH_LIMIT", defaults.default_search_limit)?,
            default_quality: env_or("DEFAULT_QUALITY", defaults.default_quality)?,

            // Paths
            data_dir: env_or("DATA_DIR", defaults.data_dir)?,

            // Caché
            max_cache_size_bytes: env_or("MAX_CACHE_SIZE_BYTES", defaults.max_cache_size_bytes)?,
            cleanup_threshold_bytes: env_or("CLEANUP_THRESHOLD_BYTES", defaults.cleanup_threshold_bytes)?,
            startup_cleanup_delay: env_duration("STARTUP_CLEANUP_DELAY", defaults.startup_cleanup_delay)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Cache ceiling and cleanup threshold must be non-zero, threshold
    ///   strictly below the ceiling
    /// - Search limit must be > 0
    /// - The gateway base URL must parse
    pub fn validate(&self) -> Result<()> {
        if self.max_cache_size_bytes == 0 {
            anyhow::bail!("Max cache size must be greater than 0");
        }

        if self.cleanup_threshold_bytes == 0 {
            anyhow::bail!("Cleanup threshold must be greater than 0");
        }

        if self.cleanup_threshold_bytes >= self.max_cache_size_bytes {
            anyhow::bail!(
                "Cleanup threshold ({} bytes) must be below the max cache size ({} bytes)",
                self.cleanup_threshold_bytes,
                self.max_cache_size_bytes
            );
        }

        if self.default_search_limit == 0 {
            anyhow::bail!("Default search limit must be greater than 0");
        }

        url::Url::parse(&self.api_base_url)
            .with_context(|| format!("API base URL is not a valid URL: {}", self.api_base_url))?;

        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size_bytes: self.max_cache_size_bytes,
            cleanup_threshold_bytes: self.cleanup_threshold_bytes,
            startup_cleanup_delay: self.startup_cleanup_delay,
        }
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Gateway: {} (timeout {}, limit {}, quality {})\n  \
            Data: {}\n  \
            Cache: {:.1}MB max, cleanup to {:.1}MB, startup sweep after {}",
            self.api_base_url,
            humantime::format_duration(self.request_timeout),
            self.default_search_limit,
            self.default_quality.as_str(),
            self.data_dir.display(),
            self.max_cache_size_bytes as f64 / (1024.0 * 1024.0),
            self.cleanup_threshold_bytes as f64 / (1024.0 * 1024.0),
            humantime::format_duration(self.startup_cleanup_delay),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            default_search_limit: 20,
            default_quality: Quality::High,

            data_dir: "./data".into(),

            max_cache_size_bytes: MAX_CACHE_SIZE_BYTES,
            cleanup_threshold_bytes: CLEANUP_THRESHOLD_BYTES,
            startup_cleanup_delay: STARTUP_CLEANUP_DELAY,
        }
    }
}

/// Serialises durations as humantime strings (`"5s"`, `"1h 30m"`).
mod duration_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
