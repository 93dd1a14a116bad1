use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::CacheConfig;
use crate::model::Principal;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory on this platform")]
    NoConfigDir,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config format error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub service: ServiceConfig,
    pub query: QueryConfig,
    pub mutation: MutationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Identity used when signing in from this machine.
    pub principal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub stale_time_secs: u64,
    pub cache_time_secs: u64,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Periodic refetch of watched queries; off unless set.
    pub refetch_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub retry_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4943/api/".to_owned(),
            principal: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: 5 * 60,
            cache_time_secs: 10 * 60,
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            refetch_interval_secs: None,
        }
    }
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self { retry_attempts: 2 }
    }
}

impl QueryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            timeout: self.request_timeout(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            stale_time: Duration::from_secs(self.stale_time_secs),
            cache_time: Duration::from_secs(self.cache_time_secs),
            retry: self.retry_policy(),
        }
    }

    pub fn refetch_interval(&self) -> Option<Duration> {
        self.refetch_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl ClientConfig {
    /// Writes share the query backoff curve but have their own attempt budget.
    pub fn mutation_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.mutation.retry_attempts,
            ..self.query.retry_policy()
        }
    }

    pub fn principal(&self) -> Option<Principal> {
        self.service
            .principal
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Principal::new)
    }

    /// `<config dir>/ballotlife`
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("ballotlife"))
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads the user config, falling back to defaults when it is missing or unreadable.
    pub fn load() -> Self {
        let loaded = Self::config_file_path().and_then(|path| {
            if path.exists() {
                Self::from_file(&path)
            } else {
                Ok(Self::default())
            }
        });
        match loaded {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_file_path()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "query": { "stale_time_secs": 10 } }"#).unwrap();
        assert_eq!(config.query.stale_time_secs, 10);
        assert_eq!(config.query.retry_attempts, 3);
        assert_eq!(config.mutation.retry_attempts, 2);
        assert_eq!(config.query.cache_config().stale_time, Duration::from_secs(10));
    }

    #[test]
    fn mutation_policy_keeps_query_backoff() {
        let config = ClientConfig::default();
        let policy = config.mutation_retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = ClientConfig::default();
        config.service.principal = Some("  alice ".into());
        config.save_to(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded.principal(), Some(Principal::new("alice")));
        assert_eq!(loaded.query.refetch_interval(), None);
    }
}
