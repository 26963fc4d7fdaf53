//! Gateway configuration.
//!
//! Layered in order: compiled defaults, an optional JSON file, then environment
//! overrides. The result is validated once and is immutable afterwards.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `NEPSE_UPSTREAM_URL` | Exchange facade base URL |
//! | `NEPSE_RATE_<CATEGORY>` | `LIMIT` or `LIMIT/WINDOW_SECS` for one category |
//! | `NEPSE_CACHE_TTL_SECS` | Default market-data TTL |
//! | `NEPSE_CORPUS_REFRESH_SECS` | Corpus refresh interval |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetrySettings;
use crate::throttling::ThrottleQuota;
use crate::{CategoryLimit, RateCategory, RateLimits, ValidationError};

pub const ENV_UPSTREAM_URL: &str = "NEPSE_UPSTREAM_URL";
pub const ENV_RATE_PREFIX: &str = "NEPSE_RATE_";
pub const ENV_CACHE_TTL_SECS: &str = "NEPSE_CACHE_TTL_SECS";
pub const ENV_CORPUS_REFRESH_SECS: &str = "NEPSE_CORPUS_REFRESH_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("environment variable {key}: {source}")]
    Env {
        key: String,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub throttle: ThrottleQuota,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:8000"),
            timeout_secs: 10,
            throttle: ThrottleQuota::default(),
        }
    }
}

impl UpstreamSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Market-data TTL; reference lists carry their own.
    pub ttl_secs: u64,
    pub grace_multiple: u32,
    pub sweep_interval_secs: u64,
    /// How long one caller waits on a computation before giving up.
    pub wait_deadline_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            grace_multiple: crate::cache::DEFAULT_GRACE_MULTIPLE,
            sweep_interval_secs: 60,
            wait_deadline_secs: 15,
        }
    }
}

impl CacheSettings {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub const fn wait_deadline(&self) -> Duration {
        Duration::from_secs(self.wait_deadline_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub admission_sweep_secs: u64,
    /// Zero disables periodic corpus refresh.
    pub corpus_refresh_secs: u64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            admission_sweep_secs: 300,
            corpus_refresh_secs: 86_400,
        }
    }
}

impl MaintenanceSettings {
    pub const fn admission_sweep(&self) -> Duration {
        Duration::from_secs(self.admission_sweep_secs)
    }

    pub fn corpus_refresh(&self) -> Option<Duration> {
        (self.corpus_refresh_secs > 0).then(|| Duration::from_secs(self.corpus_refresh_secs))
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub rate_limits: RateLimits,
    pub cache: CacheSettings,
    pub maintenance: MaintenanceSettings,
    pub upstream: UpstreamSettings,
    pub retry: RetrySettings,
}

impl GatewayConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `NEPSE_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_UPSTREAM_URL).filter(|url| !url.trim().is_empty()) {
            self.upstream.base_url = url.trim().to_owned();
        }

        for category in RateCategory::ALL {
            let key = format!("{ENV_RATE_PREFIX}{}", category.env_suffix());
            if let Some(value) = lookup(&key) {
                let limit = CategoryLimit::parse(&value)
                    .map_err(|source| ConfigError::Env { key: key.clone(), source })?;
                self.rate_limits = self.rate_limits.with_limit(category, limit);
            }
        }

        if let Some(ttl) = parse_secs(&lookup, ENV_CACHE_TTL_SECS)? {
            self.cache.ttl_secs = ttl;
        }
        if let Some(interval) = parse_secs(&lookup, ENV_CORPUS_REFRESH_SECS)? {
            self.maintenance.corpus_refresh_secs = interval;
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.rate_limits.validate()?;

        let invalid = |field, reason: &str| ValidationError::InvalidConfig {
            field,
            reason: reason.to_owned(),
        };
        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be greater than zero"));
        }
        if self.cache.wait_deadline_secs == 0 {
            return Err(invalid("cache.wait_deadline_secs", "must be greater than zero"));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(invalid("cache.sweep_interval_secs", "must be greater than zero"));
        }
        if self.maintenance.admission_sweep_secs == 0 {
            return Err(invalid(
                "maintenance.admission_sweep_secs",
                "must be greater than zero",
            ));
        }
        let url = self.upstream.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("upstream.base_url", "must be an http(s) URL"));
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| ConfigError::Env {
                key: key.to_owned(),
                source: ValidationError::InvalidConfig {
                    field: "environment",
                    reason: format!("expected whole seconds, got '{raw}'"),
                },
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_published_table() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limits.get(RateCategory::Mcp), CategoryLimit::per_minute(6));
        assert_eq!(config.cache.ttl(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults_elsewhere() {
        let config = GatewayConfig::from_json(
            r#"{"rate_limits": {"health": {"limit": 5, "window_seconds": 10}}, "cache": {"ttl_secs": 5}}"#,
        )
        .expect("valid json");

        assert_eq!(
            config.rate_limits.get(RateCategory::Health),
            CategoryLimit {
                limit: 5,
                window_secs: 10
            }
        );
        assert_eq!(config.rate_limits.get(RateCategory::Validation).limit, 120);
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.grace_multiple, 2);
    }

    #[test]
    fn environment_overrides_win() {
        let config = GatewayConfig::default()
            .with_env_overrides(env(&[
                ("NEPSE_UPSTREAM_URL", "https://exchange.test"),
                ("NEPSE_RATE_MARKET_DATA", "30/10"),
                ("NEPSE_CORPUS_REFRESH_SECS", "0"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.upstream.base_url, "https://exchange.test");
        assert_eq!(
            config.rate_limits.get(RateCategory::MarketData),
            CategoryLimit {
                limit: 30,
                window_secs: 10
            }
        );
        assert_eq!(config.maintenance.corpus_refresh(), None);
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let error = GatewayConfig::default()
            .with_env_overrides(env(&[("NEPSE_RATE_MCP", "lots")]))
            .expect_err("must fail");
        assert!(error.to_string().contains("NEPSE_RATE_MCP"));
    }

    #[test]
    fn rejects_non_http_upstream() {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = String::from("ftp://exchange");
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig {
                field: "upstream.base_url",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_wait_deadline() {
        let mut config = GatewayConfig::default();
        config.cache.wait_deadline_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig {
                field: "cache.wait_deadline_secs",
                ..
            })
        ));
    }
}
