use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Classification of inbound requests sharing one rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
    Default,
    Validation,
    MarketData,
    Websocket,
    Mcp,
    Health,
}

/// Paths whose payloads are large and change every few seconds during trading.
const MARKET_DATA_PATHS: [&str; 5] = [
    "/Summary",
    "/LiveMarket",
    "/PriceVolume",
    "/TopGainers",
    "/TopLosers",
];

impl RateCategory {
    pub const ALL: [Self; 6] = [
        Self::Default,
        Self::Validation,
        Self::MarketData,
        Self::Websocket,
        Self::Mcp,
        Self::Health,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Validation => "validation",
            Self::MarketData => "market_data",
            Self::Websocket => "websocket",
            Self::Mcp => "mcp",
            Self::Health => "health",
        }
    }

    /// Map an HTTP path onto its category.
    pub fn for_path(path: &str) -> Self {
        if path == "/health" {
            Self::Health
        } else if path.starts_with("/validate") {
            Self::Validation
        } else if MARKET_DATA_PATHS.contains(&path) {
            Self::MarketData
        } else {
            Self::Default
        }
    }

    /// Suffix used by `NEPSE_RATE_<CATEGORY>` environment overrides.
    pub fn env_suffix(self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl Display for RateCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidCategory {
                value: value.to_owned(),
            })
    }
}

/// Requests allowed per trailing window for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimit {
    pub limit: u32,
    #[serde(rename = "window_seconds")]
    pub window_secs: u64,
}

impl CategoryLimit {
    pub const fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window_secs: 60,
        }
    }

    pub const fn window(self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Parse `LIMIT` or `LIMIT/WINDOW_SECS`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidRateLimit {
            value: value.to_owned(),
        };

        let (limit, window) = match value.trim().split_once('/') {
            Some((limit, window)) => (limit.trim(), Some(window.trim())),
            None => (value.trim(), None),
        };

        let limit: u32 = limit.parse().map_err(|_| invalid())?;
        let window_secs: u64 = match window {
            Some(window) => window.parse().map_err(|_| invalid())?,
            None => 60,
        };

        if limit == 0 || window_secs == 0 {
            return Err(invalid());
        }

        Ok(Self { limit, window_secs })
    }
}

/// Immutable category → limit table, fixed once the gateway starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    #[serde(flatten)]
    table: BTreeMap<RateCategory, CategoryLimit>,
}

impl Default for RateLimits {
    fn default() -> Self {
        let table = RateCategory::ALL
            .into_iter()
            .map(|category| (category, Self::default_for(category)))
            .collect();
        Self { table }
    }
}

impl RateLimits {
    pub const fn default_for(category: RateCategory) -> CategoryLimit {
        match category {
            RateCategory::Default => CategoryLimit::per_minute(60),
            RateCategory::Validation => CategoryLimit::per_minute(120),
            RateCategory::MarketData => CategoryLimit::per_minute(60),
            RateCategory::Websocket => CategoryLimit::per_minute(100),
            RateCategory::Mcp => CategoryLimit::per_minute(6),
            RateCategory::Health => CategoryLimit::per_minute(50),
        }
    }

    pub fn with_limit(mut self, category: RateCategory, limit: CategoryLimit) -> Self {
        self.table.insert(category, limit);
        self
    }

    pub fn get(&self, category: RateCategory) -> CategoryLimit {
        self.table
            .get(&category)
            .copied()
            .unwrap_or_else(|| Self::default_for(category))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RateCategory, CategoryLimit)> + '_ {
        RateCategory::ALL
            .into_iter()
            .map(|category| (category, self.get(category)))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (category, limit) in self.iter() {
            if limit.limit == 0 || limit.window_secs == 0 {
                return Err(ValidationError::InvalidConfig {
                    field: "rate_limits",
                    reason: format!("category '{category}' must have a non-zero limit and window"),
                });
            }
        }
        Ok(())
    }
}
