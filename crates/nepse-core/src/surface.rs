//! Wire shapes adapters put on the outside of the core's outcomes.

use serde::{Deserialize, Serialize};

use crate::admission::Decision;
use crate::validator::ValidationFailure;
use crate::GatewayError;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_CATEGORY: &str = "x-ratelimit-category";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Rate-limit headers for one admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the oldest in-window request expires.
    pub reset: i64,
    pub category: &'static str,
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// `(name, value)` pairs, `retry-after` last and only on denial.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset.to_string()),
            (HEADER_CATEGORY, self.category.to_owned()),
        ];
        if let Some(retry_after) = self.retry_after {
            pairs.push((HEADER_RETRY_AFTER, retry_after.to_string()));
        }
        pairs
    }
}

impl From<&Decision> for RateLimitHeaders {
    fn from(decision: &Decision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset_at.unix_timestamp(),
            category: decision.category.as_str(),
            retry_after: decision.retry_after_secs(),
        }
    }
}

/// JSON error object for socket and tool-calling adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: bool,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(error: &GatewayError) -> Self {
        let suggestions = match error {
            GatewayError::ValidationFailed(failure) => Some(failure.suggestions.clone()),
            _ => None,
        };
        Self {
            error: true,
            code: error.code().to_owned(),
            message: error.to_string(),
            retry_after_secs: error.retry_after_secs(),
            suggestions,
        }
    }
}

/// Outcome of a symbol or index check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub input: String,
    pub is_valid: bool,
    /// Canonical form when valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationReport {
    pub fn from_outcome<T: Into<String>>(input: &str, outcome: Result<T, ValidationFailure>) -> Self {
        match outcome {
            Ok(canonical) => Self {
                input: input.to_owned(),
                is_valid: true,
                canonical: Some(canonical.into()),
                suggestions: Vec::new(),
                message: None,
            },
            Err(failure) => Self {
                input: input.to_owned(),
                is_valid: false,
                canonical: None,
                suggestions: failure.suggestions,
                message: Some(failure.message),
            },
        }
    }
}
