use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::ValidationFailure;

/// Syntax and configuration errors exposed by `nepse-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error(
        "invalid rate category '{value}', expected one of default, validation, market_data, websocket, mcp, health"
    )]
    InvalidCategory { value: String },
    #[error("invalid rate limit '{value}', expected LIMIT or LIMIT/WINDOW_SECS with non-zero values")]
    InvalidRateLimit { value: String },
    #[error("unknown market endpoint '{value}'")]
    UnknownEndpoint { value: String },
    #[error("endpoint '{endpoint}' requires a '{parameter}' parameter")]
    MissingParameter {
        endpoint: &'static str,
        parameter: &'static str,
    },

    #[error("configuration field '{field}' is invalid: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Reasons a corpus snapshot cannot be built from a record list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorpusError {
    #[error("corpus is empty")]
    Empty,
    #[error("record {position} has an invalid symbol: {source}")]
    InvalidSymbol {
        position: usize,
        #[source]
        source: ValidationError,
    },
    #[error("record {position} ({symbol}) has an empty company name")]
    EmptyCompanyName { position: usize, symbol: String },
    #[error("symbol {symbol} appears more than once")]
    DuplicateSymbol { symbol: String },
}

/// Failure class of an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// Network error, timeout or 5xx.
    Transient,
    NotFound,
    /// Refused by the exchange or by the local outbound throttle.
    Throttled,
    /// Response arrived but could not be decoded.
    InvalidResponse,
}

impl UpstreamErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::NotFound => "not_found",
            Self::Throttled => "throttled",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an [`crate::Upstream`] fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream {kind}: {message}")]
pub struct UpstreamError {
    kind: UpstreamErrorKind,
    message: String,
    retryable: bool,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(kind, UpstreamErrorKind::Transient | UpstreamErrorKind::Throttled),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Transient, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Throttled, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::InvalidResponse, message)
    }

    pub const fn kind(&self) -> UpstreamErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

/// Outcome of a cache lookup that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("gave up waiting for '{key}' after {waited:?}")]
    WaitTimedOut { key: String, waited: Duration },
    #[error("computation for '{key}' ended without a result")]
    ComputationAborted { key: String },
}

/// Corpus refresh failed; the previous snapshot stays live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorpusRefreshError {
    #[error("failed to load corpus: {0}")]
    Load(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Build(#[from] CorpusError),
}

/// Error returned to protocol adapters by [`crate::Gateway::handle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded for {category}; retry after {retry_after_secs}s")]
    AdmissionDenied {
        category: crate::RateCategory,
        retry_after_secs: u64,
    },
    #[error(transparent)]
    ValidationFailed(#[from] ValidationFailure),
    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),
    #[error(transparent)]
    UpstreamUnavailable(#[from] UpstreamError),
    #[error("timed out waiting for '{key}'")]
    WaitTimedOut { key: String },
}

impl GatewayError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AdmissionDenied { .. } => "rate_limited",
            Self::ValidationFailed(_) => "validation_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UpstreamUnavailable(error) => match error.kind() {
                UpstreamErrorKind::NotFound => "upstream_not_found",
                UpstreamErrorKind::Throttled => "upstream_throttled",
                UpstreamErrorKind::Transient | UpstreamErrorKind::InvalidResponse => {
                    "upstream_unavailable"
                }
            },
            Self::WaitTimedOut { .. } => "wait_timed_out",
        }
    }

    /// Whether the caller may try the same request again later.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::AdmissionDenied { .. } | Self::WaitTimedOut { .. } => true,
            Self::ValidationFailed(_) | Self::InvalidRequest(_) => false,
            Self::UpstreamUnavailable(error) => error.retryable(),
        }
    }

    pub const fn http_status(&self) -> u16 {
        match self {
            Self::AdmissionDenied { .. } => 429,
            Self::ValidationFailed(_) | Self::InvalidRequest(_) => 400,
            Self::UpstreamUnavailable(error) => match error.kind() {
                UpstreamErrorKind::NotFound => 404,
                UpstreamErrorKind::Throttled => 503,
                UpstreamErrorKind::Transient | UpstreamErrorKind::InvalidResponse => 502,
            },
            Self::WaitTimedOut { .. } => 504,
        }
    }

    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::AdmissionDenied {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<CacheError> for GatewayError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Upstream(upstream) => Self::UpstreamUnavailable(upstream),
            CacheError::WaitTimedOut { key, .. } => Self::WaitTimedOut { key },
            CacheError::ComputationAborted { key } => Self::UpstreamUnavailable(
                UpstreamError::transient(format!("computation for '{key}' was aborted")),
            ),
        }
    }
}

/// Top-level error type for core operations that touch files or JSON.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_throttled_upstream_errors_are_retryable() {
        assert!(UpstreamError::transient("reset").retryable());
        assert!(UpstreamError::throttled("busy").retryable());
        assert!(!UpstreamError::not_found("gone").retryable());
        assert!(!UpstreamError::invalid_response("html").retryable());
    }

    #[test]
    fn gateway_errors_map_to_http_statuses() {
        let missing = GatewayError::from(UpstreamError::not_found("no such company"));
        assert_eq!(missing.http_status(), 404);
        assert_eq!(missing.code(), "upstream_not_found");

        let denied = GatewayError::AdmissionDenied {
            category: crate::RateCategory::Mcp,
            retry_after_secs: 7,
        };
        assert_eq!(denied.http_status(), 429);
        assert_eq!(denied.retry_after_secs(), Some(7));
        assert!(denied.is_retryable());
    }

    #[test]
    fn aborted_computation_surfaces_as_transient_upstream_failure() {
        let error = GatewayError::from(CacheError::ComputationAborted {
            key: String::from("/Summary"),
        });
        assert_eq!(error.code(), "upstream_unavailable");
        assert!(error.is_retryable());
    }
}
