//! # NEPSE Core
//!
//! Shared gateway core for the NEPSE market-data facade.
//!
//! ## Overview
//!
//! Every protocol adapter (HTTP, socket, tool-calling) goes through the same
//! three components:
//!
//! - **Admission control**: per-category, per-client sliding-window rate limits
//! - **Validation**: symbol and index checks with fuzzy suggestions over a
//!   hot-swappable corpus
//! - **Response caching**: single-flight TTL cache in front of the exchange
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`admission`] | Sliding-window admission controller |
//! | [`cache`] | Single-flight response cache |
//! | [`config`] | Layered gateway configuration |
//! | [`corpus_source`] | Stock-map file and exchange corpus loaders |
//! | [`domain`] | Categories, symbols, indices, endpoints, timestamps |
//! | [`error`] | Core error types |
//! | [`gateway`] | Process-wide context tying the components together |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`retry`] | Backoff and retry policy for adapters |
//! | [`surface`] | Wire shapes for headers, error bodies and validation reports |
//! | [`throttling`] | Outbound upstream throttle |
//! | [`upstream`] | Upstream trait and exchange client |
//! | [`validator`] | Symbol/index validator and similarity ranking |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nepse_core::{
//!     ExchangeClient, Gateway, GatewayConfig, GatewayRequest, LogicalQuery, MarketEndpoint,
//!     ReqwestHttpClient, UpstreamThrottle,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::load(None)?;
//!     let upstream = ExchangeClient::new(
//!         config.upstream.base_url.clone(),
//!         config.upstream.timeout(),
//!         Arc::new(ReqwestHttpClient::new()),
//!         UpstreamThrottle::new(config.upstream.throttle),
//!     );
//!     let gateway = Gateway::new(config, Arc::new(upstream));
//!
//!     let query = LogicalQuery::new(MarketEndpoint::Summary);
//!     let response = gateway.handle(GatewayRequest::new("127.0.0.1", query)).await?;
//!     println!("{} (remaining {})", response.value, response.decision.remaining);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Adapters only see [`GatewayError`], which knows its own code, HTTP status and
//! retryability:
//!
//! ```rust
//! use nepse_core::{GatewayError, UpstreamError};
//!
//! let error = GatewayError::from(UpstreamError::not_found("no such scrip"));
//! assert_eq!(error.http_status(), 404);
//! assert!(!error.is_retryable());
//! ```

pub mod admission;
pub mod cache;
pub mod config;
pub mod corpus_source;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod retry;
pub mod surface;
pub mod throttling;
pub mod upstream;
pub mod validator;

// Re-export commonly used types at crate root for convenience

// Admission
pub use admission::{AdmissionController, AdmissionStats, Decision};

// Caching
pub use cache::{CacheLookup, Cached, ResponseCache};

// Configuration
pub use config::{CacheSettings, ConfigError, GatewayConfig, MaintenanceSettings, UpstreamSettings};

// Corpus loaders
pub use corpus_source::{parse_stock_map, CorpusLoader, ExchangeCorpusLoader, StockMapFile};

// Domain types
pub use domain::{
    find_index, index_for_sector, CategoryLimit, EndpointParam, IndexRecord, LogicalQuery,
    MarketEndpoint, RateCategory, RateLimits, Symbol, UtcDateTime, INDICES,
};

// Error types
pub use error::{
    CacheError, CoreError, CorpusError, CorpusRefreshError, GatewayError, UpstreamError,
    UpstreamErrorKind, ValidationError,
};

// Gateway
pub use gateway::{Gateway, GatewayRequest, GatewayResponse, Served};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Retry logic
pub use retry::{Backoff, RetryPolicy, RetrySettings, Transient};

// Wire shapes
pub use surface::{ErrorBody, RateLimitHeaders, ValidationReport};

// Throttling
pub use throttling::{ThrottleQuota, UpstreamThrottle};

// Upstream
pub use upstream::{ExchangeClient, Upstream};

// Validation
pub use validator::{
    CorpusSnapshot, RefreshReport, SymbolRecord, SymbolValidator, ValidationFailure, ValidatorStats,
};
