//! Upstream exchange client.
//!
//! [`Upstream`] is the seam the gateway calls on a cache miss. [`ExchangeClient`]
//! is the production implementation: one GET per logical query against the
//! exchange facade, passed through the outbound [`UpstreamThrottle`] first.
//!
//! | Transport outcome | [`UpstreamErrorKind`] |
//! |-------------------|-----------------------|
//! | connect error, timeout, 5xx, other non-2xx | `Transient` |
//! | 404 | `NotFound` |
//! | 429, local throttle exhausted | `Throttled` |
//! | 2xx with a body that is not JSON | `InvalidResponse` |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::throttling::UpstreamThrottle;
use crate::{LogicalQuery, UpstreamError, UpstreamErrorKind};

pub type UpstreamFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, UpstreamError>> + Send + 'a>>;

/// Fetches the raw JSON answer to one logical query.
pub trait Upstream: Send + Sync {
    fn fetch<'a>(&'a self, query: &'a LogicalQuery) -> UpstreamFuture<'a>;
}

impl<T: Upstream + ?Sized> Upstream for Arc<T> {
    fn fetch<'a>(&'a self, query: &'a LogicalQuery) -> UpstreamFuture<'a> {
        (**self).fetch(query)
    }
}

/// HTTP client for the exchange facade.
pub struct ExchangeClient {
    base_url: String,
    timeout: Duration,
    http: Arc<dyn HttpClient>,
    throttle: UpstreamThrottle,
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExchangeClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        http: Arc<dyn HttpClient>,
        throttle: UpstreamThrottle,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            base_url,
            timeout,
            http,
            throttle,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for `query`.
    pub fn url_for(&self, query: &LogicalQuery) -> Result<String, UpstreamError> {
        let path = query
            .upstream_path()
            .map_err(|error| UpstreamError::not_found(error.to_string()))?;

        let mut url = format!("{}{}", self.base_url, path);
        let mut separator = '?';
        for (name, value) in query.upstream_params() {
            url.push(separator);
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
            separator = '&';
        }
        Ok(url)
    }

    async fn fetch_json(&self, query: &LogicalQuery) -> Result<Value, UpstreamError> {
        if let Err(wait) = self.throttle.acquire() {
            return Err(UpstreamError::throttled(format!(
                "outbound budget exhausted; next slot in {}ms",
                wait.as_millis()
            )));
        }

        let url = self.url_for(query)?;
        let request = HttpRequest::get(&url)
            .with_header("accept", "application/json")
            .with_timeout(self.timeout);

        tracing::debug!(%url, "fetching from upstream");
        let response = self.http.execute(request).await.map_err(|error| {
            if error.timed_out() {
                UpstreamError::transient(format!("timed out fetching {url}: {error}"))
            } else {
                UpstreamError::transient(error.to_string())
            }
        })?;

        decode(&url, response)
    }
}

impl Upstream for ExchangeClient {
    fn fetch<'a>(&'a self, query: &'a LogicalQuery) -> UpstreamFuture<'a> {
        Box::pin(self.fetch_json(query))
    }
}

fn decode(url: &str, response: HttpResponse) -> Result<Value, UpstreamError> {
    if !response.is_success() {
        let kind = match response.status {
            404 => UpstreamErrorKind::NotFound,
            429 => UpstreamErrorKind::Throttled,
            _ => UpstreamErrorKind::Transient,
        };
        return Err(UpstreamError::new(
            kind,
            format!("{url} returned status {}", response.status),
        ));
    }

    serde_json::from_str(&response.body).map_err(|error| {
        UpstreamError::invalid_response(format!("{url} returned malformed JSON: {error}"))
    })
}
