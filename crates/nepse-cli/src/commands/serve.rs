//! HTTP front-end over the shared gateway.
//!
//! # Endpoints
//!
//! - `GET /health` - liveness plus corpus generation
//! - `GET /rate-limit/stats` - admission controller view
//! - `GET /validate/stock/:symbol` - symbol check (404 with suggestions on a miss)
//! - `GET /validate/index/:index` - index check
//! - `GET /validation/stats` - corpus summary
//! - `GET /:endpoint?symbol=&index=` - exchange data through the cache
//!
//! Every route passes the admission middleware first, which attaches the
//! `X-RateLimit-*` headers and answers 429 on denial.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Path as RoutePath, Query, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nepse_core::{
    CorpusLoader, ErrorBody, ExchangeCorpusLoader, Gateway, GatewayConfig, GatewayError,
    LogicalQuery, MarketEndpoint, RateCategory, RateLimitHeaders, RetryPolicy, StockMapFile,
    Upstream, ValidationReport,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cli::ServeArgs;
use crate::error::CliError;

use super::CommandResult;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REQUEST_ID: &str = "x-request-id";
const CACHE_STATUS: &str = "x-cache";

pub struct AppState {
    gateway: Arc<Gateway>,
    started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            started_at: Instant::now(),
        }
    }
}

pub async fn run(
    args: &ServeArgs,
    config: GatewayConfig,
    stock_map: &Path,
) -> Result<CommandResult, CliError> {
    let upstream: Arc<dyn Upstream> = Arc::new(super::exchange_client(&config));
    let loader: Arc<dyn CorpusLoader> = if args.corpus_from_exchange {
        Arc::new(ExchangeCorpusLoader::new(Arc::clone(&upstream)))
    } else {
        Arc::new(StockMapFile::new(stock_map))
    };
    let retry = RetryPolicy::from(config.retry);
    let gateway = Arc::new(
        Gateway::new(config, upstream)
            .with_corpus_loader(loader)
            .with_retry_policy(retry),
    );

    let mut result = CommandResult::ok(json!({}));
    if let Err(error) = gateway.refresh_corpus().await {
        result = result.with_warning(format!("started without a symbol corpus: {error}"));
    }

    let cancel = CancellationToken::new();
    let maintenance = gateway.spawn_maintenance(cancel.clone());
    let state = Arc::new(AppState::new(Arc::clone(&gateway)));
    let app = router(Arc::clone(&state));

    let listener = TcpListener::bind(args.listen)
        .await
        .map_err(|error| CliError::Server(format!("cannot bind {}: {error}", args.listen)))?;
    tracing::info!(addr = %args.listen, "gateway listening");

    tokio::spawn(shutdown_on_ctrl_c(cancel.clone()));
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .map_err(|error| CliError::Server(error.to_string()))?;

    cancel.cancel();
    if let Err(error) = maintenance.await {
        tracing::warn!(%error, "maintenance task ended abnormally");
    }
    tracing::info!("gateway stopped");

    result.data = json!({
        "status": "stopped",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "admission": gateway.admission_stats(),
    });
    Ok(result)
}

async fn shutdown_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("shutdown requested");
            cancel.cancel();
        }
        Err(error) => tracing::warn!(%error, "cannot listen for ctrl-c; stop the process to exit"),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rate-limit/stats", get(rate_limit_stats))
        .route("/validate/stock/:symbol", get(validate_stock))
        .route("/validate/index/:index", get(validate_index))
        .route("/validation/stats", get(validation_stats))
        .route("/:endpoint", get(market_data))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), admission))
        .with_state(state)
}

// =============================================================================
// Admission Middleware
// =============================================================================

async fn admission(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let category = RateCategory::for_path(request.uri().path());
    let client = client_key(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());
    let request_id = Uuid::new_v4().to_string();

    let decision = state.gateway.admit(category, &client);
    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        let error = GatewayError::AdmissionDenied {
            category,
            retry_after_secs: decision.retry_after_secs().unwrap_or(1),
        };
        error_response(&error)
    };

    let headers = response.headers_mut();
    for (name, value) in RateLimitHeaders::from(&decision).pairs() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID), value);
    }
    tracing::debug!(
        request_id = %request_id,
        client = %client,
        %category,
        status = response.status().as_u16(),
        "request handled"
    );
    response
}

/// First `X-Forwarded-For` entry, else the peer address.
fn client_key(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| String::from("unknown"))
}

fn error_response(error: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from(error))).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let corpus = state.gateway.validator().snapshot();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "corpus": {
            "generation": corpus.generation(),
            "total_symbols": corpus.len(),
        },
        "cached_entries": state.gateway.cache().len(),
    }))
}

async fn rate_limit_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.gateway.admission_stats())
}

async fn validation_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.gateway.validator().stats())
}

async fn validate_stock(
    State(state): State<Arc<AppState>>,
    RoutePath(symbol): RoutePath<String>,
) -> Response {
    let outcome = state.gateway.validator().validate_symbol(&symbol);
    report_response(ValidationReport::from_outcome(&symbol, outcome))
}

async fn validate_index(
    State(state): State<Arc<AppState>>,
    RoutePath(index): RoutePath<String>,
) -> Response {
    let outcome = state.gateway.validator().validate_index(&index);
    report_response(ValidationReport::from_outcome(&index, outcome))
}

fn report_response(report: ValidationReport) -> Response {
    let status = if report.is_valid {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(report)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct MarketParams {
    symbol: Option<String>,
    index: Option<String>,
}

async fn market_data(
    State(state): State<Arc<AppState>>,
    RoutePath(endpoint): RoutePath<String>,
    Query(params): Query<MarketParams>,
) -> Response {
    let endpoint = match endpoint.parse::<MarketEndpoint>() {
        Ok(endpoint) => endpoint,
        Err(error) => {
            let body = ErrorBody::from(&GatewayError::from(error));
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }
    };

    let mut query = LogicalQuery::new(endpoint);
    query.symbol = params.symbol;
    query.index = params.index;

    match state.gateway.fetch(query).await {
        Ok(served) => {
            let cache_status = if served.cache_hit { "HIT" } else { "MISS" };
            let mut response = Json(served.value).into_response();
            response.headers_mut().insert(
                HeaderName::from_static(CACHE_STATUS),
                HeaderValue::from_static(cache_status),
            );
            response
        }
        Err(error) => error_response(&error),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nepse_core::upstream::UpstreamFuture;
    use nepse_core::{CategoryLimit, RateLimits, SymbolRecord, SymbolValidator};
    use serde_json::Value;

    use super::*;

    #[derive(Default)]
    struct EchoUpstream {
        calls: AtomicUsize,
    }

    impl Upstream for EchoUpstream {
        fn fetch<'a>(&'a self, query: &'a LogicalQuery) -> UpstreamFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "source": query.cache_key() }))
            })
        }
    }

    /// Serves the router on an ephemeral port and returns its base URL.
    async fn spawn_app(config: GatewayConfig, upstream: Arc<EchoUpstream>) -> String {
        let validator = SymbolValidator::with_records(vec![SymbolRecord::new(
            "NABIL",
            "Nabil Bank Limited",
            "Commercial Banks",
            "Equity",
        )])
        .expect("valid corpus");
        let gateway = Gateway::new(config, upstream).with_validator(validator);
        let app = router(Arc::new(AppState::new(Arc::new(gateway))));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .expect("server runs");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn misspelled_symbol_is_404_with_suggestions() {
        let base = spawn_app(GatewayConfig::default(), Arc::default()).await;

        let response = reqwest::get(format!("{base}/validate/stock/NABIL123"))
            .await
            .expect("request sent");

        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(
            response.headers()["x-ratelimit-category"].to_str().ok(),
            Some("validation")
        );
        let body: Value = response.json().await.expect("json body");
        assert_eq!(body["is_valid"], false);
        assert_eq!(body["suggestions"][0], "NABIL");
    }

    #[tokio::test]
    async fn market_data_is_cached_per_canonical_query() {
        let upstream = Arc::new(EchoUpstream::default());
        let base = spawn_app(GatewayConfig::default(), Arc::clone(&upstream)).await;
        let client = reqwest::Client::new();

        let first = client
            .get(format!("{base}/CompanyDetails?symbol=nabil"))
            .send()
            .await
            .expect("request sent");
        let second = client
            .get(format!("{base}/companydetails?symbol=NABIL"))
            .send()
            .await
            .expect("request sent");

        assert_eq!(first.headers()["x-cache"], "MISS");
        assert_eq!(second.headers()["x-cache"], "HIT");
        let body: Value = second.json().await.expect("json body");
        assert_eq!(body["source"], "/CompanyDetails?symbol=NABIL");
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_data_requests_map_to_client_errors() {
        let base = spawn_app(GatewayConfig::default(), Arc::default()).await;
        let client = reqwest::Client::new();

        let unknown_symbol = client
            .get(format!("{base}/CompanyDetails?symbol=NOPE"))
            .send()
            .await
            .expect("request sent");
        let unknown_route = client
            .get(format!("{base}/NoSuchThing"))
            .send()
            .await
            .expect("request sent");

        assert_eq!(unknown_symbol.status().as_u16(), 400);
        assert_eq!(unknown_route.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn forwarded_clients_are_limited_separately() {
        let config = GatewayConfig {
            rate_limits: RateLimits::default()
                .with_limit(RateCategory::Health, CategoryLimit { limit: 1, window_secs: 60 }),
            ..GatewayConfig::default()
        };
        let base = spawn_app(config, Arc::default()).await;
        let client = reqwest::Client::new();
        let health = |forwarded: &'static str| {
            client
                .get(format!("{base}/health"))
                .header("x-forwarded-for", forwarded)
                .send()
        };

        let first = health("203.0.113.7, 10.0.0.1").await.expect("request sent");
        let second = health("203.0.113.7").await.expect("request sent");
        let other = health("198.51.100.2").await.expect("request sent");

        assert_eq!(first.status().as_u16(), 200);
        assert_eq!(second.status().as_u16(), 429);
        assert_eq!(second.headers()["retry-after"], "60");
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");
        let body: Value = second.json().await.expect("json body");
        assert_eq!(body["code"], "rate_limited");
        assert_eq!(other.status().as_u16(), 200);
    }

    #[test]
    fn client_key_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 5000)));
        assert_eq!(client_key(&headers, Some(&peer)), "192.0.2.1");

        headers.insert(FORWARDED_FOR, HeaderValue::from_static(" 203.0.113.9 ,10.0.0.1"));
        assert_eq!(client_key(&headers, Some(&peer)), "203.0.113.9");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }
}
