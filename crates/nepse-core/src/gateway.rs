//! # Gateway
//!
//! The process-wide context every protocol adapter shares: one admission
//! controller, one validator, one response cache and the upstream behind them.
//! Tests build a fresh one each.
//!
//! ## Request flow
//!
//! ```text
//! admit(category, client) ──denied──▶ AdmissionDenied
//!          │
//!          ▼
//! validate symbol / index ──miss──▶ ValidationFailed (+ suggestions)
//!          │
//!          ▼
//! cache.get_or_compute(key) ──miss──▶ upstream.fetch(query)  (retry policy wraps this)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::admission::{AdmissionController, AdmissionStats, Decision};
use crate::cache::{CacheLookup, ResponseCache};
use crate::config::GatewayConfig;
use crate::corpus_source::CorpusLoader;
use crate::retry::RetryPolicy;
use crate::upstream::Upstream;
use crate::validator::{RefreshReport, SymbolValidator};
use crate::{CorpusRefreshError, GatewayError, LogicalQuery, RateCategory};

/// One inbound request as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub category: RateCategory,
    pub client_key: String,
    pub query: LogicalQuery,
}

impl GatewayRequest {
    /// Request categorised the way the HTTP front-end would categorise it.
    pub fn new(client_key: impl Into<String>, query: LogicalQuery) -> Self {
        Self {
            category: query.endpoint.category(),
            client_key: client_key.into(),
            query,
        }
    }

    pub fn with_category(mut self, category: RateCategory) -> Self {
        self.category = category;
        self
    }
}

/// Upstream data for an admitted, validated query.
#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub value: Value,
    /// The query after symbol and index canonicalisation.
    pub query: LogicalQuery,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub value: Value,
    pub decision: Decision,
    pub cache_hit: bool,
}

pub struct Gateway {
    config: GatewayConfig,
    admission: AdmissionController,
    validator: SymbolValidator,
    cache: ResponseCache<Value>,
    upstream: Arc<dyn Upstream>,
    corpus_loader: Option<Arc<dyn CorpusLoader>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(config: GatewayConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            admission: AdmissionController::new(config.rate_limits.clone()),
            validator: SymbolValidator::new(),
            cache: ResponseCache::new(config.cache.grace_multiple),
            upstream,
            corpus_loader: None,
            retry: RetryPolicy::no_retry(),
            config,
        }
    }

    pub fn with_corpus_loader(mut self, loader: Arc<dyn CorpusLoader>) -> Self {
        self.corpus_loader = Some(loader);
        self
    }

    /// Retry policy applied around upstream work. Defaults to no retries.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_validator(mut self, validator: SymbolValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn validator(&self) -> &SymbolValidator {
        &self.validator
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn admit(&self, category: RateCategory, client_key: &str) -> Decision {
        self.admission.admit(category, client_key)
    }

    pub fn admission_stats(&self) -> AdmissionStats {
        self.admission.snapshot()
    }

    /// Admission, validation and cached upstream fetch in one call.
    pub async fn handle(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let decision = self.admit(request.category, &request.client_key);
        if !decision.allowed {
            return Err(GatewayError::AdmissionDenied {
                category: decision.category,
                retry_after_secs: decision.retry_after_secs().unwrap_or(1),
            });
        }

        let served = self.fetch(request.query).await?;
        Ok(GatewayResponse {
            value: served.value,
            decision,
            cache_hit: served.cache_hit,
        })
    }

    /// Validation and cached upstream fetch, for callers that already admitted
    /// the request.
    pub async fn fetch(&self, query: LogicalQuery) -> Result<Served, GatewayError> {
        let query = self.canonicalize(query)?;
        let cache_key = query.cache_key();
        let key = cache_key.as_str();
        let ttl = query
            .endpoint
            .ttl_override()
            .unwrap_or_else(|| self.config.cache.ttl());
        let deadline = self.config.cache.wait_deadline();

        let cached = self
            .retry
            .run(|| {
                let upstream = Arc::clone(&self.upstream);
                let upstream_query = query.clone();
                let compute = move || async move { upstream.fetch(&upstream_query).await };
                async move {
                    self.cache
                        .get_or_compute_with_deadline(key, ttl, deadline, compute)
                        .await
                        .map_err(GatewayError::from)
                }
            })
            .await?;

        Ok(Served {
            value: cached.value,
            query,
            cache_hit: cached.lookup == CacheLookup::Hit,
        })
    }

    fn canonicalize(&self, mut query: LogicalQuery) -> Result<LogicalQuery, GatewayError> {
        query.check_params()?;
        if let Some(symbol) = query.symbol.take() {
            query.symbol = Some(self.validator.validate_symbol(&symbol)?);
        }
        if let Some(index) = query.index.take() {
            query.index = Some(self.validator.validate_index(&index)?.to_owned());
        }
        Ok(query)
    }

    /// Reloads the corpus from the configured loader and publishes it.
    ///
    /// On failure the current snapshot stays live and in-flight requests are
    /// unaffected.
    pub async fn refresh_corpus(&self) -> Result<RefreshReport, CorpusRefreshError> {
        let Some(loader) = &self.corpus_loader else {
            return Err(CorpusRefreshError::Load(String::from(
                "no corpus loader configured",
            )));
        };

        let outcome = match loader.load_corpus().await {
            Ok(records) => self.validator.refresh(records).map_err(CorpusRefreshError::from),
            Err(error) => Err(error),
        };
        if let Err(error) = &outcome {
            tracing::warn!(%error, "corpus refresh failed; keeping previous snapshot");
        }
        outcome
    }

    /// Runs cache and admission sweeps plus periodic corpus refresh until
    /// `cancel` fires.
    pub fn spawn_maintenance(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move { gateway.run_maintenance(cancel).await })
    }

    async fn run_maintenance(&self, cancel: CancellationToken) {
        let mut cache_sweep = periodic(self.config.cache.sweep_interval());
        let mut admission_sweep = periodic(self.config.maintenance.admission_sweep());
        let mut corpus_refresh = self
            .corpus_loader
            .as_ref()
            .and(self.config.maintenance.corpus_refresh())
            .map(periodic);

        tracing::info!(
            corpus_refresh = corpus_refresh.is_some(),
            "gateway maintenance started"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("gateway maintenance stopped");
                    break;
                }
                _ = cache_sweep.tick() => {
                    self.cache.sweep();
                }
                _ = admission_sweep.tick() => {
                    self.admission.sweep();
                }
                () = tick(&mut corpus_refresh) => {
                    // Failures are logged inside; the old snapshot keeps serving.
                    let _ = self.refresh_corpus().await;
                }
            }
        }
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
