//! Per-category, per-client sliding-window admission control.
//!
//! Every inbound request is mapped to a [`RateCategory`] and a client key (origin
//! address, connection id). The controller keeps the timestamps of admitted
//! requests inside the trailing window for each `(category, client)` pair and
//! admits a new request only while fewer than `limit` remain. Unlike a fixed
//! bucket there is no reset boundary at which a client can burst twice.
//!
//! Window state lives in a sharded map; the per-entry guard is held for the
//! prune + append of one admission, which totally orders decisions for a single
//! client key without serialising unrelated keys.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::{RateCategory, RateLimits, UtcDateTime};

/// Outcome of one admission attempt. Denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub category: RateCategory,
    pub limit: u32,
    /// Approvals still available in the current window.
    pub remaining: u32,
    /// When the oldest request in the window expires.
    pub reset_at: UtcDateTime,
    /// Set only on denial.
    pub retry_after: Option<Duration>,
}

impl Decision {
    /// Retry-after rounded up to whole seconds, as HTTP headers expect.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|wait| {
            let secs = wait.as_secs();
            if wait.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }
}

/// Read-only aggregate used for operational reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub tracked_keys: usize,
    pub active_requests_in_window: usize,
    pub limits: RateLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    category: RateCategory,
    client: String,
}

/// Sliding-window rate limiter shared by every front-end of one process.
#[derive(Debug)]
pub struct AdmissionController {
    limits: RateLimits,
    windows: DashMap<WindowKey, VecDeque<Instant>>,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}

impl AdmissionController {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: DashMap::new(),
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    pub fn admit(&self, category: RateCategory, client_key: &str) -> Decision {
        let rule = self.limits.get(category);
        let window = rule.window();
        let now = Instant::now();

        let mut stamps = self
            .windows
            .entry(WindowKey {
                category,
                client: client_key.to_owned(),
            })
            .or_default();
        prune(&mut stamps, now, window);

        let count = u32::try_from(stamps.len()).unwrap_or(u32::MAX);
        if count < rule.limit {
            stamps.push_back(now);
            let oldest = stamps.front().copied().unwrap_or(now);
            let reset_in = window.saturating_sub(now.saturating_duration_since(oldest));
            return Decision {
                allowed: true,
                category,
                limit: rule.limit,
                remaining: rule.limit - count - 1,
                reset_at: UtcDateTime::in_future(reset_in),
                retry_after: None,
            };
        }

        let oldest = stamps.front().copied().unwrap_or(now);
        drop(stamps);

        let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));
        tracing::warn!(
            client = client_key,
            %category,
            count,
            limit = rule.limit,
            retry_after_ms = retry_after.as_millis() as u64,
            "rate limit exceeded"
        );

        Decision {
            allowed: false,
            category,
            limit: rule.limit,
            remaining: 0,
            reset_at: UtcDateTime::in_future(retry_after),
            retry_after: Some(retry_after),
        }
    }

    pub fn snapshot(&self) -> AdmissionStats {
        let now = Instant::now();
        let active_requests_in_window = self
            .windows
            .iter()
            .map(|entry| {
                let window = self.limits.get(entry.key().category).window();
                entry
                    .value()
                    .iter()
                    .filter(|stamp| now.saturating_duration_since(**stamp) < window)
                    .count()
            })
            .sum();

        AdmissionStats {
            tracked_keys: self.windows.len(),
            active_requests_in_window,
            limits: self.limits.clone(),
        }
    }

    /// Drops keys whose windows are empty once pruned. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.windows.retain(|key, stamps| {
            prune(stamps, now, self.limits.get(key.category).window());
            let keep = !stamps.is_empty();
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.windows.len(), "swept idle rate-limit keys");
        }
        evicted
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = stamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}
