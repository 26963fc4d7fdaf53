use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound request budget towards the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleQuota {
    pub limit: u32,
    #[serde(rename = "window_seconds")]
    pub window_secs: u64,
}

impl Default for ThrottleQuota {
    fn default() -> Self {
        Self {
            limit: 10,
            window_secs: 1,
        }
    }
}

/// GCRA throttle in front of every upstream call.
///
/// Fails fast instead of queueing: a caller that finds no budget gets the wait
/// time back and the request surfaces as a throttled upstream failure.
#[derive(Clone)]
pub struct UpstreamThrottle {
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
}

impl UpstreamThrottle {
    pub fn new(quota: ThrottleQuota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(to_quota(quota))),
            clock: DefaultClock::default(),
        }
    }

    /// Takes one cell of budget, or returns how long until one frees up.
    pub fn acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl std::fmt::Debug for UpstreamThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamThrottle").finish_non_exhaustive()
    }
}

impl Default for UpstreamThrottle {
    fn default() -> Self {
        Self::new(ThrottleQuota::default())
    }
}

fn to_quota(quota: ThrottleQuota) -> Quota {
    let burst = NonZeroU32::new(quota.limit).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_secs(quota.window_secs.max(1));
    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_once_burst_is_spent() {
        let throttle = UpstreamThrottle::new(ThrottleQuota {
            limit: 2,
            window_secs: 60,
        });

        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_ok());

        let wait = throttle.acquire().expect_err("third call should be throttled");
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(30));
    }

    #[test]
    fn zero_limit_still_admits_one() {
        let throttle = UpstreamThrottle::new(ThrottleQuota {
            limit: 0,
            window_secs: 0,
        });
        assert!(throttle.acquire().is_ok());
    }
}
