//! Single-flight TTL cache for upstream responses.
//!
//! Each key holds either a stored value with its computation time and TTL, or a
//! marker for a computation in progress. The first caller to find a key missing
//! or expired installs the marker and spawns the computation on its own task;
//! every caller (that one included) then waits on a `watch` channel for the
//! outcome. No map guard is held across an `.await`.
//!
//! Failures are handed to every waiter and then forgotten; the next call starts a
//! fresh computation. Retrying is left to the caller.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{CacheError, UpstreamError};

/// Default multiple of an entry's TTL it may linger for before a sweep drops it.
pub const DEFAULT_GRACE_MULTIPLE: u32 = 2;

type Outcome<V> = Option<Result<V, UpstreamError>>;

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// Served from a fresh stored entry.
    Hit,
    /// Computed by this call or awaited from a computation already running.
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<V> {
    pub value: V,
    pub lookup: CacheLookup,
}

enum Slot<V> {
    Valid {
        value: V,
        computed_at: Instant,
        ttl: Duration,
    },
    Computing {
        id: u64,
        done: watch::Receiver<Outcome<V>>,
    },
}

impl<V> Slot<V> {
    fn is_computing(&self, expected: u64) -> bool {
        matches!(self, Self::Computing { id, .. } if *id == expected)
    }
}

type Slots<V> = Arc<DashMap<String, Slot<V>>>;

/// Keyed response cache with at most one computation in flight per key.
pub struct ResponseCache<V> {
    slots: Slots<V>,
    next_id: AtomicU64,
    grace_multiple: u32,
}

impl<V> std::fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.slots.len())
            .field("grace_multiple", &self.grace_multiple)
            .finish()
    }
}

impl<V> Default for ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_MULTIPLE)
    }
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(grace_multiple: u32) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            grace_multiple: grace_multiple.max(1),
        }
    }

    /// Returns the fresh value for `key`, computing it at most once across all
    /// concurrent callers when it is missing or older than `ttl`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Cached<V>, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        match self.claim(key, ttl, compute) {
            Claim::Hit(value) => Ok(Cached {
                value,
                lookup: CacheLookup::Hit,
            }),
            Claim::Wait { id, done } => self.wait(key, id, done).await,
        }
    }

    /// Like [`Self::get_or_compute`], but this caller stops waiting after
    /// `deadline`. The computation keeps running and still fills the slot.
    pub async fn get_or_compute_with_deadline<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        deadline: Duration,
        compute: F,
    ) -> Result<Cached<V>, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        match self.claim(key, ttl, compute) {
            Claim::Hit(value) => Ok(Cached {
                value,
                lookup: CacheLookup::Hit,
            }),
            Claim::Wait { id, done } => {
                match tokio::time::timeout(deadline, self.wait(key, id, done)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::debug!(key, waited_ms = deadline.as_millis() as u64, "cache waiter gave up");
                        Err(CacheError::WaitTimedOut {
                            key: key.to_owned(),
                            waited: deadline,
                        })
                    }
                }
            }
        }
    }

    /// Fresh stored value, without computing anything.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.slots.get(key).and_then(|slot| match slot.value() {
            Slot::Valid {
                value,
                computed_at,
                ttl,
            } if now.saturating_duration_since(*computed_at) <= *ttl => Some(value.clone()),
            _ => None,
        })
    }

    /// Drops stored values older than `grace_multiple × ttl`. Computations in
    /// progress are never touched. Returns how many entries went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let grace = self.grace_multiple;
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            Slot::Valid {
                computed_at, ttl, ..
            } => now.saturating_duration_since(*computed_at) <= ttl.saturating_mul(grace),
            Slot::Computing { .. } => true,
        });

        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.slots.len(), "swept expired cache entries");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Forgets `key`. A computation already running still answers its waiters
    /// but no longer stores its result.
    pub fn invalidate(&self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    fn claim<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Claim<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        let now = Instant::now();
        let mut leader = None;

        let claim = match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                Slot::Valid {
                    value,
                    computed_at,
                    ttl: stored_ttl,
                } if now.saturating_duration_since(*computed_at) <= *stored_ttl => {
                    Claim::Hit(value.clone())
                }
                Slot::Computing { id, done } => Claim::Wait {
                    id: *id,
                    done: done.clone(),
                },
                Slot::Valid { .. } => {
                    let (slot, claim, sender) = self.computing_slot();
                    occupied.insert(slot);
                    leader = Some(sender);
                    claim
                }
            },
            Entry::Vacant(vacant) => {
                let (slot, claim, sender) = self.computing_slot();
                vacant.insert(slot);
                leader = Some(sender);
                claim
            }
        };

        if let (Some(sender), Claim::Wait { id, .. }) = (leader, &claim) {
            tracing::debug!(key, "cache miss; starting computation");
            let guard = SlotGuard {
                slots: Arc::clone(&self.slots),
                key: key.to_owned(),
                id: *id,
                settled: false,
            };
            tokio::spawn(run_computation(guard, ttl, sender, compute));
        }
        claim
    }

    fn computing_slot(&self) -> (Slot<V>, Claim<V>, watch::Sender<Outcome<V>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, done) = watch::channel(None);
        let slot = Slot::Computing {
            id,
            done: done.clone(),
        };
        (slot, Claim::Wait { id, done }, sender)
    }

    async fn wait(
        &self,
        key: &str,
        id: u64,
        mut done: watch::Receiver<Outcome<V>>,
    ) -> Result<Cached<V>, CacheError> {
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(value)) => Ok(Cached {
                value,
                lookup: CacheLookup::Miss,
            }),
            Some(Err(error)) => Err(CacheError::Upstream(error)),
            None => {
                self.slots.remove_if(key, |_, slot| slot.is_computing(id));
                tracing::warn!(key, "cache computation ended without a result");
                Err(CacheError::ComputationAborted {
                    key: key.to_owned(),
                })
            }
        }
    }
}

enum Claim<V> {
    Hit(V),
    Wait {
        id: u64,
        done: watch::Receiver<Outcome<V>>,
    },
}

/// Owns the computing slot for one computation. Clears it on drop unless the
/// computation settled it, so a panicking computation cannot wedge the key.
struct SlotGuard<V> {
    slots: Slots<V>,
    key: String,
    id: u64,
    settled: bool,
}

impl<V> SlotGuard<V> {
    fn store(mut self, value: V, ttl: Duration) {
        if let Some(mut slot) = self.slots.get_mut(&self.key) {
            if slot.is_computing(self.id) {
                *slot = Slot::Valid {
                    value,
                    computed_at: Instant::now(),
                    ttl,
                };
            }
        }
        self.settled = true;
    }

    fn release(mut self) {
        self.clear();
        self.settled = true;
    }

    fn clear(&self) {
        let id = self.id;
        self.slots.remove_if(&self.key, |_, slot| slot.is_computing(id));
    }
}

impl<V> Drop for SlotGuard<V> {
    fn drop(&mut self) {
        if !self.settled {
            self.clear();
        }
    }
}

async fn run_computation<V, F, Fut>(
    guard: SlotGuard<V>,
    ttl: Duration,
    sender: watch::Sender<Outcome<V>>,
    compute: F,
) where
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
{
    let result = compute().await;
    match &result {
        Ok(value) => guard.store(value.clone(), ttl),
        Err(error) => {
            tracing::debug!(key = %guard.key, %error, "cache computation failed; slot cleared");
            guard.release();
        }
    }
    // Every waiter may have given up already.
    let _ = sender.send(Some(result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn second_call_within_ttl_is_a_hit() {
        let cache = ResponseCache::<u32>::default();
        let first = cache
            .get_or_compute("k", Duration::from_secs(30), || async { Ok(1) })
            .await
            .expect("computed");
        let second = cache
            .get_or_compute("k", Duration::from_secs(30), || async { Ok(2) })
            .await
            .expect("stored");

        assert_eq!(first.lookup, CacheLookup::Miss);
        assert_eq!(second, Cached { value: 1, lookup: CacheLookup::Hit });
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_waits_for_the_grace_period() {
        let cache = ResponseCache::<u32>::new(2);
        cache
            .get_or_compute("k", Duration::from_secs(10), || async { Ok(1) })
            .await
            .expect("computed");

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(cache.peek("k"), None);
        assert_eq!(cache.sweep(), 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn panicking_computation_aborts_waiters_and_frees_the_key() {
        let cache = ResponseCache::<u32>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let aborted = cache
            .get_or_compute("k", Duration::from_secs(30), || async {
                let decoded: Option<u32> = None;
                Ok(decoded.expect("upstream decoder blew up"))
            })
            .await;
        assert!(matches!(aborted, Err(CacheError::ComputationAborted { .. })));

        let counter = Arc::clone(&calls);
        let retried = cache
            .get_or_compute("k", Duration::from_secs(30), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .expect("fresh computation");
        assert_eq!(retried.value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_during_computation_drops_the_result() {
        let cache = ResponseCache::<u32>::default();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let pending = cache.get_or_compute("k", Duration::from_secs(30), || async move {
            let _ = gate.await;
            Ok(5)
        });
        let invalidate = async {
            tokio::task::yield_now().await;
            assert!(cache.invalidate("k"));
            let _ = release.send(());
        };

        let (outcome, ()) = tokio::join!(pending, invalidate);
        assert_eq!(outcome.expect("waiter still answered").value, 5);
        assert_eq!(cache.peek("k"), None);
    }
}
