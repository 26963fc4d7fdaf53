//! Behavior-driven tests for the response cache
//!
//! These tests verify HOW the cache shields the upstream: concurrent misses on
//! one key share a single computation, expiry triggers exactly one recompute,
//! failures are never stored, and an impatient caller does not cancel work
//! other callers still need.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nepse_core::{CacheError, CacheLookup, ResponseCache, UpstreamError, UpstreamErrorKind};

const TTL: Duration = Duration::from_secs(30);

/// Spawns `callers` concurrent lookups of `key`, each of which would take
/// `work` to compute, and returns every outcome.
async fn stampede(
    cache: &Arc<ResponseCache<String>>,
    computations: &Arc<AtomicUsize>,
    key: &'static str,
    callers: usize,
    work: Duration,
) -> Vec<Result<String, CacheError>> {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let cache = Arc::clone(cache);
            let computations = Arc::clone(computations);
            tokio::spawn(async move {
                cache
                    .get_or_compute(key, TTL, move || async move {
                        let run = computations.fetch_add(1, Ordering::SeqCst) + 1;
                        tokio::time::sleep(work).await;
                        Ok(format!("{key}#{run}"))
                    })
                    .await
                    .map(|cached| cached.value)
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(callers);
    for handle in handles {
        outcomes.push(handle.await.expect("caller task completed"));
    }
    outcomes
}

// =============================================================================
// Cache: Single Flight
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn when_many_callers_miss_together_upstream_is_called_once() {
    // Given: An empty cache
    let cache = Arc::new(ResponseCache::default());
    let computations = Arc::new(AtomicUsize::new(0));

    // When: 64 callers ask for the same key while the first computation is slow
    let outcomes = stampede(&cache, &computations, "/LiveMarket", 64, Duration::from_millis(50)).await;

    // Then: One computation ran and every caller got its result
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert!(outcomes
        .iter()
        .all(|outcome| outcome.as_deref() == Ok("/LiveMarket#1")));
}

#[tokio::test(start_paused = true)]
async fn when_entry_expires_concurrent_callers_trigger_one_recompute() {
    // Given: A key computed once
    let cache = Arc::new(ResponseCache::default());
    let computations = Arc::new(AtomicUsize::new(0));
    stampede(&cache, &computations, "/Summary", 1, Duration::from_millis(10)).await;

    // When: The TTL passes and 20 callers arrive at once
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    let outcomes = stampede(&cache, &computations, "/Summary", 20, Duration::from_millis(10)).await;

    // Then: Exactly one more computation ran and all callers share it
    assert_eq!(computations.load(Ordering::SeqCst), 2);
    assert!(outcomes.iter().all(|outcome| outcome.as_deref() == Ok("/Summary#2")));
}

#[tokio::test(start_paused = true)]
async fn when_entry_is_fresh_it_is_served_without_computing() {
    // Given: A key computed 10 seconds ago
    let cache: ResponseCache<u32> = ResponseCache::default();
    cache
        .get_or_compute("/TopGainers", TTL, || async { Ok(7) })
        .await
        .expect("computed");
    tokio::time::advance(Duration::from_secs(10)).await;

    // When: It is requested again
    let cached = cache
        .get_or_compute("/TopGainers", TTL, || async { Ok(8) })
        .await
        .expect("cached");

    // Then: The stored value comes back as a hit
    assert_eq!(cached.value, 7);
    assert_eq!(cached.lookup, CacheLookup::Hit);
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_compute_independently() {
    let cache = Arc::new(ResponseCache::default());
    let computations = Arc::new(AtomicUsize::new(0));

    stampede(&cache, &computations, "/CompanyDetails?symbol=NABIL", 5, Duration::from_millis(5)).await;
    stampede(&cache, &computations, "/CompanyDetails?symbol=NICA", 5, Duration::from_millis(5)).await;

    assert_eq!(computations.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
}

// =============================================================================
// Cache: Failures and Deadlines
// =============================================================================

#[tokio::test]
async fn when_computation_fails_error_is_not_stored() {
    // Given: An upstream that fails once
    let cache: ResponseCache<String> = ResponseCache::default();

    // When: The first lookup fails and a second one follows
    let first = cache
        .get_or_compute("/Summary", TTL, || async {
            Err(UpstreamError::transient("connection reset"))
        })
        .await;
    let second = cache
        .get_or_compute("/Summary", TTL, || async { Ok(String::from("recovered")) })
        .await;

    // Then: The failure reached the caller and the retry computed fresh
    match first {
        Err(CacheError::Upstream(error)) => assert_eq!(error.kind(), UpstreamErrorKind::Transient),
        other => panic!("expected upstream failure, got {other:?}"),
    }
    let second = second.expect("second computation succeeds");
    assert_eq!(second.value, "recovered");
    assert_eq!(second.lookup, CacheLookup::Miss);
}

#[tokio::test(start_paused = true)]
async fn when_shared_computation_fails_every_waiter_sees_the_error() {
    // Given: An upstream that fails after a short delay
    let cache: Arc<ResponseCache<String>> = Arc::new(ResponseCache::default());
    let computations = Arc::new(AtomicUsize::new(0));

    // When: 16 callers wait on the same failing computation
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            tokio::spawn(async move {
                cache
                    .get_or_compute("/NepseIndex", TTL, move || async move {
                        computations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Err(UpstreamError::transient("exchange unavailable"))
                    })
                    .await
            })
        })
        .collect();

    let mut failures = 0;
    for handle in handles {
        match handle.await.expect("caller task completed") {
            Err(CacheError::Upstream(error)) => {
                assert_eq!(error.kind(), UpstreamErrorKind::Transient);
                failures += 1;
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
    }

    // Then: One upstream call, every caller got the failure, nothing was stored
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(failures, 16);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_one_waiter_gives_up_others_still_get_the_value() {
    // Given: A patient caller already waiting on a 5 second computation
    let cache: Arc<ResponseCache<String>> = Arc::new(ResponseCache::default());
    let patient = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_compute("/Floorsheet", TTL, || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(String::from("v"))
                })
                .await
                .map(|cached| cached.value)
        })
    };
    tokio::task::yield_now().await;

    // When: A second caller joins but only waits 1 second
    let impatient = cache
        .get_or_compute_with_deadline("/Floorsheet", TTL, Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::from("v"))
        })
        .await;

    // Then: Only the impatient caller times out
    assert!(matches!(impatient, Err(CacheError::WaitTimedOut { .. })));
    let patient = patient.await.expect("caller task completed");
    assert_eq!(patient.expect("patient caller is served"), "v");
}

#[tokio::test(start_paused = true)]
async fn when_waiter_gives_up_computation_still_fills_the_slot() {
    // Given: An upstream that takes 5 seconds
    let cache: ResponseCache<String> = ResponseCache::default();

    // When: The caller is only willing to wait 1 second
    let outcome = cache
        .get_or_compute_with_deadline("/Floorsheet", TTL, Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::from("floorsheet"))
        })
        .await;

    // Then: It times out, and once the work completes the value is stored
    assert!(matches!(
        outcome,
        Err(CacheError::WaitTimedOut { ref key, waited }) if key == "/Floorsheet" && waited == Duration::from_secs(1)
    ));
    assert_eq!(cache.peek("/Floorsheet"), None);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.peek("/Floorsheet").as_deref(), Some("floorsheet"));
}

#[tokio::test(start_paused = true)]
async fn entry_is_still_fresh_at_exactly_its_ttl() {
    // Given: A value computed now
    let cache: ResponseCache<u32> = ResponseCache::default();
    cache
        .get_or_compute("/TopLosers", TTL, || async { Ok(1) })
        .await
        .expect("computed");

    // When: Exactly the TTL has passed
    tokio::time::advance(TTL).await;
    let at_ttl = cache
        .get_or_compute("/TopLosers", TTL, || async { Ok(2) })
        .await
        .expect("served");

    // Then: It is served from the cache; one instant later it is recomputed
    assert_eq!(at_ttl.value, 1);
    assert_eq!(at_ttl.lookup, CacheLookup::Hit);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(cache.peek("/TopLosers"), None);
}

#[tokio::test(start_paused = true)]
async fn when_stale_entries_outlive_their_grace_sweep_drops_them() {
    // Given: Two entries, one with a short TTL
    let cache: ResponseCache<u32> = ResponseCache::new(2);
    cache
        .get_or_compute("short", Duration::from_secs(5), || async { Ok(1) })
        .await
        .expect("computed");
    cache
        .get_or_compute("long", Duration::from_secs(600), || async { Ok(2) })
        .await
        .expect("computed");

    // When: Twice the short TTL has passed
    tokio::time::advance(Duration::from_secs(11)).await;
    let dropped = cache.sweep();

    // Then: Only the short entry is gone
    assert_eq!(dropped, 1);
    assert_eq!(cache.peek("short"), None);
    assert_eq!(cache.peek("long"), Some(2));
}
