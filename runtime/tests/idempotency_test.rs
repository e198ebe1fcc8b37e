//! Integration tests for idempotent order creation.
//!
//! All tests run on paused tokio time: claim TTLs, poll backoff and slow
//! inserts advance instantly and deterministically.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use std::time::Duration;
use table_orders_core::environment::Clock;
use table_orders_core::idempotency::{ClaimId, IDEMPOTENCY_TTL};
use table_orders_core::{
    ClaimState, DishId, IdempotencyKey, LedgerError, OrderId, OrderStatus, TableId,
};
use table_orders_runtime::{BackoffPolicy, IdempotencyCoordinator, OrderService};
use table_orders_testing::{InMemoryCoordinationCache, InMemoryLedgerStore, ManualClock, test_clock};
use tokio::time::Instant;

// ============================================================================
// Test Fixtures
// ============================================================================

type Service = OrderService<InMemoryLedgerStore, InMemoryCoordinationCache, ManualClock>;

struct Fixture {
    service: Service,
    ledger: InMemoryLedgerStore,
    cache: InMemoryCoordinationCache,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let clock = test_clock();
    let ledger = InMemoryLedgerStore::with_clock(clock.clone());
    let cache = InMemoryCoordinationCache::new();
    let service = OrderService::with_clock(
        ledger.clone(),
        IdempotencyCoordinator::new(cache.clone()),
        clock.clone(),
    );
    Fixture {
        service,
        ledger,
        cache,
        clock,
    }
}

fn key(raw: &str) -> IdempotencyKey {
    IdempotencyKey::parse(raw).unwrap()
}

impl Fixture {
    async fn create(
        &self,
        table: i64,
        idempotency_key: Option<&str>,
    ) -> table_orders_core::Result<table_orders_core::Order> {
        self.service
            .create_order(
                TableId::new(table),
                DishId::new(42),
                self.service.ready_time_after(ChronoDuration::minutes(15)),
                idempotency_key.map(key),
            )
            .await
    }
}

// ============================================================================
// Basic creation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_repeated_key_returns_first_order() {
    let f = fixture();

    let first = f.create(7, Some("abc")).await.unwrap();
    let second = f.create(7, Some("abc")).await.unwrap();

    assert_eq!(first.id, OrderId::new(1));
    assert_eq!(second, first);
    assert_eq!(f.ledger.insert_count(), 1);

    let listed = f.service.list_orders(TableId::new(7), None, None).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_without_key_every_call_creates() {
    let f = fixture();

    let a = f.create(7, None).await.unwrap();
    let b = f.create(7, None).await.unwrap();

    assert_eq!(a.id, OrderId::new(1));
    assert_eq!(b.id, OrderId::new(2));
    assert!(f.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_same_key_on_other_table_is_independent() {
    let f = fixture();

    let a = f.create(7, Some("abc")).await.unwrap();
    let b = f.create(8, Some("abc")).await.unwrap();

    assert_eq!(a.table_id, TableId::new(7));
    assert_eq!(b.table_id, TableId::new(8));
    assert_eq!(f.ledger.insert_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_takes_no_claim() {
    let f = fixture();

    let result = f
        .service
        .create_order(
            TableId::new(7),
            DishId::new(1),
            f.clock.now(),
            Some(key("abc")),
        )
        .await;

    assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
    assert!(f.cache.is_empty());
    assert_eq!(f.ledger.insert_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_committed_marker_points_at_order() {
    let f = fixture();
    let order = f.create(7, Some("abc")).await.unwrap();

    let raw = f.cache.raw(&key("abc").marker_key(TableId::new(7))).unwrap();
    assert_eq!(
        ClaimState::decode(&raw).unwrap(),
        ClaimState::Committed { order_id: order.id }
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_creations_collapse_to_one_order() {
    let f = fixture();
    f.ledger.set_insert_delay(Duration::from_millis(200));

    let results = join_all((0..10).map(|_| f.create(7, Some("abc")))).await;

    let ids: Vec<OrderId> = results.into_iter().map(|r| r.unwrap().id).collect();
    assert!(ids.iter().all(|id| *id == OrderId::new(1)), "ids: {ids:?}");
    assert_eq!(f.ledger.insert_count(), 1);
    assert_eq!(f.ledger.orders(TableId::new(7)).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creations_with_distinct_keys_get_distinct_ids() {
    let f = fixture();
    f.ledger.set_insert_delay(Duration::from_millis(20));

    let keys: Vec<String> = (0..10).map(|i| format!("key-{i}")).collect();
    let results = join_all(keys.iter().map(|k| f.create(7, Some(k.as_str())))).await;

    let mut ids: Vec<i64> = results.into_iter().map(|r| r.unwrap().id.get()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
}

// ============================================================================
// Validity window
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_key_reused_after_window_creates_new_order() {
    let f = fixture();

    let first = f.create(7, Some("abc")).await.unwrap();

    tokio::time::advance(IDEMPOTENCY_TTL).await;
    f.clock.advance(ChronoDuration::minutes(10));

    let second = f.create(7, Some("abc")).await.unwrap();
    assert_eq!(first.id, OrderId::new(1));
    assert_eq!(second.id, OrderId::new(2));
    assert_eq!(f.ledger.insert_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_key_reused_just_inside_window_is_deduplicated() {
    let f = fixture();

    let first = f.create(7, Some("abc")).await.unwrap();
    tokio::time::advance(IDEMPOTENCY_TTL - Duration::from_secs(1)).await;

    let second = f.create(7, Some("abc")).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(f.ledger.insert_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_pending_claim_is_reclaimed_after_ttl() {
    let f = fixture();
    let marker_key = key("abc").marker_key(TableId::new(7));
    let stale = ClaimState::Pending {
        claim_id: ClaimId::generate(),
    }
    .encode()
    .unwrap();
    f.cache.insert_raw(&marker_key, &stale, IDEMPOTENCY_TTL);

    let started = Instant::now();
    let order = f.create(7, Some("abc")).await.unwrap();

    assert!(started.elapsed() >= IDEMPOTENCY_TTL);
    assert_eq!(order.id, OrderId::new(1));
    assert_eq!(f.ledger.insert_count(), 1);
    assert_eq!(
        ClaimState::decode(&f.cache.raw(&marker_key).unwrap()).unwrap(),
        ClaimState::Committed { order_id: order.id }
    );
}

#[tokio::test(start_paused = true)]
async fn test_pending_claim_released_mid_poll_is_taken_over() {
    let f = fixture();
    let marker_key = key("abc").marker_key(TableId::new(7));
    let pending = ClaimState::Pending {
        claim_id: ClaimId::generate(),
    }
    .encode()
    .unwrap();
    f.cache.insert_raw(&marker_key, &pending, IDEMPOTENCY_TTL);

    let cache = f.cache.clone();
    let releaser = async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        cache.remove(&marker_key);
    };

    let started = Instant::now();
    let (order, ()) = tokio::join!(f.create(7, Some("abc")), releaser);

    assert_eq!(order.unwrap().id, OrderId::new(1));
    assert!(started.elapsed() < Duration::from_secs(10));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_create_releases_claim() {
    let f = fixture();
    f.ledger.set_fail_inserts(true);

    let result = f.create(7, Some("abc")).await;
    assert!(matches!(result, Err(LedgerError::StoreUnavailable(_))));
    assert!(f.cache.is_empty());

    f.ledger.set_fail_inserts(false);
    let order = f.create(7, Some("abc")).await.unwrap();
    assert_eq!(order.id, OrderId::new(1));
}

#[tokio::test(start_paused = true)]
async fn test_waiters_retry_after_claimant_fails() {
    let f = fixture();
    f.ledger.set_insert_delay(Duration::from_millis(100));
    f.ledger.set_fail_inserts(true);

    let ledger = f.ledger.clone();
    let recover = async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        ledger.set_fail_inserts(false);
    };

    let (results, ()) = tokio::join!(join_all((0..3).map(|_| f.create(7, Some("abc")))), recover);

    let failed = results.iter().filter(|r| r.is_err()).count();
    let ids: Vec<OrderId> = results.into_iter().filter_map(Result::ok).map(|o| o.id).collect();
    assert_eq!(failed, 1);
    assert_eq!(ids, vec![OrderId::new(1), OrderId::new(1)]);
    assert_eq!(f.ledger.insert_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_commit_upgrade_failure_still_returns_order() {
    let f = fixture();
    f.cache.set_fail_compare_and_set(true);

    let order = f.create(7, Some("abc")).await.unwrap();
    assert_eq!(order.id, OrderId::new(1));

    // The marker is still pending, so the order is not recorded under the key.
    let raw = f.cache.raw(&key("abc").marker_key(TableId::new(7))).unwrap();
    assert!(matches!(
        ClaimState::decode(&raw).unwrap(),
        ClaimState::Pending { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cache_outage_surfaces_as_cache_unavailable() {
    let f = fixture();
    f.cache.set_unavailable(true);

    let result = f.create(7, Some("abc")).await;
    assert!(matches!(result, Err(LedgerError::CacheUnavailable(_))));
    assert_eq!(f.ledger.insert_count(), 0);

    // Keyless creation does not touch the cache.
    assert!(f.create(7, None).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_marker_is_internal_error() {
    let f = fixture();
    f.cache.insert_raw(
        &key("abc").marker_key(TableId::new(7)),
        "not a marker",
        IDEMPOTENCY_TTL,
    );

    let result = f.create(7, Some("abc")).await;
    assert!(matches!(result, Err(LedgerError::Internal(_))));
}

// ============================================================================
// Joiners observe current state
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_after_cancel_returns_cancelled_order() {
    let f = fixture();

    let order = f.create(7, Some("abc")).await.unwrap();
    f.service.cancel_order(TableId::new(7), order.id).await.unwrap();

    let retried = f.create(7, Some("abc")).await.unwrap();
    assert_eq!(retried.id, order.id);
    assert_eq!(retried.status, OrderStatus::Cancelled);
    assert_eq!(f.ledger.insert_count(), 1);
}

// ============================================================================
// Coordinator configuration
// ============================================================================

#[test]
fn test_poll_budget_must_be_shorter_than_ttl() {
    let cache = InMemoryCoordinationCache::new();
    let poll = BackoffPolicy::builder()
        .budget(Duration::from_secs(60))
        .build();

    assert!(IdempotencyCoordinator::with_policy(cache.clone(), Duration::from_secs(60), poll).is_err());
    assert!(IdempotencyCoordinator::with_policy(cache, Duration::from_secs(61), poll).is_ok());
}

#[test]
fn test_poll_policy_that_never_waits_is_rejected() {
    let cache = InMemoryCoordinationCache::new();
    let ttl = Duration::from_secs(5);

    let no_budget = BackoffPolicy::builder().budget(Duration::ZERO).build();
    let no_initial_delay = BackoffPolicy::builder()
        .initial_delay(Duration::ZERO)
        .budget(Duration::from_secs(1))
        .build();
    let no_max_delay = BackoffPolicy::builder()
        .max_delay(Duration::ZERO)
        .budget(Duration::from_secs(1))
        .build();

    for poll in [no_budget, no_initial_delay, no_max_delay] {
        let result = IdempotencyCoordinator::with_policy(cache.clone(), ttl, poll);
        assert!(
            matches!(result, Err(LedgerError::InvalidInput(_))),
            "Expected InvalidInput for {poll:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_joiner_waits_out_slow_insert_across_rounds() {
    let clock = test_clock();
    let ledger = InMemoryLedgerStore::with_clock(clock.clone());
    ledger.set_insert_delay(Duration::from_secs(2));
    let cache = InMemoryCoordinationCache::new();
    let poll = BackoffPolicy::builder()
        .budget(Duration::from_secs(1))
        .build();
    let coordinator =
        IdempotencyCoordinator::with_policy(cache.clone(), Duration::from_secs(5), poll).unwrap();
    let service = OrderService::with_clock(ledger.clone(), coordinator, clock.clone());

    let ready = service.ready_time_after(ChronoDuration::minutes(1));
    let (a, b) = tokio::join!(
        service.create_order(TableId::new(1), DishId::new(1), ready, Some(key("k"))),
        service.create_order(TableId::new(1), DishId::new(1), ready, Some(key("k"))),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.id, OrderId::new(1));
    assert_eq!(b.id, a.id);
    assert_eq!(ledger.insert_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_short_window_coordinator() {
    let clock = test_clock();
    let ledger = InMemoryLedgerStore::with_clock(clock.clone());
    let cache = InMemoryCoordinationCache::new();
    let poll = BackoffPolicy::builder()
        .budget(Duration::from_secs(1))
        .build();
    let coordinator =
        IdempotencyCoordinator::with_policy(cache.clone(), Duration::from_secs(5), poll).unwrap();
    let service = OrderService::with_clock(ledger.clone(), coordinator, clock.clone());

    let ready = service.ready_time_after(ChronoDuration::minutes(1));
    let first = service
        .create_order(TableId::new(1), DishId::new(1), ready, Some(key("k")))
        .await
        .unwrap();
    assert_eq!(cache.ttl(&key("k").marker_key(TableId::new(1))), Some(Duration::from_secs(5)));

    tokio::time::advance(Duration::from_secs(5)).await;
    let second = service
        .create_order(TableId::new(1), DishId::new(1), ready, Some(key("k")))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
}
