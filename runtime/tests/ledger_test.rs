//! Integration tests for listing, lookup and cancellation through the
//! order service.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration as ChronoDuration;
use proptest::prelude::*;
use std::collections::BTreeSet;
use table_orders_core::ledger::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use table_orders_core::{DishId, IdempotencyKey, LedgerError, OrderId, OrderStatus, TableId};
use table_orders_runtime::{IdempotencyCoordinator, OrderService};
use table_orders_testing::{InMemoryCoordinationCache, InMemoryLedgerStore, ManualClock, test_clock};

type Service = OrderService<InMemoryLedgerStore, InMemoryCoordinationCache, ManualClock>;

fn service() -> Service {
    let clock = test_clock();
    OrderService::with_clock(
        InMemoryLedgerStore::with_clock(clock.clone()),
        IdempotencyCoordinator::new(InMemoryCoordinationCache::new()),
        clock,
    )
}

async fn seed(service: &Service, table: TableId, count: usize) -> Vec<OrderId> {
    let mut ids = Vec::with_capacity(count);
    for dish in 0..count {
        let order = service
            .create_order(
                table,
                DishId::new(i64::try_from(dish).unwrap()),
                service.ready_time_after(ChronoDuration::minutes(5)),
                None,
            )
            .await
            .unwrap();
        ids.push(order.id);
    }
    ids
}

/// Walk every page with `from_id = last id + 1` and return the pages.
async fn walk(service: &Service, table: TableId, limit: u32) -> Vec<Vec<OrderId>> {
    let mut pages = Vec::new();
    let mut from_id = None;
    loop {
        let page: Vec<OrderId> = service
            .list_orders(table, from_id, Some(limit))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        let Some(last) = page.last().copied() else {
            break;
        };
        let full = page.len() == limit as usize;
        pages.push(page);
        if !full {
            break;
        }
        from_id = Some(last.next());
    }
    pages
}

// ============================================================================
// Scenario
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_table_scenario() {
    let service = service();
    let table = TableId::new(7);
    let key = IdempotencyKey::parse("abc").unwrap();
    let ready = service.ready_time_after(ChronoDuration::minutes(15));

    let first = service
        .create_order(table, DishId::new(3), ready, Some(key.clone()))
        .await
        .unwrap();
    assert_eq!(first.id, OrderId::new(1));
    assert_eq!(first.status, OrderStatus::Active);
    assert_eq!(first.ready_time, ready);

    let again = service
        .create_order(table, DishId::new(3), ready, Some(key))
        .await
        .unwrap();
    assert_eq!(again, first);

    let second = service
        .create_order(table, DishId::new(4), ready, None)
        .await
        .unwrap();
    assert_eq!(second.id, OrderId::new(2));

    let cancelled = service.cancel_order(table, first.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let listed = service.list_orders(table, None, None).await.unwrap();
    assert_eq!(listed, vec![second]);

    let fetched = service.get_order(table, first.id).await.unwrap();
    assert_eq!(fetched.status, OrderStatus::Cancelled);
}

// ============================================================================
// Cancellation and lookup
// ============================================================================

#[tokio::test]
async fn test_cancel_twice_returns_cancelled_order() {
    let service = service();
    let table = TableId::new(1);
    let ids = seed(&service, table, 1).await;

    let once = service.cancel_order(table, ids[0]).await.unwrap();
    let twice = service.cancel_order(table, ids[0]).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_lookup_is_scoped_by_table() {
    let service = service();
    let ids = seed(&service, TableId::new(1), 1).await;

    let result = service.get_order(TableId::new(2), ids[0]).await;
    assert_eq!(
        result,
        Err(LedgerError::not_found(TableId::new(2), ids[0]))
    );

    let result = service.cancel_order(TableId::new(2), ids[0]).await;
    assert!(matches!(result, Err(LedgerError::NotFound { .. })));
}

#[tokio::test]
async fn test_cancelled_ids_are_never_reused() {
    let service = service();
    let table = TableId::new(1);
    let ids = seed(&service, table, 3).await;
    service.cancel_order(table, ids[2]).await.unwrap();

    let next = seed(&service, table, 1).await;
    assert_eq!(next[0], OrderId::new(4));
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_unknown_table_lists_empty() {
    let service = service();
    let listed = service.list_orders(TableId::new(99), None, None).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_negative_table_is_rejected() {
    let service = service();
    let result = service.list_orders(TableId::new(-1), None, None).await;
    assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
}

#[tokio::test]
async fn test_zero_limit_returns_empty_page() {
    let service = service();
    let table = TableId::new(1);
    seed(&service, table, 3).await;

    let listed = service.list_orders(table, None, Some(0)).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_page_size_defaults_and_cap() {
    let service = service();
    let table = TableId::new(1);
    seed(&service, table, MAX_PAGE_SIZE as usize + 5).await;

    let default_page = service.list_orders(table, None, None).await.unwrap();
    assert_eq!(default_page.len(), DEFAULT_PAGE_SIZE as usize);

    let capped = service.list_orders(table, None, Some(u32::MAX)).await.unwrap();
    assert_eq!(capped.len(), MAX_PAGE_SIZE as usize);
    assert_eq!(capped.last().unwrap().id, OrderId::new(i64::from(MAX_PAGE_SIZE)));
}

#[tokio::test]
async fn test_from_id_past_the_end_is_empty() {
    let service = service();
    let table = TableId::new(1);
    seed(&service, table, 3).await;

    let listed = service
        .list_orders(table, Some(OrderId::new(4)), None)
        .await
        .unwrap();
    assert!(listed.is_empty());

    let from_two: Vec<OrderId> = service
        .list_orders(table, Some(OrderId::new(2)), None)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(from_two, vec![OrderId::new(2), OrderId::new(3)]);
}

#[tokio::test]
async fn test_cancelled_orders_do_not_shorten_pages() {
    let service = service();
    let table = TableId::new(1);
    let ids = seed(&service, table, 6).await;
    service.cancel_order(table, ids[0]).await.unwrap();
    service.cancel_order(table, ids[1]).await.unwrap();

    let page: Vec<OrderId> = service
        .list_orders(table, None, Some(3))
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(page, vec![ids[2], ids[3], ids[4]]);
}

// ============================================================================
// Pagination properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pagination_covers_active_orders_exactly_once(
        count in 0usize..60,
        cancelled in proptest::collection::btree_set(1i64..60, 0..20),
        limit in 1u32..15,
    ) {
        tokio_test::block_on(async {
            let service = service();
            let table = TableId::new(5);
            let ids = seed(&service, table, count).await;
            for id in &ids {
                if cancelled.contains(&id.get()) {
                    service.cancel_order(table, *id).await.unwrap();
                }
            }

            let pages = walk(&service, table, limit).await;

            let expected: Vec<OrderId> = ids
                .iter()
                .copied()
                .filter(|id| !cancelled.contains(&id.get()))
                .collect();
            let seen: Vec<OrderId> = pages.iter().flatten().copied().collect();
            assert_eq!(seen, expected);

            let unique: BTreeSet<OrderId> = seen.iter().copied().collect();
            assert_eq!(unique.len(), seen.len());

            for page in &pages {
                assert!(!page.is_empty());
                assert!(page.len() <= limit as usize);
                assert!(page.windows(2).all(|w| w[0] < w[1]));
            }
        });
    }

    #[test]
    fn ids_are_dense_and_start_at_one(count in 1usize..40) {
        tokio_test::block_on(async {
            let service = service();
            let ids = seed(&service, TableId::new(3), count).await;
            let expected: Vec<OrderId> = (1..=i64::try_from(count).unwrap()).map(OrderId::new).collect();
            assert_eq!(ids, expected);
        });
    }
}
