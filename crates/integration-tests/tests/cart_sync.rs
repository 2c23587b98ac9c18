//! The cart's write-behind mirror, with the worker running.
//!
//! These scenarios watch the background task converge the server-side
//! rows with the local cart through retries and dropped intents. The
//! harness shrinks the backoff so failure paths finish in
//! milliseconds.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use shopconnect_core::{Money, Role, ShopStatus, UserId};
use shopconnect_integration_tests::{wait_for_mirror, Harness};

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_worker_mirrors_mutations_in_background() {
    let h = Harness::new();
    let owner = UserId::generate();
    let shop = h
        .backend
        .seed_shop(owner, "Corner Pottery", ShopStatus::Approved)
        .await;
    let mug = h
        .backend
        .seed_product(shop.id, "Mug", Money::from_cents(900), 10)
        .await;

    let state = h.device("phone");
    let identity = state
        .sign_up("casey@example.test", "pw", Role::Customer)
        .await
        .unwrap();
    state.add_to_cart(mug.id, 2).await.unwrap();

    // No flush: the worker alone delivers.
    assert!(wait_for_mirror(&h.backend, identity.user_id, 1).await);
    let mirror = h.backend.stored_cart(identity.user_id).await;
    let row = mirror.first().unwrap();
    assert_eq!(row.quantity, 2);
    assert_eq!(row.customer_id, Some(identity.user_id));
}

#[tokio::test]
async fn test_removals_and_quantity_changes_reach_mirror() {
    let h = Harness::new();
    let owner = UserId::generate();
    let shop = h
        .backend
        .seed_shop(owner, "Corner Pottery", ShopStatus::Approved)
        .await;
    let mug = h
        .backend
        .seed_product(shop.id, "Mug", Money::from_cents(900), 10)
        .await;
    let bowl = h
        .backend
        .seed_product(shop.id, "Bowl", Money::from_cents(500), 10)
        .await;

    let state = h.device("phone");
    let identity = state
        .sign_up("casey@example.test", "pw", Role::Customer)
        .await
        .unwrap();
    state.add_to_cart(mug.id, 2).await.unwrap();
    state.add_to_cart(bowl.id, 1).await.unwrap();
    assert!(wait_for_mirror(&h.backend, identity.user_id, 2).await);

    // Every mutation kind flows through the same outbox, removals
    // included.
    state.cart().update_quantity(mug.id, 5).await;
    let mut quantity = 0;
    for _ in 0..100 {
        let rows = h.backend.stored_cart(identity.user_id).await;
        if let Some(row) = rows.iter().find(|r| r.product_id == mug.id) {
            quantity = row.quantity;
            if quantity == 5 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(quantity, 5);

    state.cart().remove_item(bowl.id).await;
    assert!(wait_for_mirror(&h.backend, identity.user_id, 1).await);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_transient_failures_retry_until_delivered() {
    let h = Harness::new();
    let owner = UserId::generate();
    let shop = h
        .backend
        .seed_shop(owner, "Corner Pottery", ShopStatus::Approved)
        .await;
    let mug = h
        .backend
        .seed_product(shop.id, "Mug", Money::from_cents(900), 10)
        .await;

    let state = h.device("phone");
    let identity = state
        .sign_up("casey@example.test", "pw", Role::Customer)
        .await
        .unwrap();

    // The first two deliveries bounce with a 503; the intent must
    // stay queued and land on the third.
    h.backend.fail_cart_writes(0, 2, 503).await;
    state.add_to_cart(mug.id, 1).await.unwrap();

    assert!(wait_for_mirror(&h.backend, identity.user_id, 1).await);
    assert_eq!(state.cart().last_sync_error().await, None);
}

#[tokio::test]
async fn test_permanent_failure_drops_intent_and_recovers() {
    let h = Harness::new();
    let owner = UserId::generate();
    let shop = h
        .backend
        .seed_shop(owner, "Corner Pottery", ShopStatus::Approved)
        .await;
    let mug = h
        .backend
        .seed_product(shop.id, "Mug", Money::from_cents(900), 10)
        .await;
    let bowl = h
        .backend
        .seed_product(shop.id, "Bowl", Money::from_cents(500), 10)
        .await;

    let state = h.device("phone");
    let identity = state
        .sign_up("casey@example.test", "pw", Role::Customer)
        .await
        .unwrap();

    // A 400 is not retryable: the intent is dropped and the failure
    // recorded.
    h.backend.fail_cart_writes(0, 1, 400).await;
    state.add_to_cart(mug.id, 1).await.unwrap();

    let mut recorded = false;
    for _ in 0..100 {
        if state.cart().last_sync_error().await.is_some() {
            recorded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(recorded, "dropped delivery never recorded an error");

    // The next mutation snapshots the whole cart, so the mirror still
    // converges.
    state.add_to_cart(bowl.id, 1).await.unwrap();
    assert!(wait_for_mirror(&h.backend, identity.user_id, 2).await);
    assert_eq!(state.cart().last_sync_error().await, None);
}

// =============================================================================
// Guests
// =============================================================================

#[tokio::test]
async fn test_guest_cart_stays_local() {
    let h = Harness::new();
    let owner = UserId::generate();
    let shop = h
        .backend
        .seed_shop(owner, "Corner Pottery", ShopStatus::Approved)
        .await;
    let mug = h
        .backend
        .seed_product(shop.id, "Mug", Money::from_cents(900), 10)
        .await;

    let state = h.device("phone");
    state.add_to_cart(mug.id, 2).await.unwrap();

    // Nothing queued for the worker, but the cart file is on disk.
    assert_eq!(state.cart().sync_pending().await, 0);

    let raw = std::fs::read(h.cart_path("phone")).unwrap();
    let stored: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert!(stored.get("session_id").is_some());
    let items = stored
        .get("items")
        .and_then(serde_json::Value::as_array)
        .unwrap();
    assert_eq!(items.len(), 1);
    let quantity = items
        .first()
        .unwrap()
        .get("quantity")
        .and_then(serde_json::Value::as_u64);
    assert_eq!(quantity, Some(2));
}
