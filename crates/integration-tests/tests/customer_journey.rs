//! The storefront path: browse, fill a cart, sign in, check out.
//!
//! Carts are local-first, so these scenarios lean on device restarts
//! and second devices to show what persists where.

#![allow(clippy::unwrap_used)]

use shopconnect_client::{CheckoutError, ClientError};
use shopconnect_core::{Money, Role, ShopStatus, UserId};
use shopconnect_integration_tests::{sample_buyer, wait_for_mirror, Harness};

// =============================================================================
// Guest flows
// =============================================================================

#[tokio::test]
async fn test_guest_browses_and_buys() {
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
        .seed_product(shop.id, "Bowl", Money::from_cents(500), 4)
        .await;

    let state = h.device("phone");

    let shops = state.browse_shops().await.unwrap();
    assert_eq!(shops.len(), 1);
    let page = state.shop_page(shop.id).await.unwrap();
    assert_eq!(page.shop.name, "Corner Pottery");
    assert_eq!(page.products.len(), 2);

    state.add_to_cart(mug.id, 2).await.unwrap();
    state.add_to_cart(bowl.id, 1).await.unwrap();
    assert_eq!(state.cart().item_count().await, 3);
    assert_eq!(state.cart().total().await, Money::from_cents(2300));

    let receipt = state.checkout(&sample_buyer()).await.unwrap();
    assert_eq!(receipt.orders.len(), 1);
    assert_eq!(receipt.grand_total, Money::from_cents(2300));
    assert!(receipt.stock_warnings.is_empty());

    assert!(state.cart().is_empty().await);
    assert_eq!(h.backend.order_count().await, 1);
    assert_eq!(h.backend.product_stock(mug.id).await, Some(8));
    assert_eq!(h.backend.product_stock(bowl.id).await, Some(3));

    // Guests have no order history to consult.
    let err = state.my_orders().await.unwrap_err();
    assert!(matches!(err, ClientError::NotSignedIn));
}

#[tokio::test]
async fn test_guest_checkout_with_empty_cart_is_rejected() {
    let h = Harness::new();
    let state = h.device("phone");

    let err = state.checkout(&sample_buyer()).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Checkout(CheckoutError::EmptyCart)
    ));
    assert_eq!(h.backend.order_count().await, 0);
}

#[tokio::test]
async fn test_cart_survives_device_restart() {
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

    let before = h.device("phone");
    before.add_to_cart(mug.id, 2).await.unwrap();
    let session = before.cart().session_id().await;
    drop(before);

    // Same cart file, fresh process.
    let after = h.device("phone");
    assert_eq!(after.cart().session_id().await, session);
    assert_eq!(after.cart().quantity_of(mug.id).await, 2);

    // The product snapshot rode along in the cart file.
    let lines = after.cart().lines().await;
    let snapshot = lines.first().unwrap().product.as_ref().unwrap();
    assert_eq!(snapshot.price, Money::from_cents(900));
}

// =============================================================================
// Signed-in flows
// =============================================================================

#[tokio::test]
async fn test_cart_follows_customer_across_devices() {
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

    // On the phone: create the account, fill the cart, push the
    // mirror.
    let phone = h.device("phone");
    let identity = phone
        .sign_up("casey@example.test", "pw", Role::Customer)
        .await
        .unwrap();
    phone.add_to_cart(mug.id, 2).await.unwrap();
    phone.flush_cart_sync().await.unwrap();
    assert!(wait_for_mirror(&h.backend, identity.user_id, 1).await);

    // On the laptop: signing in adopts the mirrored cart, snapshot
    // re-attached by the fetch.
    let laptop = h.device("laptop");
    laptop
        .sign_in("casey@example.test", "pw")
        .await
        .unwrap();
    assert_eq!(laptop.cart().quantity_of(mug.id).await, 2);
    let lines = laptop.cart().lines().await;
    assert_eq!(
        lines.first().unwrap().product.as_ref().unwrap().price,
        Money::from_cents(900)
    );
}

#[tokio::test]
async fn test_signed_out_customer_checks_out_as_guest() {
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
    state
        .sign_up("casey@example.test", "pw", Role::Customer)
        .await
        .unwrap();
    state.add_to_cart(mug.id, 1).await.unwrap();
    state.sign_out().await.unwrap();

    // The cart stayed on the device; the order is anonymous.
    let receipt = state.checkout(&sample_buyer()).await.unwrap();
    let order = &receipt.orders.first().unwrap().order;
    assert_eq!(order.customer_id, None);
    assert_eq!(order.customer_email, sample_buyer().email);
}

#[tokio::test]
async fn test_signed_in_checkout_lands_in_order_history() {
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
    state.add_to_cart(mug.id, 1).await.unwrap();

    let receipt = state.checkout(&sample_buyer()).await.unwrap();
    assert_eq!(
        receipt.orders.first().unwrap().order.customer_id,
        Some(identity.user_id)
    );

    let orders = state.my_orders().await.unwrap();
    assert_eq!(orders.len(), 1);
    let lines = state.order_lines(orders.first().unwrap().id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines.first().unwrap().price, Money::from_cents(900));

    // Checkout also cleared the server-side mirror, through the
    // outbox.
    assert!(wait_for_mirror(&h.backend, identity.user_id, 0).await);
}
