//! Shop registration, moderation, and the shopkeeper's side of an
//! order.
//!
//! The in-memory backend models a single auth service, so switching
//! actors means signing in again, exactly as one person juggling
//! accounts would.

#![allow(clippy::unwrap_used)]

use shopconnect_client::{AuthzError, ClientError, ProductPatch};
use shopconnect_core::{Money, OrderStatus, Role, ShopStatus};
use shopconnect_integration_tests::{product_draft, sample_buyer, shop_form, Harness};

// =============================================================================
// Moderation
// =============================================================================

#[tokio::test]
async fn test_shop_lifecycle_from_registration_to_first_sale() {
    let h = Harness::new();

    // The shopkeeper registers and stocks a shop; it starts pending.
    let keeper = h.device("keeper");
    keeper
        .sign_up("keeper@example.test", "pw", Role::Shopkeeper)
        .await
        .unwrap();
    let shop = keeper
        .register_shop(shop_form("Corner Pottery"))
        .await
        .unwrap();
    assert_eq!(shop.status, ShopStatus::Pending);
    let mug = keeper
        .create_product(product_draft(shop.id, "Mug", 900, 10))
        .await
        .unwrap();

    // Customers cannot see it yet.
    let customer = h.device("customer");
    assert!(customer.browse_shops().await.unwrap().is_empty());

    // An admin approves the registration.
    let admin = h.device("admin");
    admin
        .sign_up("admin@example.test", "pw", Role::Admin)
        .await
        .unwrap();
    assert_eq!(admin.pending_shops().await.unwrap().len(), 1);
    let approved = admin
        .moderate_shop(shop.id, ShopStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, ShopStatus::Approved);

    // Now the shop is live and a guest buys a mug.
    assert_eq!(customer.browse_shops().await.unwrap().len(), 1);
    customer.add_to_cart(mug.id, 1).await.unwrap();
    customer.checkout(&sample_buyer()).await.unwrap();

    // Back as the shopkeeper: see the order, work it, read the
    // numbers.
    keeper
        .sign_in("keeper@example.test", "pw")
        .await
        .unwrap();
    let orders = keeper.shop_orders(shop.id).await.unwrap();
    assert_eq!(orders.len(), 1);
    let order = orders.first().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, Money::from_cents(900));

    let confirmed = keeper
        .set_order_status(order.id, OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    let analytics = keeper.shop_analytics(shop.id).await.unwrap();
    assert_eq!(analytics.total_products, 1);
    assert_eq!(analytics.total_orders, 1);
    assert_eq!(analytics.total_revenue, Money::from_cents(900));
    assert_eq!(analytics.popular_products.first().unwrap().id, mug.id);
}

#[tokio::test]
async fn test_rejected_shop_stays_hidden() {
    let h = Harness::new();

    let keeper = h.device("keeper");
    keeper
        .sign_up("keeper@example.test", "pw", Role::Shopkeeper)
        .await
        .unwrap();
    let shop = keeper
        .register_shop(shop_form("Back Alley Imports"))
        .await
        .unwrap();

    let admin = h.device("admin");
    admin
        .sign_up("admin@example.test", "pw", Role::Admin)
        .await
        .unwrap();
    admin
        .moderate_shop(shop.id, ShopStatus::Rejected)
        .await
        .unwrap();

    assert!(admin.browse_shops().await.unwrap().is_empty());
    assert!(admin.pending_shops().await.unwrap().is_empty());

    // The shopkeeper still sees the verdict in their own list.
    keeper
        .sign_in("keeper@example.test", "pw")
        .await
        .unwrap();
    let mine = keeper.my_shops().await.unwrap();
    assert_eq!(mine.first().unwrap().status, ShopStatus::Rejected);
}

#[tokio::test]
async fn test_moderation_requires_admin_role() {
    let h = Harness::new();

    let keeper = h.device("keeper");
    keeper
        .sign_up("keeper@example.test", "pw", Role::Shopkeeper)
        .await
        .unwrap();
    let shop = keeper
        .register_shop(shop_form("Corner Pottery"))
        .await
        .unwrap();

    let err = keeper.pending_shops().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Authz(AuthzError::RoleRequired {
            required: Role::Admin,
            actual: Role::Shopkeeper,
        })
    ));

    let err = keeper
        .moderate_shop(shop.id, ShopStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Authz(_)));
}

// =============================================================================
// Ownership
// =============================================================================

#[tokio::test]
async fn test_ownership_guards_across_shopkeepers() {
    let h = Harness::new();

    let alice = h.device("alice");
    alice
        .sign_up("alice@example.test", "pw", Role::Shopkeeper)
        .await
        .unwrap();
    let shop = alice
        .register_shop(shop_form("Corner Pottery"))
        .await
        .unwrap();
    let mug = alice
        .create_product(product_draft(shop.id, "Mug", 900, 10))
        .await
        .unwrap();

    let bob = h.device("bob");
    bob.sign_up("bob@example.test", "pw", Role::Shopkeeper)
        .await
        .unwrap();

    let err = bob
        .create_product(product_draft(shop.id, "Counterfeit Mug", 100, 99))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Authz(AuthzError::NotShopOwner { .. })
    ));

    let patch = ProductPatch {
        price: Some(Money::from_cents(1)),
        ..ProductPatch::default()
    };
    let err = bob.update_product(mug.id, &patch).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Authz(AuthzError::NotShopOwner { .. })
    ));

    let err = bob.shop_orders(shop.id).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Authz(AuthzError::NotShopOwner { .. })
    ));
}

#[tokio::test]
async fn test_product_crud_roundtrip() {
    let h = Harness::new();

    let keeper = h.device("keeper");
    keeper
        .sign_up("keeper@example.test", "pw", Role::Shopkeeper)
        .await
        .unwrap();
    let shop = keeper
        .register_shop(shop_form("Corner Pottery"))
        .await
        .unwrap();
    let mug = keeper
        .create_product(product_draft(shop.id, "Mug", 900, 10))
        .await
        .unwrap();

    let patch = ProductPatch {
        price: Some(Money::from_cents(1100)),
        stock: Some(25),
        ..ProductPatch::default()
    };
    let updated = keeper.update_product(mug.id, &patch).await.unwrap();
    assert_eq!(updated.price, Money::from_cents(1100));
    assert_eq!(updated.stock, 25);
    assert_eq!(updated.title, "Mug");

    let page = keeper.shop_page(shop.id).await.unwrap();
    assert_eq!(page.products.len(), 1);
    assert_eq!(
        page.products.first().unwrap().price,
        Money::from_cents(1100)
    );

    keeper.delete_product(mug.id).await.unwrap();
    let page = keeper.shop_page(shop.id).await.unwrap();
    assert!(page.products.is_empty());
}
