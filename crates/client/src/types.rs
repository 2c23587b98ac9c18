//! Domain rows and write drafts.
//!
//! Row structs mirror the backend tables one to one and derive both
//! `Serialize` and `Deserialize`: reads come back from the backend,
//! and the cart file persists [`CartLine`] rows verbatim (including
//! the embedded product snapshot). Write drafts are the insert/patch
//! payloads; the backend issues ids and timestamps except where a
//! client-generated id is the point (cart lines, checkout tokens).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopconnect_core::{
    define_id, CartLineId, Email, Money, OrderId, OrderLineId, OrderStatus, ProductId, Role,
    SessionId, ShopId, ShopStatus, UserId,
};

define_id!(CheckoutToken);

// ============================================================================
// Catalog
// ============================================================================

/// A shop on the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub image_url: Option<String>,
    pub status: ShopStatus,
    pub shopkeeper_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A product listed by a shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Cart
// ============================================================================

/// One line in a cart.
///
/// The line id is minted client-side so the local copy and the server
/// mirror agree on identity. `product` is a point-in-time snapshot used
/// for offline display; authoritative price and stock always come from
/// the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub quantity: u32,
    pub customer_id: Option<UserId>,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub product: Option<Product>,
}

impl CartLine {
    /// Line subtotal from the embedded snapshot.
    ///
    /// A missing snapshot counts as zero; callers that care log it.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.product
            .as_ref()
            .map_or(Money::ZERO, |p| p.price.times(self.quantity))
    }
}

// ============================================================================
// Orders
// ============================================================================

/// A placed order, scoped to a single shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub shop_id: ShopId,
    pub customer_id: Option<UserId>,
    pub customer_name: String,
    pub customer_email: Email,
    pub customer_phone: String,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub checkout_token: CheckoutToken,
    pub created_at: DateTime<Utc>,
}

/// One line of a placed order. `price` is the unit price captured at
/// checkout time; later catalog edits do not touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

/// A resolved authenticated session.
///
/// The role is resolved exactly once, when the session is established.
/// Accounts whose role claim is missing or unknown fail to establish a
/// session instead of limping along with a guessed role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub email: Email,
    pub role: Role,
}

/// Contact details collected at checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyerDetails {
    pub name: String,
    pub email: Email,
    pub phone: String,
}

// ============================================================================
// Write drafts
// ============================================================================

/// Insert payload for a new order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDraft {
    pub shop_id: ShopId,
    pub customer_id: Option<UserId>,
    pub customer_name: String,
    pub customer_email: Email,
    pub customer_phone: String,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub checkout_token: CheckoutToken,
}

/// Insert payload for one order line.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLineDraft {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// Shop registration form, as filled in by a shopkeeper.
#[derive(Debug, Clone)]
pub struct NewShop {
    pub name: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

/// Insert payload for a shop. Status and owner are set by the client,
/// never taken from the form.
#[derive(Debug, Clone, Serialize)]
pub struct ShopDraft {
    pub name: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub status: ShopStatus,
    pub shopkeeper_id: UserId,
}

/// Insert payload for a product.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDraft {
    pub shop_id: ShopId,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Partial update for a product. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

// ============================================================================
// Analytics
// ============================================================================

/// Dashboard aggregates for one shop, computed client-side from the
/// shop's rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopAnalytics {
    pub total_products: usize,
    pub total_orders: usize,
    pub total_revenue: Money,
    pub recent_orders: Vec<Order>,
    pub popular_products: Vec<Product>,
}
