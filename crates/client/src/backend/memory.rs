//! In-process backend used by tests and local demos.
//!
//! Rows live in plain maps behind one async mutex. Reads behave like
//! the REST backend where it matters: cart reads re-attach the current
//! product row as the snapshot, list reads come back newest first, and
//! the guarded stock write fails with [`BackendError::Conflict`] when
//! the expected value is stale.
//!
//! Failure gates let a test make the nth call of an operation fail
//! with a chosen status, which is how the retry and partial-failure
//! paths get exercised without a network.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use shopconnect_core::{
    Email, Money, OrderId, OrderLineId, OrderStatus, ProductId, Role, ShopId, ShopStatus, UserId,
};
use tokio::sync::Mutex;

use super::{
    BackendError, Catalog, CartStore, Merchandising, OrderStore, SessionStore,
};
use crate::types::{
    CartLine, CheckoutToken, Identity, Order, OrderDraft, OrderLine, OrderLineDraft, Product,
    ProductDraft, ProductPatch, Shop, ShopDraft,
};

// ============================================================================
// Failure gates
// ============================================================================

/// One failure window: let `skip` calls through, fail the next `fail`
/// calls with `status`, then disarm.
struct Gate {
    skip: u32,
    fail: u32,
    status: u16,
}

impl Gate {
    fn error_for(status: u16) -> BackendError {
        match status {
            401 | 403 => BackendError::Unauthorized,
            404 => BackendError::NotFound("injected".to_string()),
            409 => BackendError::Conflict,
            429 => BackendError::RateLimited(1),
            other => BackendError::Api {
                status: other,
                message: "injected failure".to_string(),
            },
        }
    }
}

fn trip(slot: &mut Option<Gate>) -> Result<(), BackendError> {
    let Some(gate) = slot.as_mut() else {
        return Ok(());
    };
    if gate.skip > 0 {
        gate.skip -= 1;
        return Ok(());
    }
    if gate.fail == 0 {
        *slot = None;
        return Ok(());
    }
    gate.fail -= 1;
    let status = gate.status;
    if gate.fail == 0 {
        *slot = None;
    }
    Err(Gate::error_for(status))
}

#[derive(Default)]
struct Gates {
    order_creates: Option<Gate>,
    order_lines: Option<Gate>,
    cart_reads: Option<Gate>,
    cart_writes: Option<Gate>,
    stock_updates: Option<Gate>,
}

// ============================================================================
// Tables
// ============================================================================

struct MemoryUser {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, MemoryUser>,
    session: Option<Identity>,
    shops: HashMap<ShopId, Shop>,
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Vec<CartLine>>,
    orders: HashMap<OrderId, Order>,
    order_lines: HashMap<OrderId, Vec<OrderLine>>,
    gates: Gates,
}

/// In-memory implementation of every backend trait.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub async fn seed_user(&self, email: Email, password: &str, role: Role) -> Identity {
        let identity = Identity {
            user_id: UserId::generate(),
            email,
            role,
        };
        let mut tables = self.tables.lock().await;
        tables.users.insert(
            identity.user_id,
            MemoryUser {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    pub async fn seed_shop(&self, shopkeeper: UserId, name: &str, status: ShopStatus) -> Shop {
        let shop = Shop {
            id: ShopId::generate(),
            name: name.to_string(),
            description: format!("{name} on ShopConnect"),
            category: "general".to_string(),
            address: "1 Market Street".to_string(),
            phone: "555-0100".to_string(),
            email: "owner@example.test".to_string(),
            image_url: None,
            status,
            shopkeeper_id: shopkeeper,
            created_at: Utc::now(),
        };
        self.tables.lock().await.shops.insert(shop.id, shop.clone());
        shop
    }

    pub async fn seed_product(
        &self,
        shop: ShopId,
        title: &str,
        price: Money,
        stock: u32,
    ) -> Product {
        let product = Product {
            id: ProductId::generate(),
            shop_id: shop,
            title: title.to_string(),
            description: String::new(),
            price,
            stock,
            category: "general".to_string(),
            image_url: None,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        product
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    pub async fn fail_order_creates(&self, skip: u32, fail: u32, status: u16) {
        self.tables.lock().await.gates.order_creates = Some(Gate { skip, fail, status });
    }

    pub async fn fail_order_lines(&self, skip: u32, fail: u32, status: u16) {
        self.tables.lock().await.gates.order_lines = Some(Gate { skip, fail, status });
    }

    pub async fn fail_cart_reads(&self, skip: u32, fail: u32, status: u16) {
        self.tables.lock().await.gates.cart_reads = Some(Gate { skip, fail, status });
    }

    /// Arms both `replace_cart_rows` and `clear_cart_rows`.
    pub async fn fail_cart_writes(&self, skip: u32, fail: u32, status: u16) {
        self.tables.lock().await.gates.cart_writes = Some(Gate { skip, fail, status });
    }

    pub async fn fail_stock_updates(&self, skip: u32, fail: u32, status: u16) {
        self.tables.lock().await.gates.stock_updates = Some(Gate { skip, fail, status });
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Raw mirror rows for a customer, without the snapshot join.
    pub async fn stored_cart(&self, customer: UserId) -> Vec<CartLine> {
        self.tables
            .lock()
            .await
            .carts
            .get(&customer)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub async fn product_stock(&self, id: ProductId) -> Option<u32> {
        self.tables
            .lock()
            .await
            .products
            .get(&id)
            .map(|p| p.stock)
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        role: Role,
    ) -> Result<Identity, BackendError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.identity.email == *email) {
            return Err(BackendError::Api {
                status: 422,
                message: "email already registered".to_string(),
            });
        }
        let identity = Identity {
            user_id: UserId::generate(),
            email: email.clone(),
            role,
        };
        tables.users.insert(
            identity.user_id,
            MemoryUser {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        tables.session = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, BackendError> {
        let mut tables = self.tables.lock().await;
        let identity = tables
            .users
            .values()
            .find(|u| u.identity.email == *email && u.password == password)
            .map(|u| u.identity.clone())
            .ok_or(BackendError::Unauthorized)?;
        tables.session = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.tables.lock().await.session = None;
        Ok(())
    }

    async fn current_identity(&self) -> Option<Identity> {
        self.tables.lock().await.session.clone()
    }
}

#[async_trait]
impl Catalog for MemoryBackend {
    async fn shops_by_status(&self, status: ShopStatus) -> Result<Vec<Shop>, BackendError> {
        let tables = self.tables.lock().await;
        let mut shops: Vec<Shop> = tables
            .shops
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        shops.sort_by_key(|s| Reverse(s.created_at));
        Ok(shops)
    }

    async fn shop(&self, id: ShopId) -> Result<Shop, BackendError> {
        self.tables
            .lock()
            .await
            .shops
            .get(&id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("shop {id}")))
    }

    async fn shops_by_owner(&self, owner: UserId) -> Result<Vec<Shop>, BackendError> {
        let tables = self.tables.lock().await;
        let mut shops: Vec<Shop> = tables
            .shops
            .values()
            .filter(|s| s.shopkeeper_id == owner)
            .cloned()
            .collect();
        shops.sort_by_key(|s| Reverse(s.created_at));
        Ok(shops)
    }

    async fn products_by_shop(&self, shop: ShopId) -> Result<Vec<Product>, BackendError> {
        let tables = self.tables.lock().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.shop_id == shop)
            .cloned()
            .collect();
        products.sort_by_key(|p| Reverse(p.created_at));
        Ok(products)
    }

    async fn product(&self, id: ProductId) -> Result<Product, BackendError> {
        self.tables
            .lock()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))
    }

    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: u32,
        next: u32,
    ) -> Result<Product, BackendError> {
        let mut tables = self.tables.lock().await;
        trip(&mut tables.gates.stock_updates)?;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;
        if product.stock != expected {
            return Err(BackendError::Conflict);
        }
        product.stock = next;
        Ok(product.clone())
    }
}

#[async_trait]
impl CartStore for MemoryBackend {
    async fn cart_rows(&self, customer: UserId) -> Result<Vec<CartLine>, BackendError> {
        let mut tables = self.tables.lock().await;
        trip(&mut tables.gates.cart_reads)?;
        let mut rows = tables.carts.get(&customer).cloned().unwrap_or_default();
        for row in &mut rows {
            row.product = tables.products.get(&row.product_id).cloned();
        }
        Ok(rows)
    }

    async fn replace_cart_rows(
        &self,
        customer: UserId,
        lines: &[CartLine],
    ) -> Result<(), BackendError> {
        let mut tables = self.tables.lock().await;
        trip(&mut tables.gates.cart_writes)?;
        let rows: Vec<CartLine> = lines
            .iter()
            .cloned()
            .map(|mut line| {
                line.customer_id = Some(customer);
                line
            })
            .collect();
        tables.carts.insert(customer, rows);
        Ok(())
    }

    async fn clear_cart_rows(&self, customer: UserId) -> Result<(), BackendError> {
        let mut tables = self.tables.lock().await;
        trip(&mut tables.gates.cart_writes)?;
        tables.carts.remove(&customer);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryBackend {
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, BackendError> {
        let mut tables = self.tables.lock().await;
        trip(&mut tables.gates.order_creates)?;
        let order = Order {
            id: OrderId::generate(),
            shop_id: draft.shop_id,
            customer_id: draft.customer_id,
            customer_name: draft.customer_name.clone(),
            customer_email: draft.customer_email.clone(),
            customer_phone: draft.customer_phone.clone(),
            total_amount: draft.total_amount,
            status: draft.status,
            checkout_token: draft.checkout_token,
            created_at: Utc::now(),
        };
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn create_order_lines(
        &self,
        drafts: &[OrderLineDraft],
    ) -> Result<Vec<OrderLine>, BackendError> {
        let mut tables = self.tables.lock().await;
        trip(&mut tables.gates.order_lines)?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let line = OrderLine {
                id: OrderLineId::generate(),
                order_id: draft.order_id,
                product_id: draft.product_id,
                quantity: draft.quantity,
                price: draft.price,
                created_at: Utc::now(),
            };
            tables
                .order_lines
                .entry(draft.order_id)
                .or_default()
                .push(line.clone());
            created.push(line);
        }
        Ok(created)
    }

    async fn find_order_by_token(
        &self,
        token: CheckoutToken,
        shop: ShopId,
    ) -> Result<Option<Order>, BackendError> {
        Ok(self
            .tables
            .lock()
            .await
            .orders
            .values()
            .find(|o| o.checkout_token == token && o.shop_id == shop)
            .cloned())
    }

    async fn order(&self, id: OrderId) -> Result<Order, BackendError> {
        self.tables
            .lock()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("order {id}")))
    }

    async fn order_lines(&self, order: OrderId) -> Result<Vec<OrderLine>, BackendError> {
        Ok(self
            .tables
            .lock()
            .await
            .order_lines
            .get(&order)
            .cloned()
            .unwrap_or_default())
    }

    async fn order_lines_for_shop(&self, shop: ShopId) -> Result<Vec<OrderLine>, BackendError> {
        let tables = self.tables.lock().await;
        let mut lines = Vec::new();
        for order in tables.orders.values().filter(|o| o.shop_id == shop) {
            if let Some(order_lines) = tables.order_lines.get(&order.id) {
                lines.extend(order_lines.iter().cloned());
            }
        }
        Ok(lines)
    }

    async fn orders_by_customer(&self, customer: UserId) -> Result<Vec<Order>, BackendError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.customer_id == Some(customer))
            .cloned()
            .collect();
        orders.sort_by_key(|o| Reverse(o.created_at));
        Ok(orders)
    }

    async fn orders_by_shop(&self, shop: ShopId) -> Result<Vec<Order>, BackendError> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.shop_id == shop)
            .cloned()
            .collect();
        orders.sort_by_key(|o| Reverse(o.created_at));
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, BackendError> {
        let mut tables = self.tables.lock().await;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("order {id}")))?;
        order.status = status;
        Ok(order.clone())
    }
}

#[async_trait]
impl Merchandising for MemoryBackend {
    async fn register_shop(&self, draft: &ShopDraft) -> Result<Shop, BackendError> {
        let shop = Shop {
            id: ShopId::generate(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            category: draft.category.clone(),
            address: draft.address.clone(),
            phone: draft.phone.clone(),
            email: draft.email.clone(),
            image_url: None,
            status: draft.status,
            shopkeeper_id: draft.shopkeeper_id,
            created_at: Utc::now(),
        };
        self.tables.lock().await.shops.insert(shop.id, shop.clone());
        Ok(shop)
    }

    async fn set_shop_status(&self, id: ShopId, status: ShopStatus) -> Result<Shop, BackendError> {
        let mut tables = self.tables.lock().await;
        let shop = tables
            .shops
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("shop {id}")))?;
        shop.status = status;
        Ok(shop.clone())
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<Product, BackendError> {
        let product = Product {
            id: ProductId::generate(),
            shop_id: draft.shop_id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            price: draft.price,
            stock: draft.stock,
            category: draft.category.clone(),
            image_url: draft.image_url.clone(),
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError> {
        let mut tables = self.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;
        if let Some(title) = &patch.title {
            product.title = title.clone();
        }
        if let Some(description) = &patch.description {
            product.description = description.clone();
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(stock) = patch.stock {
            product.stock = stock;
        }
        if let Some(category) = &patch.category {
            product.category = category.clone();
        }
        if let Some(image_url) = &patch.image_url {
            product.image_url = Some(image_url.clone());
        }
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), BackendError> {
        self.tables.lock().await.products.remove(&id);
        Ok(())
    }
}
