//! The application context view layers drive.
//!
//! [`AppState`] wires one backend into the local cart, the checkout
//! orchestrator, and the background sync worker, and exposes the
//! operations the storefront, shopkeeper, and admin surfaces call.
//! Privileged operations re-read the session and pass through
//! [`crate::authz`] before touching the backend.

use std::sync::Arc;

use shopconnect_core::{Email, OrderId, OrderStatus, ProductId, Role, ShopId, ShopStatus, UserId};
use tokio::task::JoinHandle;
use tracing::{instrument, warn};

use crate::authz::{require_role, require_shop_owner};
use crate::backend::{Backend, Catalog, CartStore, Merchandising, OrderStore, SessionStore};
use crate::cart::{drain_once, spawn_sync_worker, Cart, CartStorage, Outbox};
use crate::checkout::{CheckoutOrchestrator, CheckoutReceipt};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{
    BuyerDetails, CheckoutToken, Identity, NewShop, Order, OrderLine, Product, ProductDraft,
    ProductPatch, Shop, ShopAnalytics, ShopDraft,
};

/// A shop and its catalog, as one page load.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopPage {
    pub shop: Shop,
    pub products: Vec<Product>,
}

/// Application-wide context, one per running client.
///
/// Cheap to clone; all clones share the cart, the outbox, and the
/// session. The sync worker stops when the last clone drops.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppShared>,
}

struct AppShared {
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn Catalog>,
    cart_store: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    merchandising: Arc<dyn Merchandising>,
    cart: Cart,
    outbox: Arc<Outbox>,
    checkout: CheckoutOrchestrator,
    sync_worker: JoinHandle<()>,
}

impl Drop for AppShared {
    fn drop(&mut self) {
        self.sync_worker.abort();
    }
}

impl AppState {
    /// Build the context around one backend.
    ///
    /// Restores the cart file named by `config` and spawns the sync
    /// worker, so this must run inside a tokio runtime.
    #[must_use]
    pub fn new<B>(config: &ClientConfig, backend: Arc<B>) -> Self
    where
        B: Backend + 'static,
    {
        let sessions: Arc<dyn SessionStore> = backend.clone();
        let catalog: Arc<dyn Catalog> = backend.clone();
        let cart_store: Arc<dyn CartStore> = backend.clone();
        let orders: Arc<dyn OrderStore> = backend.clone();
        let merchandising: Arc<dyn Merchandising> = backend;

        let outbox = Arc::new(Outbox::new());
        let cart = Cart::open(CartStorage::new(&config.cart_path), Arc::clone(&outbox));
        let checkout = CheckoutOrchestrator::new(
            Arc::clone(&catalog),
            Arc::clone(&orders),
            config.stock_retries,
        );
        let sync_worker =
            spawn_sync_worker(Arc::clone(&outbox), Arc::clone(&cart_store), config.sync);

        Self {
            inner: Arc::new(AppShared {
                sessions,
                catalog,
                cart_store,
                orders,
                merchandising,
                cart,
                outbox,
                checkout,
                sync_worker,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Who is signed in, if anyone.
    pub async fn identity(&self) -> Option<Identity> {
        self.inner.sessions.current_identity().await
    }

    /// A handle on the local cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.inner.cart.clone()
    }

    /// Create an account, start its session, and adopt its (empty)
    /// server-side cart.
    ///
    /// # Errors
    ///
    /// Invalid email, or the account service rejecting the sign-up.
    #[instrument(skip_all)]
    pub async fn sign_up(&self, email: &str, password: &str, role: Role) -> Result<Identity> {
        let email = Email::parse(email)?;
        let identity = self.inner.sessions.sign_up(&email, password, role).await?;
        self.attach_cart(identity.user_id).await;
        Ok(identity)
    }

    /// Sign in and adopt the account's server-side cart.
    ///
    /// The server mirror replaces the local cart wholesale. When the
    /// mirror cannot be read the sign-in still succeeds with the local
    /// cart kept; [`AppState::load_cart_from_database`] retries it.
    ///
    /// # Errors
    ///
    /// Invalid email or rejected credentials.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let email = Email::parse(email)?;
        let identity = self.inner.sessions.sign_in(&email, password).await?;
        self.attach_cart(identity.user_id).await;
        Ok(identity)
    }

    /// End the session. The local cart is kept, detached from the
    /// customer.
    ///
    /// # Errors
    ///
    /// Propagates session teardown failures.
    pub async fn sign_out(&self) -> Result<()> {
        self.inner.sessions.sign_out().await?;
        self.inner.cart.unbind_customer().await;
        Ok(())
    }

    async fn attach_cart(&self, customer: UserId) {
        self.inner.cart.bind_customer(customer).await;
        if let Err(e) = self
            .inner
            .cart
            .load_from_database(self.inner.cart_store.as_ref(), customer)
            .await
        {
            warn!(error = %e, "cart hydrate failed, keeping local cart");
        }
    }

    // ------------------------------------------------------------------
    // Cart sync
    // ------------------------------------------------------------------

    /// Re-fetch the signed-in customer's cart mirror, replacing the
    /// local cart.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSignedIn`], or the mirror read failing; the
    /// local cart is untouched on failure.
    pub async fn load_cart_from_database(&self) -> Result<()> {
        let identity = self.identity().await.ok_or(ClientError::NotSignedIn)?;
        self.inner
            .cart
            .load_from_database(self.inner.cart_store.as_ref(), identity.user_id)
            .await?;
        Ok(())
    }

    /// Deliver pending cart sync intents now instead of waiting for
    /// the worker. Returns how many this call delivered.
    ///
    /// # Errors
    ///
    /// The transient error that stopped the drain; the failed intent
    /// stays queued for the worker.
    pub async fn flush_cart_sync(&self) -> Result<usize> {
        Ok(drain_once(&self.inner.outbox, self.inner.cart_store.as_ref()).await?)
    }

    // ------------------------------------------------------------------
    // Browsing
    // ------------------------------------------------------------------

    /// The shops customers may see.
    ///
    /// # Errors
    ///
    /// Propagates catalog read failures.
    pub async fn browse_shops(&self) -> Result<Vec<Shop>> {
        Ok(self
            .inner
            .catalog
            .shops_by_status(ShopStatus::Approved)
            .await?)
    }

    /// One shop together with its products.
    ///
    /// # Errors
    ///
    /// Propagates catalog read failures, including an unknown shop.
    pub async fn shop_page(&self, shop_id: ShopId) -> Result<ShopPage> {
        let shop = self.inner.catalog.shop(shop_id).await?;
        let products = self.inner.catalog.products_by_shop(shop_id).await?;
        Ok(ShopPage { shop, products })
    }

    /// Add a product to the cart, clamped to its live stock.
    ///
    /// # Errors
    ///
    /// [`ClientError::OutOfStock`] when nothing is left;
    /// [`ClientError::StockLimitReached`] when the cart plus `quantity`
    /// would exceed what the shop has.
    #[instrument(skip(self), fields(%product_id, quantity))]
    pub async fn add_to_cart(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let product = self.inner.catalog.product(product_id).await?;
        if product.stock == 0 {
            return Err(ClientError::OutOfStock { product_id });
        }
        let in_cart = self.inner.cart.quantity_of(product_id).await;
        if in_cart.saturating_add(quantity) > product.stock {
            return Err(ClientError::StockLimitReached {
                product_id,
                available: product.stock.saturating_sub(in_cart),
            });
        }
        self.inner.cart.add_item(&product, quantity).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checkout and orders
    // ------------------------------------------------------------------

    /// Check out the whole cart under a fresh token.
    ///
    /// # Errors
    ///
    /// See [`crate::checkout::CheckoutError`]; on failure the cart is
    /// kept so [`AppState::resume_checkout`] can pick the attempt up.
    pub async fn checkout(&self, buyer: &BuyerDetails) -> Result<CheckoutReceipt> {
        self.run_checkout(buyer, CheckoutToken::generate()).await
    }

    /// Retry a failed checkout under its original token. Orders the
    /// failed attempt already placed are skipped, not duplicated.
    ///
    /// # Errors
    ///
    /// As [`AppState::checkout`].
    pub async fn resume_checkout(
        &self,
        token: CheckoutToken,
        buyer: &BuyerDetails,
    ) -> Result<CheckoutReceipt> {
        self.run_checkout(buyer, token).await
    }

    async fn run_checkout(
        &self,
        buyer: &BuyerDetails,
        token: CheckoutToken,
    ) -> Result<CheckoutReceipt> {
        let lines = self.inner.cart.lines().await;
        let customer = self.inner.cart.customer().await;
        let receipt = self
            .inner
            .checkout
            .checkout(buyer, customer, &lines, token)
            .await?;
        // Only a fully placed checkout empties the cart; a failed one
        // keeps it for the resume.
        self.inner.cart.clear().await;
        Ok(receipt)
    }

    /// The signed-in customer's order history, newest first.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSignedIn`] without a session.
    pub async fn my_orders(&self) -> Result<Vec<Order>> {
        let identity = self.identity().await.ok_or(ClientError::NotSignedIn)?;
        Ok(self
            .inner
            .orders
            .orders_by_customer(identity.user_id)
            .await?)
    }

    /// The lines of one order, readable by its customer or by the
    /// owner of the shop it was placed with.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSignedIn`], an authorization rejection, or a
    /// backend read failure.
    pub async fn order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let identity = self.identity().await.ok_or(ClientError::NotSignedIn)?;
        let order = self.inner.orders.order(order_id).await?;
        if order.customer_id != Some(identity.user_id) {
            let shop = self.inner.catalog.shop(order.shop_id).await?;
            require_shop_owner(&identity, &shop)?;
        }
        Ok(self.inner.orders.order_lines(order_id).await?)
    }

    // ------------------------------------------------------------------
    // Shopkeeper
    // ------------------------------------------------------------------

    /// Register a shop. It stays invisible to customers until an admin
    /// approves it.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper.
    #[instrument(skip(self, form))]
    pub async fn register_shop(&self, form: NewShop) -> Result<Shop> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        let draft = ShopDraft {
            name: form.name,
            description: form.description,
            category: form.category,
            address: form.address,
            phone: form.phone,
            email: form.email,
            status: ShopStatus::Pending,
            shopkeeper_id: identity.user_id,
        };
        Ok(self.inner.merchandising.register_shop(&draft).await?)
    }

    /// Shops registered by the signed-in shopkeeper, any status.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper.
    pub async fn my_shops(&self) -> Result<Vec<Shop>> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        Ok(self.inner.catalog.shops_by_owner(identity.user_id).await?)
    }

    /// List a product in one of the caller's shops.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper owning `draft.shop_id`.
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        self.owned_shop(identity, draft.shop_id).await?;
        Ok(self.inner.merchandising.create_product(&draft).await?)
    }

    /// Update fields of one of the caller's products.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper owning the product's shop.
    pub async fn update_product(
        &self,
        product_id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        let product = self.inner.catalog.product(product_id).await?;
        self.owned_shop(identity, product.shop_id).await?;
        Ok(self
            .inner
            .merchandising
            .update_product(product_id, patch)
            .await?)
    }

    /// Delist one of the caller's products.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper owning the product's shop.
    pub async fn delete_product(&self, product_id: ProductId) -> Result<()> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        let product = self.inner.catalog.product(product_id).await?;
        self.owned_shop(identity, product.shop_id).await?;
        Ok(self.inner.merchandising.delete_product(product_id).await?)
    }

    /// Orders placed with one of the caller's shops, newest first.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper owning `shop_id`.
    pub async fn shop_orders(&self, shop_id: ShopId) -> Result<Vec<Order>> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        self.owned_shop(identity, shop_id).await?;
        Ok(self.inner.orders.orders_by_shop(shop_id).await?)
    }

    /// Advance an order through its lifecycle.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidStatusTransition`] when the move breaks
    /// the order state machine; ownership and role rejections as the
    /// other shopkeeper operations.
    #[instrument(skip(self), fields(%order_id, %next))]
    pub async fn set_order_status(&self, order_id: OrderId, next: OrderStatus) -> Result<Order> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        let order = self.inner.orders.order(order_id).await?;
        self.owned_shop(identity, order.shop_id).await?;
        if !order.status.can_transition(next) {
            return Err(ClientError::InvalidStatusTransition {
                from: order.status,
                to: next,
            });
        }
        Ok(self.inner.orders.update_order_status(order_id, next).await?)
    }

    /// Dashboard numbers for one shop, computed from plain reads.
    /// Cancelled orders count toward volume but not revenue.
    ///
    /// # Errors
    ///
    /// Requires a signed-in shopkeeper owning `shop_id`.
    pub async fn shop_analytics(&self, shop_id: ShopId) -> Result<ShopAnalytics> {
        let identity = self.identity().await;
        let identity = require_role(identity.as_ref(), Role::Shopkeeper)?;
        let shop = self.owned_shop(identity, shop_id).await?;

        let products = self.inner.catalog.products_by_shop(shop.id).await?;
        let orders = self.inner.orders.orders_by_shop(shop.id).await?;
        let lines = self.inner.orders.order_lines_for_shop(shop.id).await?;

        let total_revenue = orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .map(|o| o.total_amount)
            .sum();

        let mut sold: Vec<(ProductId, u64)> = Vec::new();
        for line in &lines {
            match sold.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, count)) => *count += u64::from(line.quantity),
                None => sold.push((line.product_id, u64::from(line.quantity))),
            }
        }
        sold.sort_by(|a, b| b.1.cmp(&a.1));
        let popular_products = sold
            .iter()
            .take(5)
            .filter_map(|(id, _)| products.iter().find(|p| p.id == *id).cloned())
            .collect();

        Ok(ShopAnalytics {
            total_products: products.len(),
            total_orders: orders.len(),
            total_revenue,
            recent_orders: orders.into_iter().take(5).collect(),
            popular_products,
        })
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// Registrations waiting for a verdict.
    ///
    /// # Errors
    ///
    /// Requires a signed-in admin.
    pub async fn pending_shops(&self) -> Result<Vec<Shop>> {
        let identity = self.identity().await;
        require_role(identity.as_ref(), Role::Admin)?;
        Ok(self
            .inner
            .catalog
            .shops_by_status(ShopStatus::Pending)
            .await?)
    }

    /// Approve or reject a pending registration.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidModeration`] when the verdict is
    /// `Pending`; requires a signed-in admin.
    #[instrument(skip(self), fields(%shop_id, %verdict))]
    pub async fn moderate_shop(&self, shop_id: ShopId, verdict: ShopStatus) -> Result<Shop> {
        let identity = self.identity().await;
        require_role(identity.as_ref(), Role::Admin)?;
        if verdict == ShopStatus::Pending {
            return Err(ClientError::InvalidModeration { status: verdict });
        }
        Ok(self
            .inner
            .merchandising
            .set_shop_status(shop_id, verdict)
            .await?)
    }

    async fn owned_shop(&self, identity: &Identity, shop_id: ShopId) -> Result<Shop> {
        let shop = self.inner.catalog.shop(shop_id).await?;
        require_shop_owner(identity, &shop)?;
        Ok(shop)
    }
}
