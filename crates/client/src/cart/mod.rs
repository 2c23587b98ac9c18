//! The local-first shopping cart.
//!
//! [`Cart`] is a cheap-to-clone handle over shared state. Mutations
//! apply to the in-memory [`CartState`] first, then write the cart
//! file, then (for a signed-in customer) enqueue a mirror write on the
//! [`Outbox`]. The cart file failing to write is logged and tolerated;
//! the local state is still authoritative for this device.
//!
//! Nothing here reaches the network directly. The mirror is drained by
//! the worker in [`sync`], and [`Cart::load_from_database`] is handed a
//! store by the caller when sign-in replaces the local cart.

pub mod engine;
pub mod storage;
pub mod sync;

pub use engine::CartState;
pub use storage::{CartStorage, StorageError, StoredCart};
pub use sync::{drain_once, spawn_sync_worker, Outbox, SyncIntent};

use std::sync::Arc;

use shopconnect_core::{Money, ProductId, SessionId, UserId};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::{BackendError, CartStore};
use crate::types::{CartLine, Product};

/// Shared cart handle.
#[derive(Clone)]
pub struct Cart {
    inner: Arc<CartShared>,
}

struct CartShared {
    cell: Mutex<CartCell>,
    storage: Option<CartStorage>,
    outbox: Arc<Outbox>,
}

struct CartCell {
    state: CartState,
    customer: Option<UserId>,
}

impl Cart {
    /// Open the cart backed by a file, restoring any stored state.
    ///
    /// An unreadable or corrupt file is logged and replaced by a fresh
    /// cart on the next write.
    #[must_use]
    pub fn open(storage: CartStorage, outbox: Arc<Outbox>) -> Self {
        let state = match storage.load() {
            Ok(Some(stored)) => {
                info!(items = stored.items.len(), "cart restored from disk");
                CartState::from_parts(stored.session_id, stored.items)
            }
            Ok(None) => CartState::new(SessionId::generate()),
            Err(e) => {
                warn!(error = %e, "cart file unreadable, starting fresh");
                CartState::new(SessionId::generate())
            }
        };

        Self {
            inner: Arc::new(CartShared {
                cell: Mutex::new(CartCell {
                    state,
                    customer: None,
                }),
                storage: Some(storage),
                outbox,
            }),
        }
    }

    /// A cart with no backing file. Used by tests and short-lived
    /// tools that have nowhere to persist.
    #[must_use]
    pub fn in_memory(outbox: Arc<Outbox>) -> Self {
        Self {
            inner: Arc::new(CartShared {
                cell: Mutex::new(CartCell {
                    state: CartState::new(SessionId::generate()),
                    customer: None,
                }),
                storage: None,
                outbox,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub async fn add_item(&self, product: &Product, quantity: u32) {
        let mut cell = self.inner.cell.lock().await;
        let customer = cell.customer;
        cell.state.add_item(product, quantity, customer);
        let intent = self.persist_and_intent(&cell);
        drop(cell);
        self.push_intent(intent).await;
    }

    pub async fn remove_item(&self, product: ProductId) {
        let mut cell = self.inner.cell.lock().await;
        cell.state.remove_item(product);
        let intent = self.persist_and_intent(&cell);
        drop(cell);
        self.push_intent(intent).await;
    }

    pub async fn update_quantity(&self, product: ProductId, quantity: i64) {
        let mut cell = self.inner.cell.lock().await;
        cell.state.update_quantity(product, quantity);
        let intent = self.persist_and_intent(&cell);
        drop(cell);
        self.push_intent(intent).await;
    }

    /// Empty the cart. The mirror is cleared through the outbox rather
    /// than inline, so an unreachable backend cannot block this.
    pub async fn clear(&self) {
        let mut cell = self.inner.cell.lock().await;
        cell.state.clear();
        self.persist(&cell);
        let intent = cell
            .customer
            .map(|customer| SyncIntent::Clear { customer });
        drop(cell);
        self.push_intent(intent).await;
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Attach the cart to a signed-in customer.
    ///
    /// Does not enqueue a mirror write: sign-in follows up with
    /// [`Cart::load_from_database`], and pushing the local lines first
    /// would overwrite the server cart before it was read.
    pub async fn bind_customer(&self, customer: UserId) {
        let mut cell = self.inner.cell.lock().await;
        cell.customer = Some(customer);
        cell.state.assign_owner(Some(customer));
        self.persist(&cell);
    }

    /// Detach from the customer on sign-out. Local lines are kept; the
    /// mirror keeps whatever was last synced.
    pub async fn unbind_customer(&self) {
        let mut cell = self.inner.cell.lock().await;
        cell.customer = None;
        cell.state.assign_owner(None);
        self.persist(&cell);
    }

    /// Replace the local cart with the customer's server mirror.
    ///
    /// On fetch failure the local cart is untouched and the error is
    /// returned; the caller may retry.
    ///
    /// # Errors
    ///
    /// Propagates the mirror read failure.
    pub async fn load_from_database(
        &self,
        store: &dyn CartStore,
        customer: UserId,
    ) -> Result<(), BackendError> {
        let rows = store.cart_rows(customer).await?;
        let mut cell = self.inner.cell.lock().await;
        info!(rows = rows.len(), "cart replaced from server mirror");
        cell.state.replace_lines(rows);
        cell.state.assign_owner(Some(customer));
        self.persist(&cell);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn lines(&self) -> Vec<CartLine> {
        self.inner.cell.lock().await.state.lines().to_vec()
    }

    pub async fn total(&self) -> Money {
        self.inner.cell.lock().await.state.total()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.cell.lock().await.state.is_empty()
    }

    pub async fn item_count(&self) -> u32 {
        self.inner.cell.lock().await.state.item_count()
    }

    pub async fn quantity_of(&self, product: ProductId) -> u32 {
        self.inner.cell.lock().await.state.quantity_of(product)
    }

    pub async fn session_id(&self) -> SessionId {
        self.inner.cell.lock().await.state.session_id()
    }

    pub async fn customer(&self) -> Option<UserId> {
        self.inner.cell.lock().await.customer
    }

    /// Mirror writes still waiting to be delivered.
    pub async fn sync_pending(&self) -> usize {
        self.inner.outbox.len().await
    }

    /// The most recent sync delivery error, if any.
    pub async fn last_sync_error(&self) -> Option<String> {
        self.inner.outbox.last_error().await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn persist(&self, cell: &CartCell) {
        if let Some(storage) = &self.inner.storage {
            let stored = StoredCart {
                session_id: cell.state.session_id(),
                items: cell.state.lines().to_vec(),
            };
            if let Err(e) = storage.save(&stored) {
                warn!(error = %e, "cart file write failed");
            }
        }
    }

    fn persist_and_intent(&self, cell: &CartCell) -> Option<SyncIntent> {
        self.persist(cell);
        cell.customer.map(|customer| SyncIntent::Replace {
            customer,
            lines: cell.state.lines().to_vec(),
        })
    }

    async fn push_intent(&self, intent: Option<SyncIntent>) {
        if let Some(intent) = intent {
            self.inner.outbox.push(intent).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shopconnect_core::ShopId;

    fn product(cents: i64) -> Product {
        Product {
            id: ProductId::generate(),
            shop_id: ShopId::generate(),
            title: "Mug".to_string(),
            description: String::new(),
            price: Money::from_cents(cents),
            stock: 10,
            category: "homeware".to_string(),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_guest_mutations_enqueue_nothing() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(Arc::clone(&outbox));

        cart.add_item(&product(900), 2).await;
        cart.clear().await;

        assert!(outbox.is_empty().await);
    }

    #[tokio::test]
    async fn test_signed_in_mutations_enqueue_replace() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(Arc::clone(&outbox));
        let customer = UserId::generate();

        cart.bind_customer(customer).await;
        assert!(outbox.is_empty().await);

        cart.add_item(&product(900), 1).await;
        assert_eq!(outbox.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_enqueues_clear_intent() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(Arc::clone(&outbox));
        let customer = UserId::generate();

        cart.bind_customer(customer).await;
        cart.clear().await;

        let backend = crate::backend::MemoryBackend::new();
        let delivered = drain_once(&outbox, &backend).await.unwrap();
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_bound_cart_stamps_new_lines_with_customer() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(outbox);
        let customer = UserId::generate();

        cart.bind_customer(customer).await;
        cart.add_item(&product(900), 1).await;

        let lines = cart.lines().await;
        assert_eq!(lines.first().unwrap().customer_id, Some(customer));
    }

    #[tokio::test]
    async fn test_unbind_keeps_local_lines() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(outbox);
        let customer = UserId::generate();

        cart.bind_customer(customer).await;
        cart.add_item(&product(900), 2).await;
        cart.unbind_customer().await;

        assert_eq!(cart.item_count().await, 2);
        assert_eq!(cart.customer().await, None);
        assert!(cart.lines().await.first().unwrap().customer_id.is_none());
    }

    #[tokio::test]
    async fn test_load_from_database_replaces_local_lines() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(Arc::clone(&outbox));
        let backend = crate::backend::MemoryBackend::new();
        let customer = UserId::generate();

        // Local guest line that the server mirror will displace.
        cart.add_item(&product(900), 5).await;

        let owner = UserId::generate();
        let shop = backend
            .seed_shop(owner, "Corner Pottery", crate::ShopStatus::Approved)
            .await;
        let remote_product = backend
            .seed_product(shop.id, "Bowl", Money::from_cents(500), 9)
            .await;
        let row = CartLine {
            id: shopconnect_core::CartLineId::generate(),
            product_id: remote_product.id,
            shop_id: shop.id,
            quantity: 1,
            customer_id: Some(customer),
            session_id: SessionId::generate(),
            created_at: Utc::now(),
            product: None,
        };
        backend
            .replace_cart_rows(customer, std::slice::from_ref(&row))
            .await
            .unwrap();

        cart.bind_customer(customer).await;
        cart.load_from_database(&backend, customer).await.unwrap();

        let lines = cart.lines().await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.first().unwrap().product_id, remote_product.id);
        // Replacing from the mirror is not itself a mutation to sync.
        assert!(outbox.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_failure_leaves_local_cart_untouched() {
        let outbox = Arc::new(Outbox::new());
        let cart = Cart::in_memory(outbox);
        let backend = crate::backend::MemoryBackend::new();
        let customer = UserId::generate();

        cart.add_item(&product(900), 3).await;
        backend.fail_cart_reads(0, 1, 503).await;

        let err = cart.load_from_database(&backend, customer).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(cart.item_count().await, 3);
    }

    #[tokio::test]
    async fn test_open_restores_cart_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");

        let outbox = Arc::new(Outbox::new());
        let cart = Cart::open(CartStorage::new(&path), Arc::clone(&outbox));
        let mug = product(900);
        cart.add_item(&mug, 2).await;
        let session = cart.session_id().await;
        drop(cart);

        let reopened = Cart::open(CartStorage::new(&path), outbox);
        assert_eq!(reopened.session_id().await, session);
        assert_eq!(reopened.quantity_of(mug.id).await, 2);
        assert_eq!(reopened.total().await, Money::from_cents(1800));
    }
}
