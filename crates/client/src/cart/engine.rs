//! Pure cart state transitions.
//!
//! No I/O here: [`CartState`] is owned by the [`super::Cart`] handle,
//! which persists and mirrors it after every mutation. Keeping the
//! transitions synchronous makes every rule in this file directly
//! testable.

use chrono::Utc;
use shopconnect_core::{CartLineId, Money, ProductId, SessionId, UserId};
use tracing::{debug, warn};

use crate::types::{CartLine, Product};

/// The cart itself: an anonymous session id plus its lines.
///
/// The session id survives `clear`, so an anonymous shopper keeps one
/// identity for the lifetime of the cart file.
#[derive(Debug, Clone)]
pub struct CartState {
    session_id: SessionId,
    lines: Vec<CartLine>,
}

impl CartState {
    #[must_use]
    pub const fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            lines: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_parts(session_id: SessionId, lines: Vec<CartLine>) -> Self {
        Self { session_id, lines }
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Quantity of one product, zero when absent.
    #[must_use]
    pub fn quantity_of(&self, product: ProductId) -> u32 {
        self.lines
            .iter()
            .find(|line| line.product_id == product)
            .map_or(0, |line| line.quantity)
    }

    /// Add `quantity` of a product.
    ///
    /// An existing line for the product is merged: the quantity grows
    /// and the stored snapshot is refreshed to the product row the
    /// caller just fetched. A zero quantity changes nothing.
    pub fn add_item(&mut self, product: &Product, quantity: u32, customer: Option<UserId>) {
        if quantity == 0 {
            debug!(product_id = %product.id, "ignoring zero-quantity add");
            return;
        }

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            line.quantity = line.quantity.saturating_add(quantity);
            line.product = Some(product.clone());
            return;
        }

        self.lines.push(CartLine {
            id: CartLineId::generate(),
            product_id: product.id,
            shop_id: product.shop_id,
            quantity,
            customer_id: customer,
            session_id: self.session_id,
            created_at: Utc::now(),
            product: Some(product.clone()),
        });
    }

    /// Drop the line for a product. Absent products are a no-op.
    pub fn remove_item(&mut self, product: ProductId) {
        self.lines.retain(|line| line.product_id != product);
    }

    /// Set the quantity for a product's line. Zero or negative removes
    /// the line; absent products are a no-op.
    pub fn update_quantity(&mut self, product: ProductId, quantity: i64) {
        if quantity <= 0 {
            self.remove_item(product);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product) {
            line.quantity = quantity;
        }
    }

    /// Empty the cart, keeping the session id.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Stamp every line with the owning customer (or back to none).
    pub fn assign_owner(&mut self, customer: Option<UserId>) {
        for line in &mut self.lines {
            line.customer_id = customer;
        }
    }

    /// Replace the lines wholesale, e.g. from the server mirror. The
    /// local session id is kept.
    pub fn replace_lines(&mut self, lines: Vec<CartLine>) {
        self.lines = lines;
    }

    /// Cart total from the line snapshots. Lines without a snapshot
    /// count as zero.
    #[must_use]
    pub fn total(&self) -> Money {
        self.lines
            .iter()
            .map(|line| {
                if line.product.is_none() {
                    warn!(
                        product_id = %line.product_id,
                        "cart line has no product snapshot, counting zero"
                    );
                }
                line.subtotal()
            })
            .sum()
    }
}
