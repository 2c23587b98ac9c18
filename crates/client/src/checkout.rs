//! Checkout across one or more shops.
//!
//! A cart can span shops, but an order belongs to exactly one shop, so
//! checkout walks the cart's shop groups in first-seen order and
//! places one order per group: order row, then its lines, then a
//! compare-and-swap per line to settle stock.
//!
//! The whole attempt is keyed by a client-generated [`CheckoutToken`].
//! Every order row records it, and each group starts by asking whether
//! an order for this token already exists. A failed attempt can
//! therefore be retried with the same token and lines: fully placed
//! groups are skipped, and an order left without lines by an earlier
//! crash is completed rather than duplicated.
//!
//! Stock settlement is deliberately non-fatal. The order exists the
//! moment its rows do; a product whose stock could not be decremented
//! is reported as a [`StockWarning`] for the shopkeeper to reconcile.

use std::sync::Arc;

use shopconnect_core::{Money, OrderStatus, ProductId, ShopId, UserId};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, Catalog, OrderStore};
use crate::types::{
    BuyerDetails, CartLine, CheckoutToken, Order, OrderDraft, OrderLine, OrderLineDraft,
};

// ============================================================================
// Results
// ============================================================================

/// One order that checkout placed (or found already placed).
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// A product whose stock could not be settled.
#[derive(Debug, Clone, PartialEq)]
pub struct StockWarning {
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub requested: u32,
    pub detail: String,
}

impl StockWarning {
    fn new(line: &CartLine, detail: String) -> Self {
        Self {
            product_id: line.product_id,
            shop_id: line.shop_id,
            requested: line.quantity,
            detail,
        }
    }
}

/// The outcome of a completed checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub token: CheckoutToken,
    pub orders: Vec<PlacedOrder>,
    pub grand_total: Money,
    pub stock_warnings: Vec<StockWarning>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    /// Placing the order (or its lines) for one shop failed. Orders
    /// already placed in this attempt are carried for the caller, and
    /// retrying with the same token will skip them.
    #[error("order placement failed for shop {shop_id}")]
    OrderFailed {
        shop_id: ShopId,
        token: CheckoutToken,
        placed: Vec<PlacedOrder>,
        #[source]
        source: BackendError,
    },
}

impl CheckoutError {
    /// Whether a retry with the same token could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::EmptyCart => false,
            Self::OrderFailed { source, .. } => source.is_transient(),
        }
    }
}

/// What the token lookup found for one shop group.
enum PlacedLookup {
    NotPlaced,
    /// Order and its lines both exist (lines may legitimately be the
    /// order's full set, or empty if the order never got any).
    Placed(PlacedOrder),
    /// The order exists but its lines could not be read; do not touch
    /// it, anything we wrote is still there.
    PlacedLinesUnknown(Order),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives the checkout contract against the catalog and order stores.
pub struct CheckoutOrchestrator {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    stock_retries: u32,
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, orders: Arc<dyn OrderStore>, stock_retries: u32) -> Self {
        Self {
            catalog,
            orders,
            stock_retries: stock_retries.max(1),
        }
    }

    /// Place orders for every shop group in `lines`.
    ///
    /// The caller supplies the token: a fresh one for a new attempt,
    /// the failed attempt's token to resume.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::EmptyCart`] before any backend call when there
    /// are no lines; [`CheckoutError::OrderFailed`] when an order or
    /// its lines cannot be created, leaving later groups unplaced.
    #[instrument(skip(self, buyer, lines), fields(%token, line_count = lines.len()))]
    pub async fn checkout(
        &self,
        buyer: &BuyerDetails,
        customer: Option<UserId>,
        lines: &[CartLine],
        token: CheckoutToken,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let groups = group_by_shop(lines);
        let mut placed: Vec<PlacedOrder> = Vec::with_capacity(groups.len());
        let mut stock_warnings: Vec<StockWarning> = Vec::new();

        for (shop_id, group) in groups {
            match self.find_placed(token, shop_id).await {
                PlacedLookup::Placed(found) if found.lines.is_empty() => {
                    // An earlier attempt died between the order insert
                    // and its lines. Finish the order instead of
                    // creating a sibling.
                    info!(order_id = %found.order.id, "completing order left without lines");
                    self.complete_group(found.order, &group, token, &mut placed, &mut stock_warnings)
                        .await?;
                }
                PlacedLookup::Placed(found) => {
                    info!(order_id = %found.order.id, "order already placed for this token, skipping");
                    placed.push(found);
                }
                PlacedLookup::PlacedLinesUnknown(order) => {
                    placed.push(PlacedOrder {
                        order,
                        lines: Vec::new(),
                    });
                }
                PlacedLookup::NotPlaced => {
                    let draft = OrderDraft {
                        shop_id,
                        customer_id: customer,
                        customer_name: buyer.name.clone(),
                        customer_email: buyer.email.clone(),
                        customer_phone: buyer.phone.clone(),
                        total_amount: group_total(&group),
                        status: OrderStatus::Pending,
                        checkout_token: token,
                    };

                    let order = match self.orders.create_order(&draft).await {
                        Ok(order) => order,
                        Err(source) => {
                            return Err(CheckoutError::OrderFailed {
                                shop_id,
                                token,
                                placed,
                                source,
                            });
                        }
                    };

                    self.complete_group(order, &group, token, &mut placed, &mut stock_warnings)
                        .await?;
                }
            }
        }

        let grand_total = placed.iter().map(|p| p.order.total_amount).sum();
        info!(
            orders = placed.len(),
            warnings = stock_warnings.len(),
            "checkout complete"
        );

        Ok(CheckoutReceipt {
            token,
            orders: placed,
            grand_total,
            stock_warnings,
        })
    }

    /// Insert the lines for an existing order, settle stock, and
    /// record the result.
    async fn complete_group(
        &self,
        order: Order,
        group: &[&CartLine],
        token: CheckoutToken,
        placed: &mut Vec<PlacedOrder>,
        stock_warnings: &mut Vec<StockWarning>,
    ) -> Result<(), CheckoutError> {
        let line_drafts: Vec<OrderLineDraft> = group
            .iter()
            .map(|line| OrderLineDraft {
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: unit_price(line),
            })
            .collect();

        let order_lines = match self.orders.create_order_lines(&line_drafts).await {
            Ok(lines) => lines,
            Err(source) => {
                return Err(CheckoutError::OrderFailed {
                    shop_id: order.shop_id,
                    token,
                    placed: placed.clone(),
                    source,
                });
            }
        };

        for line in group {
            if let Err(warning) = self.settle_stock(line).await {
                warn!(
                    product_id = %warning.product_id,
                    detail = %warning.detail,
                    "stock not settled"
                );
                stock_warnings.push(warning);
            }
        }

        info!(shop_id = %order.shop_id, order_id = %order.id, "order placed");
        placed.push(PlacedOrder {
            order,
            lines: order_lines,
        });
        Ok(())
    }

    /// What an earlier attempt already did for this group. Lookup
    /// failures are treated as "not placed": the worst case is relying
    /// on the token guard a second time.
    async fn find_placed(&self, token: CheckoutToken, shop_id: ShopId) -> PlacedLookup {
        let order = match self.orders.find_order_by_token(token, shop_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return PlacedLookup::NotPlaced,
            Err(e) => {
                warn!(%shop_id, error = %e, "token lookup failed, assuming order not placed");
                return PlacedLookup::NotPlaced;
            }
        };

        match self.orders.order_lines(order.id).await {
            Ok(lines) => PlacedLookup::Placed(PlacedOrder { order, lines }),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "could not fetch lines of placed order");
                PlacedLookup::PlacedLinesUnknown(order)
            }
        }
    }

    /// Decrement a product's stock by the line quantity, floored at
    /// zero, retrying around concurrent movements.
    async fn settle_stock(&self, line: &CartLine) -> Result<(), StockWarning> {
        for attempt in 1..=self.stock_retries {
            let product = match self.catalog.product(line.product_id).await {
                Ok(product) => product,
                Err(e) => {
                    return Err(StockWarning::new(line, format!("stock read failed: {e}")));
                }
            };

            let next = product.stock.saturating_sub(line.quantity);
            match self
                .catalog
                .compare_and_set_stock(line.product_id, product.stock, next)
                .await
            {
                Ok(_) => return Ok(()),
                Err(BackendError::Conflict) => {
                    debug!(product_id = %line.product_id, attempt, "stock moved, refetching");
                }
                Err(e) => {
                    return Err(StockWarning::new(line, format!("stock update failed: {e}")));
                }
            }
        }

        Err(StockWarning::new(
            line,
            format!("still contended after {} attempts", self.stock_retries),
        ))
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Group lines by shop, preserving the order shops first appear in.
fn group_by_shop(lines: &[CartLine]) -> Vec<(ShopId, Vec<&CartLine>)> {
    let mut groups: Vec<(ShopId, Vec<&CartLine>)> = Vec::new();
    for line in lines {
        match groups.iter_mut().find(|(shop, _)| *shop == line.shop_id) {
            Some((_, group)) => group.push(line),
            None => groups.push((line.shop_id, vec![line])),
        }
    }
    groups
}

fn unit_price(line: &CartLine) -> Money {
    line.product.as_ref().map_or_else(
        || {
            warn!(
                product_id = %line.product_id,
                "cart line has no snapshot at checkout, charging zero"
            );
            Money::ZERO
        },
        |product| product.price,
    )
}

fn group_total(group: &[&CartLine]) -> Money {
    group
        .iter()
        .map(|line| unit_price(line).times(line.quantity))
        .sum()
}
