//! Backend access traits and implementations.
//!
//! The client only ever talks to the backend through the five traits in
//! this module, so the REST implementation ([`RestBackend`]) and the
//! in-process test double ([`MemoryBackend`]) are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use shopconnect_core::{
    Email, OrderId, OrderStatus, ProductId, Role, ShopId, ShopStatus, UserId,
};
use thiserror::Error;

use crate::types::{
    CartLine, CheckoutToken, Identity, Order, OrderDraft, OrderLine, OrderLineDraft, Product,
    ProductDraft, ProductPatch, Shop, ShopDraft,
};

pub mod memory;
pub mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

// ============================================================================
// Errors
// ============================================================================

/// Errors from backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Too many requests; retry after the given number of seconds.
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Credentials were missing, expired, or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A guarded write matched no rows (the precondition no longer
    /// holds). Callers refetch and decide whether to retry.
    #[error("conflicting write: precondition no longer holds")]
    Conflict,

    /// The response decoded, but not into the shape we expect.
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl BackendError {
    /// Whether retrying the same call later could succeed.
    ///
    /// Network faults, 5xx responses, timeouts and rate limits are
    /// transient. Everything else reflects the request itself and will
    /// keep failing until the caller changes something.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408,
            Self::Unauthorized | Self::NotFound(_) | Self::Conflict | Self::Parse(_) => false,
        }
    }

    /// Server-requested minimum delay before retrying, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Account and session lifecycle.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register an account with the given role and establish a session.
    ///
    /// # Errors
    ///
    /// Fails if the email is already registered or the role claim on
    /// the created account cannot be resolved.
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        role: Role,
    ) -> Result<Identity, BackendError>;

    /// Authenticate and establish a session.
    async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, BackendError>;

    /// Tear down the current session. A no-op when signed out.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The identity of the current session, if any.
    async fn current_identity(&self) -> Option<Identity>;
}

/// Read access to shops and products, plus the one guarded write the
/// checkout flow needs.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn shops_by_status(&self, status: ShopStatus) -> Result<Vec<Shop>, BackendError>;

    /// # Errors
    ///
    /// [`BackendError::NotFound`] if no shop has this id.
    async fn shop(&self, id: ShopId) -> Result<Shop, BackendError>;

    async fn shops_by_owner(&self, owner: UserId) -> Result<Vec<Shop>, BackendError>;

    async fn products_by_shop(&self, shop: ShopId) -> Result<Vec<Product>, BackendError>;

    /// # Errors
    ///
    /// [`BackendError::NotFound`] if no product has this id.
    async fn product(&self, id: ProductId) -> Result<Product, BackendError>;

    /// Set `stock` to `next` only if it still equals `expected`.
    ///
    /// # Errors
    ///
    /// [`BackendError::Conflict`] when the stock moved since it was
    /// read; the caller refetches and retries with fresh numbers.
    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: u32,
        next: u32,
    ) -> Result<Product, BackendError>;
}

/// Server-side mirror of a signed-in customer's cart.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_rows(&self, customer: UserId) -> Result<Vec<CartLine>, BackendError>;

    /// Replace the mirror wholesale with `lines`. Idempotent: applying
    /// the same snapshot twice leaves the same rows.
    async fn replace_cart_rows(
        &self,
        customer: UserId,
        lines: &[CartLine],
    ) -> Result<(), BackendError>;

    async fn clear_cart_rows(&self, customer: UserId) -> Result<(), BackendError>;
}

/// Order placement and retrieval.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, BackendError>;

    async fn create_order_lines(
        &self,
        drafts: &[OrderLineDraft],
    ) -> Result<Vec<OrderLine>, BackendError>;

    /// Look up the order a previous checkout attempt may have already
    /// placed for this token and shop.
    async fn find_order_by_token(
        &self,
        token: CheckoutToken,
        shop: ShopId,
    ) -> Result<Option<Order>, BackendError>;

    async fn order(&self, id: OrderId) -> Result<Order, BackendError>;

    async fn order_lines(&self, order: OrderId) -> Result<Vec<OrderLine>, BackendError>;

    /// All order lines belonging to a shop's orders, for analytics.
    async fn order_lines_for_shop(&self, shop: ShopId) -> Result<Vec<OrderLine>, BackendError>;

    async fn orders_by_customer(&self, customer: UserId) -> Result<Vec<Order>, BackendError>;

    async fn orders_by_shop(&self, shop: ShopId) -> Result<Vec<Order>, BackendError>;

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, BackendError>;
}

/// Shopkeeper and admin writes to the catalog.
#[async_trait]
pub trait Merchandising: Send + Sync {
    async fn register_shop(&self, draft: &ShopDraft) -> Result<Shop, BackendError>;

    async fn set_shop_status(&self, id: ShopId, status: ShopStatus) -> Result<Shop, BackendError>;

    async fn create_product(&self, draft: &ProductDraft) -> Result<Product, BackendError>;

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError>;

    async fn delete_product(&self, id: ProductId) -> Result<(), BackendError>;
}

/// A full backend: everything the client needs, in one object.
pub trait Backend: SessionStore + Catalog + CartStore + OrderStore + Merchandising {}

impl<T> Backend for T where T: SessionStore + Catalog + CartStore + OrderStore + Merchandising {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_and_5xx_are_transient() {
        assert!(BackendError::RateLimited(3).is_transient());
        assert!(BackendError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(BackendError::Api {
            status: 408,
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_caller_faults_are_permanent() {
        assert!(!BackendError::Unauthorized.is_transient());
        assert!(!BackendError::NotFound("shops".to_string()).is_transient());
        assert!(!BackendError::Conflict.is_transient());
        assert!(!BackendError::Api {
            status: 400,
            message: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        assert_eq!(
            BackendError::RateLimited(30).retry_after(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(BackendError::Unauthorized.retry_after(), None);
    }
}
