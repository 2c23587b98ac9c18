//! Client-level error type.
//!
//! Each layer keeps its own error enum ([`BackendError`],
//! [`CheckoutError`], [`AuthzError`], [`ConfigError`]) and
//! [`ClientError`] is the umbrella the [`crate::state::AppState`]
//! operations return to view layers.

use shopconnect_core::{EmailError, OrderStatus, ProductId, ShopStatus};
use thiserror::Error;

use crate::authz::AuthzError;
use crate::backend::BackendError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;

/// Convenience alias used throughout the client crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Top-level error for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Checkout could not complete.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// The caller is not allowed to perform the operation.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// A supplied email address failed validation.
    #[error(transparent)]
    InvalidEmail(#[from] EmailError),

    /// The product has no stock left.
    #[error("product {product_id} is out of stock")]
    OutOfStock { product_id: ProductId },

    /// Adding the requested quantity would exceed the known stock.
    #[error("only {available} more of product {product_id} can be added")]
    StockLimitReached { product_id: ProductId, available: u32 },

    /// The requested order status change is not allowed.
    #[error("order status cannot change from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Shop moderation only ever approves or rejects.
    #[error("{status} is not a moderation outcome")]
    InvalidModeration { status: ShopStatus },

    /// The operation requires an authenticated session.
    #[error("not signed in")]
    NotSignedIn,
}

impl ClientError {
    /// Whether retrying the same operation could succeed.
    ///
    /// Mirrors [`BackendError::is_transient`]; everything that is not a
    /// backend fault is a caller error and retrying will not help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend(err) => err.is_transient(),
            Self::Checkout(err) => err.is_transient(),
            _ => false,
        }
    }
}
