//! Headless marketplace client for ShopConnect.
//!
//! This crate owns everything between a view layer and the backend:
//! session management, catalog browsing, the local-first shopping cart
//! with its write-behind sync queue, checkout orchestration across
//! multiple shops, and the shopkeeper/admin operations.
//!
//! The entry point is [`AppState`], constructed from a [`ClientConfig`]
//! and a backend implementation. [`backend::RestBackend`] talks to a
//! PostgREST + GoTrue deployment; [`backend::MemoryBackend`] is an
//! in-process stand-in for tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod authz;
pub mod backend;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use authz::AuthzError;
pub use backend::{
    Backend, BackendError, Catalog, CartStore, MemoryBackend, Merchandising, OrderStore,
    RestBackend, SessionStore,
};
pub use cart::{Cart, CartState, CartStorage, Outbox, StoredCart, SyncIntent};
pub use checkout::{
    CheckoutError, CheckoutOrchestrator, CheckoutReceipt, PlacedOrder, StockWarning,
};
pub use config::{CacheConfig, ClientConfig, ConfigError, SyncPolicy};
pub use error::{ClientError, Result};
pub use state::{AppState, ShopPage};
pub use types::*;

// Core types surface through the client so callers need one import.
pub use shopconnect_core::{
    CartLineId, Email, EmailError, Money, OrderId, OrderLineId, OrderStatus, ProductId, Role,
    RoleError, SessionId, ShopId, ShopStatus, UserId,
};
