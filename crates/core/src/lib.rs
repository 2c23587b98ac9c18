//! ShopConnect Core - Shared types library.
//!
//! This crate provides common types used across all ShopConnect components:
//! - `client` - Headless marketplace client (cart, sync, checkout)
//! - downstream view layers built on top of the client
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no runtime.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, roles, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
