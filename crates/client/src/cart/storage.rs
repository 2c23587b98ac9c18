//! Cart file persistence.
//!
//! One JSON document per cart, written in full after every mutation.
//! Lines are stored with their product snapshots so a restarted client
//! can render the cart before it has talked to the backend at all.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shopconnect_core::SessionId;
use thiserror::Error;
use tracing::debug;

use crate::types::CartLine;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cart file io: {0}")]
    Io(#[from] io::Error),

    #[error("cart file encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk shape of the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCart {
    pub session_id: SessionId,
    pub items: Vec<CartLine>,
}

/// Reads and writes the cart file at a fixed path.
#[derive(Debug, Clone)]
pub struct CartStorage {
    path: PathBuf,
}

impl CartStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored cart, `None` when no file exists yet.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files or files that no longer decode; the
    /// caller decides whether to start fresh.
    pub fn load(&self) -> Result<Option<StoredCart>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write the cart, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Propagates filesystem and encoding failures.
    pub fn save(&self, cart: &StoredCart) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec(cart)?;
        fs::write(&self.path, bytes)?;
        debug!(path = %self.path.display(), items = cart.items.len(), "cart file written");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shopconnect_core::{CartLineId, ProductId, ShopId};

    fn stored_cart(items: usize) -> StoredCart {
        let session_id = SessionId::generate();
        StoredCart {
            session_id,
            items: (0..items)
                .map(|i| CartLine {
                    id: CartLineId::generate(),
                    product_id: ProductId::generate(),
                    shop_id: ShopId::generate(),
                    quantity: u32::try_from(i).unwrap() + 1,
                    customer_id: None,
                    session_id,
                    created_at: Utc::now(),
                    product: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CartStorage::new(dir.path().join("cart.json"));
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CartStorage::new(dir.path().join("cart.json"));

        let cart = stored_cart(2);
        storage.save(&cart).unwrap();

        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.session_id, cart.session_id);
        assert_eq!(loaded.items.len(), 2);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CartStorage::new(dir.path().join("nested/state/cart.json"));
        storage.save(&stored_cart(0)).unwrap();
        assert!(storage.path().exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");
        fs::write(&path, b"not json").unwrap();

        let storage = CartStorage::new(path);
        let err = storage.load().unwrap_err();
        assert!(matches!(err, StorageError::Encode(_)));
    }
}
