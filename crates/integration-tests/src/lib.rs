//! End-to-end scenarios for the ShopConnect client.
//!
//! Everything runs against the in-memory backend; no network, no
//! hosted services. Each test builds one or more [`AppState`] devices
//! over a shared backend, walks a user journey through the public
//! API, and inspects the resulting rows through the seeding helpers.
//!
//! # Running
//!
//! ```bash
//! cargo test -p shopconnect-integration-tests
//! ```
//!
//! Set `RUST_LOG=shopconnect_client=debug` to watch the cart sync
//! worker and checkout orchestrator at work.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use shopconnect_client::backend::MemoryBackend;
use shopconnect_client::{AppState, BuyerDetails, ClientConfig, NewShop, ProductDraft, SyncPolicy};
use shopconnect_core::{Email, Money, ShopId, UserId};
use tempfile::TempDir;
use url::Url;

/// Install a test subscriber once per process. Safe to call from every
/// test; later calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// One backend shared by any number of client devices, each with its
/// own cart file inside the harness's temp directory.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    dir: TempDir,
}

impl Harness {
    /// # Panics
    ///
    /// When the temp directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        Self {
            backend: Arc::new(MemoryBackend::new()),
            dir,
        }
    }

    /// A client over the shared backend with its own cart file.
    /// Calling this twice with the same name simulates a restart of
    /// that device.
    #[must_use]
    pub fn device(&self, name: &str) -> AppState {
        AppState::new(&self.config_for(name), Arc::clone(&self.backend))
    }

    /// The cart file a device of this name reads and writes.
    #[must_use]
    pub fn cart_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}-cart.json"))
    }

    fn config_for(&self, name: &str) -> ClientConfig {
        let url = Url::parse("http://localhost:54321").unwrap_or_else(|e| panic!("url: {e}"));
        let mut config =
            ClientConfig::new(url, SecretString::from("test-anon-key-0123456789abcdef"));
        config.cart_path = self.cart_path(name);
        // Tight backoff keeps the retry scenarios fast.
        config.sync = SyncPolicy {
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(200),
            jitter: Duration::from_millis(5),
        };
        config
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// # Panics
///
/// Never; the address is statically valid.
#[must_use]
pub fn sample_buyer() -> BuyerDetails {
    BuyerDetails {
        name: "Pat Doe".to_string(),
        email: Email::parse("pat@example.test").unwrap_or_else(|e| panic!("email: {e}")),
        phone: "555-0188".to_string(),
    }
}

#[must_use]
pub fn shop_form(name: &str) -> NewShop {
    NewShop {
        name: name.to_string(),
        description: "A small independent shop".to_string(),
        category: "general".to_string(),
        address: "1 Market Street".to_string(),
        phone: "555-0100".to_string(),
        email: "shop@example.test".to_string(),
    }
}

#[must_use]
pub fn product_draft(shop_id: ShopId, title: &str, cents: i64, stock: u32) -> ProductDraft {
    ProductDraft {
        shop_id,
        title: title.to_string(),
        description: format!("{title}, made in house"),
        price: Money::from_cents(cents),
        stock,
        category: "general".to_string(),
        image_url: None,
    }
}

/// Poll until the customer's server-side cart holds exactly `lines`
/// rows, or two seconds pass. Returns whether it got there.
pub async fn wait_for_mirror(backend: &MemoryBackend, customer: UserId, lines: usize) -> bool {
    for _ in 0..100 {
        if backend.stored_cart(customer).await.len() == lines {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
