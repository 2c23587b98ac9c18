//! PostgREST + GoTrue backend.
//!
//! Tables are exposed as REST resources under `/rest/v1/` with filters
//! in the query string (`?id=eq.<uuid>`), embedded joins via `select=`,
//! and write echoes requested with `Prefer: return=representation`.
//! Auth flows live under `/auth/v1/` and are implemented in `auth`.
//!
//! Catalog reads go through a TTL cache; every catalog write
//! invalidates the keys it touched. The stock compare-and-set also
//! invalidates on conflict so the caller's refetch sees fresh numbers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shopconnect_core::{
    CartLineId, OrderId, OrderStatus, ProductId, SessionId, ShopId, ShopStatus, UserId,
};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{BackendError, Catalog, CartStore, Merchandising, OrderStore};
use crate::config::ClientConfig;
use crate::types::{
    CartLine, CheckoutToken, Order, OrderDraft, OrderLine, OrderLineDraft, Product, ProductDraft,
    ProductPatch, Shop, ShopDraft,
};

mod auth;

use auth::AuthSession;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// ============================================================================
// Client
// ============================================================================

/// REST backend handle. Cheap to clone; all clones share the HTTP
/// connection pool, the catalog cache, and the session.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    rest_url: String,
    auth_url: String,
    anon_key: String,
    cache: Cache<String, CacheValue>,
    session: RwLock<Option<AuthSession>>,
}

#[derive(Clone)]
enum CacheValue {
    Shop(Shop),
    Shops(Vec<Shop>),
    Product(Product),
    Products(Vec<Product>),
}

impl RestBackend {
    /// Build a backend from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the anon key cannot be used as a header value or the
    /// HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let anon_key = config.anon_key.expose_secret().to_string();

        let mut key_header = HeaderValue::from_str(&anon_key).map_err(|_| {
            BackendError::Parse("anon key contains characters invalid in a header".to_string())
        })?;
        key_header.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key_header);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base = config.backend_url.as_str().trim_end_matches('/').to_string();

        let cache = Cache::builder()
            .max_capacity(config.catalog_cache.capacity)
            .time_to_live(config.catalog_cache.ttl)
            .build();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                rest_url: format!("{base}/rest/v1"),
                auth_url: format!("{base}/auth/v1"),
                anon_key,
                cache,
                session: RwLock::new(None),
            }),
        })
    }

    /// Authorization value for the next request: the session token
    /// when signed in, the anon key otherwise.
    async fn bearer(&self) -> String {
        let session = self.inner.session.read().await;
        match session.as_ref() {
            Some(s) => format!("Bearer {}", s.access_token),
            None => format!("Bearer {}", self.inner.anon_key),
        }
    }

    // ------------------------------------------------------------------
    // HTTP verbs
    // ------------------------------------------------------------------

    async fn get_rows<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = format!("{}/{}", self.inner.rest_url, path);
        let response = self
            .inner
            .client
            .get(&url)
            .header(AUTHORIZATION, self.bearer().await)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn insert_returning<T, B>(&self, table: &str, body: &B) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.inner.rest_url, table);
        let response = self
            .inner
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer().await)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn insert_minimal<B>(&self, table: &str, body: &B) -> Result<(), BackendError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.inner.rest_url, table);
        let response = self
            .inner
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer().await)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(response).await)
        }
    }

    async fn patch_returning<T, B>(&self, path: &str, body: &B) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.inner.rest_url, path);
        let response = self
            .inner
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.bearer().await)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn delete_rows(&self, path: &str) -> Result<(), BackendError> {
        let url = format!("{}/{}", self.inner.rest_url, path);
        let response = self
            .inner
            .client
            .delete(&url)
            .header(AUTHORIZATION, self.bearer().await)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(response).await)
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| BackendError::Parse(e.to_string()))
        } else {
            Err(Self::parse_error(response).await)
        }
    }

    /// Map a non-success response to a [`BackendError`].
    async fn parse_error(response: Response) -> BackendError {
        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                BackendError::RateLimited(retry_after)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized,
            StatusCode::NOT_FOUND => {
                let message = response.text().await.unwrap_or_default();
                BackendError::NotFound(if message.is_empty() {
                    "resource".to_string()
                } else {
                    message
                })
            }
            StatusCode::CONFLICT => BackendError::Conflict,
            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                BackendError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    fn single<T>(rows: Vec<T>, what: &str) -> Result<T, BackendError> {
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(what.to_string()))
    }

    // ------------------------------------------------------------------
    // Cache invalidation
    // ------------------------------------------------------------------

    async fn invalidate_product(&self, id: ProductId, shop: Option<ShopId>) {
        self.inner.cache.invalidate(&format!("product:{id}")).await;
        if let Some(shop) = shop {
            self.inner
                .cache
                .invalidate(&format!("products:{shop}"))
                .await;
        }
    }

    async fn invalidate_shop(&self, id: ShopId) {
        self.inner.cache.invalidate(&format!("shop:{id}")).await;
        for status in [
            ShopStatus::Pending,
            ShopStatus::Approved,
            ShopStatus::Rejected,
        ] {
            self.inner
                .cache
                .invalidate(&format!("shops:{status}"))
                .await;
        }
    }
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("rest_url", &self.inner.rest_url)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Wire payloads
// ============================================================================

/// Insert shape for a cart row. The embedded product snapshot stays
/// local; the mirror re-joins the live product row on read.
#[derive(Debug, Serialize)]
struct CartRowInsert {
    id: CartLineId,
    product_id: ProductId,
    shop_id: ShopId,
    quantity: u32,
    customer_id: UserId,
    session_id: SessionId,
    created_at: DateTime<Utc>,
}

impl CartRowInsert {
    fn from_line(line: &CartLine, customer: UserId) -> Self {
        Self {
            id: line.id,
            product_id: line.product_id,
            shop_id: line.shop_id,
            quantity: line.quantity,
            customer_id: customer,
            session_id: line.session_id,
            created_at: line.created_at,
        }
    }
}

#[derive(Serialize)]
struct StockPatch {
    stock: u32,
}

#[derive(Serialize)]
struct OrderStatusPatch {
    status: OrderStatus,
}

#[derive(Serialize)]
struct ShopStatusPatch {
    status: ShopStatus,
}

// ============================================================================
// Catalog
// ============================================================================

#[async_trait::async_trait]
impl Catalog for RestBackend {
    async fn shops_by_status(&self, status: ShopStatus) -> Result<Vec<Shop>, BackendError> {
        let key = format!("shops:{status}");
        if let Some(CacheValue::Shops(shops)) = self.inner.cache.get(&key).await {
            debug!(%status, "shop list cache hit");
            return Ok(shops);
        }

        let path = format!("shops?status=eq.{status}&select=*&order=created_at.desc");
        let shops: Vec<Shop> = self.get_rows(&path).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Shops(shops.clone()))
            .await;
        Ok(shops)
    }

    async fn shop(&self, id: ShopId) -> Result<Shop, BackendError> {
        let key = format!("shop:{id}");
        if let Some(CacheValue::Shop(shop)) = self.inner.cache.get(&key).await {
            debug!(%id, "shop cache hit");
            return Ok(shop);
        }

        let path = format!("shops?id=eq.{}&select=*", id.as_uuid());
        let rows: Vec<Shop> = self.get_rows(&path).await?;
        let shop = Self::single(rows, "shop")?;
        self.inner
            .cache
            .insert(key, CacheValue::Shop(shop.clone()))
            .await;
        Ok(shop)
    }

    async fn shops_by_owner(&self, owner: UserId) -> Result<Vec<Shop>, BackendError> {
        // Not cached: this backs the shopkeeper dashboard, which must
        // see its own writes immediately.
        let path = format!(
            "shops?shopkeeper_id=eq.{}&select=*&order=created_at.desc",
            owner.as_uuid()
        );
        self.get_rows(&path).await
    }

    async fn products_by_shop(&self, shop: ShopId) -> Result<Vec<Product>, BackendError> {
        let key = format!("products:{shop}");
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&key).await {
            debug!(%shop, "product list cache hit");
            return Ok(products);
        }

        let path = format!(
            "products?shop_id=eq.{}&select=*&order=created_at.desc",
            shop.as_uuid()
        );
        let products: Vec<Product> = self.get_rows(&path).await?;
        self.inner
            .cache
            .insert(key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    async fn product(&self, id: ProductId) -> Result<Product, BackendError> {
        let key = format!("product:{id}");
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            debug!(%id, "product cache hit");
            return Ok(product);
        }

        let path = format!("products?id=eq.{}&select=*", id.as_uuid());
        let rows: Vec<Product> = self.get_rows(&path).await?;
        let product = Self::single(rows, "product")?;
        self.inner
            .cache
            .insert(key, CacheValue::Product(product.clone()))
            .await;
        Ok(product)
    }

    #[instrument(skip(self), fields(%id, expected, next))]
    async fn compare_and_set_stock(
        &self,
        id: ProductId,
        expected: u32,
        next: u32,
    ) -> Result<Product, BackendError> {
        let path = format!(
            "products?id=eq.{}&stock=eq.{expected}",
            id.as_uuid()
        );
        let rows: Vec<Product> = self
            .patch_returning(&path, &StockPatch { stock: next })
            .await?;

        match rows.into_iter().next() {
            Some(product) => {
                self.invalidate_product(id, Some(product.shop_id)).await;
                Ok(product)
            }
            None => {
                // Guard matched no rows: our expected value is stale.
                // Drop the cached row so the retry reads fresh stock.
                self.invalidate_product(id, None).await;
                Err(BackendError::Conflict)
            }
        }
    }
}

// ============================================================================
// Cart mirror
// ============================================================================

#[async_trait::async_trait]
impl CartStore for RestBackend {
    async fn cart_rows(&self, customer: UserId) -> Result<Vec<CartLine>, BackendError> {
        let path = format!(
            "cart_items?customer_id=eq.{}&select=*,product:products(*)&order=created_at.asc",
            customer.as_uuid()
        );
        self.get_rows(&path).await
    }

    #[instrument(skip(self, lines), fields(%customer, line_count = lines.len()))]
    async fn replace_cart_rows(
        &self,
        customer: UserId,
        lines: &[CartLine],
    ) -> Result<(), BackendError> {
        self.delete_rows(&format!("cart_items?customer_id=eq.{}", customer.as_uuid()))
            .await?;

        if lines.is_empty() {
            return Ok(());
        }

        let rows: Vec<CartRowInsert> = lines
            .iter()
            .map(|line| CartRowInsert::from_line(line, customer))
            .collect();
        self.insert_minimal("cart_items", &rows).await
    }

    async fn clear_cart_rows(&self, customer: UserId) -> Result<(), BackendError> {
        self.delete_rows(&format!("cart_items?customer_id=eq.{}", customer.as_uuid()))
            .await
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait::async_trait]
impl OrderStore for RestBackend {
    #[instrument(skip(self, draft), fields(shop_id = %draft.shop_id, token = %draft.checkout_token))]
    async fn create_order(&self, draft: &OrderDraft) -> Result<Order, BackendError> {
        let rows: Vec<Order> = self.insert_returning("orders", draft).await?;
        Self::single(rows, "created order")
    }

    async fn create_order_lines(
        &self,
        drafts: &[OrderLineDraft],
    ) -> Result<Vec<OrderLine>, BackendError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_returning("order_items", drafts).await
    }

    async fn find_order_by_token(
        &self,
        token: CheckoutToken,
        shop: ShopId,
    ) -> Result<Option<Order>, BackendError> {
        let path = format!(
            "orders?checkout_token=eq.{}&shop_id=eq.{}&select=*",
            token.as_uuid(),
            shop.as_uuid()
        );
        let rows: Vec<Order> = self.get_rows(&path).await?;
        Ok(rows.into_iter().next())
    }

    async fn order(&self, id: OrderId) -> Result<Order, BackendError> {
        let path = format!("orders?id=eq.{}&select=*", id.as_uuid());
        let rows: Vec<Order> = self.get_rows(&path).await?;
        Self::single(rows, "order")
    }

    async fn order_lines(&self, order: OrderId) -> Result<Vec<OrderLine>, BackendError> {
        let path = format!(
            "order_items?order_id=eq.{}&select=*&order=created_at.asc",
            order.as_uuid()
        );
        self.get_rows(&path).await
    }

    async fn order_lines_for_shop(&self, shop: ShopId) -> Result<Vec<OrderLine>, BackendError> {
        // Inner-join filter: only lines whose parent order belongs to
        // the shop. The embedded order object is ignored on decode.
        let path = format!(
            "order_items?select=*,order:orders!inner(shop_id)&order.shop_id=eq.{}",
            shop.as_uuid()
        );
        self.get_rows(&path).await
    }

    async fn orders_by_customer(&self, customer: UserId) -> Result<Vec<Order>, BackendError> {
        let path = format!(
            "orders?customer_id=eq.{}&select=*&order=created_at.desc",
            customer.as_uuid()
        );
        self.get_rows(&path).await
    }

    async fn orders_by_shop(&self, shop: ShopId) -> Result<Vec<Order>, BackendError> {
        let path = format!(
            "orders?shop_id=eq.{}&select=*&order=created_at.desc",
            shop.as_uuid()
        );
        self.get_rows(&path).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, BackendError> {
        let path = format!("orders?id=eq.{}", id.as_uuid());
        let rows: Vec<Order> = self
            .patch_returning(&path, &OrderStatusPatch { status })
            .await?;
        Self::single(rows, "order")
    }
}

// ============================================================================
// Merchandising
// ============================================================================

#[async_trait::async_trait]
impl Merchandising for RestBackend {
    async fn register_shop(&self, draft: &ShopDraft) -> Result<Shop, BackendError> {
        let rows: Vec<Shop> = self.insert_returning("shops", draft).await?;
        let shop = Self::single(rows, "created shop")?;
        self.invalidate_shop(shop.id).await;
        Ok(shop)
    }

    #[instrument(skip(self), fields(%id, %status))]
    async fn set_shop_status(&self, id: ShopId, status: ShopStatus) -> Result<Shop, BackendError> {
        let path = format!("shops?id=eq.{}", id.as_uuid());
        let rows: Vec<Shop> = self
            .patch_returning(&path, &ShopStatusPatch { status })
            .await?;
        let shop = Self::single(rows, "shop")?;
        self.invalidate_shop(id).await;
        Ok(shop)
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<Product, BackendError> {
        let rows: Vec<Product> = self.insert_returning("products", draft).await?;
        let product = Self::single(rows, "created product")?;
        self.invalidate_product(product.id, Some(product.shop_id))
            .await;
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError> {
        let path = format!("products?id=eq.{}", id.as_uuid());
        let rows: Vec<Product> = self.patch_returning(&path, patch).await?;
        let product = Self::single(rows, "product")?;
        self.invalidate_product(id, Some(product.shop_id)).await;
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), BackendError> {
        // Look up the shop first so the list cache can be dropped too.
        // A row that is already gone still deletes cleanly.
        let shop = match self.product(id).await {
            Ok(product) => Some(product.shop_id),
            Err(BackendError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        self.delete_rows(&format!("products?id=eq.{}", id.as_uuid()))
            .await?;
        self.invalidate_product(id, shop).await;
        Ok(())
    }
}
