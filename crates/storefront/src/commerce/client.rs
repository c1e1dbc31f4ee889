//! HTTP implementation of [`CommerceApi`].
//!
//! Uses `reqwest` for transport and caches catalog reads with `moka`.

use std::sync::Arc;

use async_trait::async_trait;
use cartwheel_core::{CartId, CheckoutId, LineItemId};
use moka::future::Cache;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use super::cache::{CacheKey, CacheValue};
use super::types::{
    Cart, CartEnvelope, CheckoutEnvelope, LineItemInput, LineItemQuantityUpdate, Product,
    ProductsEnvelope,
};
use super::{CommerceApi, CommerceError};
use crate::config::CommerceConfig;

/// Longest slice of a response body kept in logs and error messages.
const BODY_PREVIEW_CHARS: usize = 200;

/// Map a non-success response to a [`CommerceError`].
///
/// `retry_after` is the raw `Retry-After` header of a 429 response; the
/// platform sends seconds, anything unparseable waits one second.
fn status_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> CommerceError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let secs = retry_after
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(1);
        return CommerceError::RateLimited(secs);
    }

    let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| preview.clone());

    tracing::error!(status = %status, body = %preview, "Commerce API returned non-success status");

    match status {
        StatusCode::NOT_FOUND => CommerceError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CommerceError::UserError(message)
        }
        _ => CommerceError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Client for the commerce platform's REST API.
///
/// Cheap to clone; all clones share the HTTP connection pool and the
/// catalog cache.
#[derive(Clone)]
pub struct CommerceClient {
    inner: Arc<CommerceClientInner>,
}

struct CommerceClientInner {
    client: reqwest::Client,
    base_url: String,
    site_id: String,
    api_key: String,
    cache: Cache<CacheKey, CacheValue>,
}

/// Error body shape returned by the platform.
#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl CommerceClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &CommerceConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        Self {
            inner: Arc::new(CommerceClientInner {
                client: reqwest::Client::new(),
                base_url: config.api_url.trim_end_matches('/').to_string(),
                site_id: config.site_id.clone(),
                api_key: config.api_key.expose_secret().to_string(),
                cache,
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.inner.client.post(self.url(path)))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.inner.client.get(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", &self.inner.api_key)
            .header("wix-site-id", &self.inner.site_id)
            .header("Content-Type", "application/json")
    }

    /// Send a request and decode its JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CommerceError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(status_error(status, retry_after.as_deref(), ""));
        }

        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, None, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(BODY_PREVIEW_CHARS).collect::<String>(),
                "Failed to parse commerce API response"
            );
            CommerceError::Parse(e)
        })
    }

    /// Decode a cart envelope, treating a missing cart as not found.
    fn unwrap_cart(envelope: CartEnvelope, context: &str) -> Result<Cart, CommerceError> {
        envelope
            .cart
            .ok_or_else(|| CommerceError::NotFound(format!("{context}: response had no cart")))
    }
}

#[async_trait]
impl CommerceApi for CommerceClient {
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn get_cart(&self, cart_id: &CartId) -> Result<Cart, CommerceError> {
        let path = format!("/ecom/v1/carts/{}", urlencoding::encode(cart_id.as_str()));
        let envelope: CartEnvelope = self.send(self.get(&path)).await?;
        Self::unwrap_cart(envelope, "get cart")
    }

    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    async fn create_cart(&self, lines: Vec<LineItemInput>) -> Result<Cart, CommerceError> {
        let body = json!({ "cartInfo": {}, "lineItems": lines });
        let envelope: CartEnvelope = self.send(self.post("/ecom/v1/carts").json(&body)).await?;
        Self::unwrap_cart(envelope, "create cart")
    }

    #[instrument(skip(self, lines), fields(cart_id = %cart_id, line_count = lines.len()))]
    async fn add_to_cart(
        &self,
        cart_id: &CartId,
        lines: Vec<LineItemInput>,
    ) -> Result<Cart, CommerceError> {
        let path = format!(
            "/ecom/v1/carts/{}/add-to-cart",
            urlencoding::encode(cart_id.as_str())
        );
        let body = json!({ "lineItems": lines });
        let envelope: CartEnvelope = self.send(self.post(&path).json(&body)).await?;
        Self::unwrap_cart(envelope, "add to cart")
    }

    #[instrument(skip(self, updates), fields(cart_id = %cart_id))]
    async fn update_line_item_quantity(
        &self,
        cart_id: &CartId,
        updates: Vec<LineItemQuantityUpdate>,
    ) -> Result<Cart, CommerceError> {
        let path = format!(
            "/ecom/v1/carts/{}/update-line-items-quantity",
            urlencoding::encode(cart_id.as_str())
        );
        let body = json!({ "lineItems": updates });
        let envelope: CartEnvelope = self.send(self.post(&path).json(&body)).await?;
        Self::unwrap_cart(envelope, "update quantity")
    }

    #[instrument(skip(self, line_item_ids), fields(cart_id = %cart_id))]
    async fn remove_line_items(
        &self,
        cart_id: &CartId,
        line_item_ids: Vec<LineItemId>,
    ) -> Result<Cart, CommerceError> {
        let path = format!(
            "/ecom/v1/carts/{}/remove-line-items",
            urlencoding::encode(cart_id.as_str())
        );
        let body = json!({ "lineItemIds": line_item_ids });
        let envelope: CartEnvelope = self.send(self.post(&path).json(&body)).await?;
        Self::unwrap_cart(envelope, "remove line items")
    }

    #[instrument(skip(self), fields(cart_id = %cart_id))]
    async fn create_checkout(&self, cart_id: &CartId) -> Result<CheckoutId, CommerceError> {
        let path = format!(
            "/ecom/v1/carts/{}/create-checkout",
            urlencoding::encode(cart_id.as_str())
        );
        let body = json!({ "channelType": "WEB" });
        let envelope: CheckoutEnvelope = self.send(self.post(&path).json(&body)).await?;
        envelope
            .checkout_id
            .ok_or_else(|| CommerceError::UserError("Checkout could not be created".to_string()))
    }

    #[instrument(skip(self))]
    async fn query_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
        let key = CacheKey::Products { limit };
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let body = json!({ "query": { "paging": { "limit": limit } } });
        let envelope: ProductsEnvelope = self
            .send(self.post("/stores/v1/products/query").json(&body))
            .await?;

        self.inner
            .cache
            .insert(key, CacheValue::Products(envelope.products.clone()))
            .await;

        Ok(envelope.products)
    }

    #[instrument(skip(self), fields(slug = %slug))]
    async fn get_product_by_slug(&self, slug: &str) -> Result<Product, CommerceError> {
        let key = CacheKey::Product(slug.to_string());
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        // The v1 catalog query takes its filter as a JSON-encoded string.
        let filter = json!({ "slug": slug }).to_string();
        let body = json!({ "query": { "filter": filter, "paging": { "limit": 1 } } });
        let envelope: ProductsEnvelope = self
            .send(self.post("/stores/v1/products/query").json(&body))
            .await?;

        let product = envelope
            .products
            .into_iter()
            .next()
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {slug}")))?;

        self.inner
            .cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }
}
