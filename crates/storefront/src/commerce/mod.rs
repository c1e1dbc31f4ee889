//! Commerce platform API client.
//!
//! # Architecture
//!
//! - REST/JSON over HTTPS with `reqwest`
//! - The platform is the source of truth - no local sync, direct API calls
//! - Catalog responses are cached in memory via `moka` (5 minute TTL)
//! - Carts are never cached here; the cart query cache in [`crate::query`]
//!   owns cart snapshots and their invalidation
//!
//! Route handlers depend on the [`CommerceApi`] trait rather than the
//! concrete [`CommerceClient`], so tests can swap in an in-memory fake.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartwheel_storefront::commerce::{CommerceApi, CommerceClient};
//!
//! let client = CommerceClient::new(&config.commerce);
//!
//! let products = client.query_products(12).await?;
//! let cart = client.get_cart(&cart_id).await?;
//! ```

mod cache;
mod client;
pub mod memory;
pub mod types;

pub use client::CommerceClient;
pub use types::*;

use async_trait::async_trait;
use cartwheel_core::{CartId, CheckoutId, LineItemId};
use thiserror::Error;

/// Errors that can occur when interacting with the commerce platform.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the platform.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The platform rejected the request input.
    #[error("User error: {0}")]
    UserError(String),
}

impl CommerceError {
    /// Message safe to show a shopper.
    ///
    /// Transport and parse details stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::UserError(msg) => msg.clone(),
            Self::NotFound(_) => "This item could not be found.".to_string(),
            Self::RateLimited(_) => "The store is busy, please try again in a moment.".to_string(),
            Self::Http(_) | Self::Api { .. } | Self::Parse(_) => {
                "We couldn't reach the store. Please try again.".to_string()
            }
        }
    }
}

/// Operations the storefront needs from the commerce platform.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Fetch a cart by ID.
    async fn get_cart(&self, cart_id: &CartId) -> Result<Cart, CommerceError>;

    /// Create a cart, optionally with initial line items.
    async fn create_cart(&self, lines: Vec<LineItemInput>) -> Result<Cart, CommerceError>;

    /// Add line items to an existing cart.
    async fn add_to_cart(
        &self,
        cart_id: &CartId,
        lines: Vec<LineItemInput>,
    ) -> Result<Cart, CommerceError>;

    /// Set line item quantities.
    async fn update_line_item_quantity(
        &self,
        cart_id: &CartId,
        updates: Vec<LineItemQuantityUpdate>,
    ) -> Result<Cart, CommerceError>;

    /// Remove line items.
    async fn remove_line_items(
        &self,
        cart_id: &CartId,
        line_item_ids: Vec<LineItemId>,
    ) -> Result<Cart, CommerceError>;

    /// Create a checkout from the cart.
    async fn create_checkout(&self, cart_id: &CartId) -> Result<CheckoutId, CommerceError>;

    /// List catalog products.
    async fn query_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError>;

    /// Fetch one product by slug.
    async fn get_product_by_slug(&self, slug: &str) -> Result<Product, CommerceError>;
}
