//! Wire types for the commerce platform's cart and catalog APIs.
//!
//! The platform omits fields freely, so nearly everything here is an
//! `Option` or a defaulted `Vec`. View models in [`crate::views`] resolve
//! these options exactly once; nothing else should reach into the nested
//! payload.

use std::str::FromStr;

use cartwheel_core::{CartId, CheckoutId, CurrencyCode, LineItemId, ProductId, format_currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// App ID the platform uses for catalog items owned by its stores app.
pub const STORES_APP_ID: &str = "215238eb-22a5-4c36-9e7b-e7c08025e04e";

// =============================================================================
// Shared Types
// =============================================================================

/// A string the platform may have translated for the visitor's locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatableString {
    pub original: Option<String>,
    pub translated: Option<String>,
}

impl TranslatableString {
    /// The translated text, falling back to the original.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.translated
            .as_deref()
            .or(self.original.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// A price as the cart API reports it: raw and converted amounts, each with
/// a pre-formatted string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiCurrencyPrice {
    pub amount: Option<String>,
    pub converted_amount: Option<String>,
    pub formatted_amount: Option<String>,
    pub formatted_converted_amount: Option<String>,
}

impl MultiCurrencyPrice {
    /// Numeric value of the amount, preferring the converted amount.
    #[must_use]
    pub fn value(&self) -> Option<Decimal> {
        self.converted_amount
            .as_deref()
            .or(self.amount.as_deref())
            .and_then(|s| Decimal::from_str(s.trim()).ok())
    }

    /// Display string, preferring the formatted converted amount.
    ///
    /// Falls back to formatting the numeric value locally when the platform
    /// sent no formatted string.
    #[must_use]
    pub fn display(&self, currency: Option<&CurrencyCode>) -> Option<String> {
        if let Some(formatted) = self
            .formatted_converted_amount
            .as_deref()
            .or(self.formatted_amount.as_deref())
            .filter(|s| !s.is_empty())
        {
            return Some(formatted.to_string());
        }
        let value = self.value()?;
        Some(format_currency(value, &currency.cloned().unwrap_or_default()))
    }

    /// Whether two prices carry the same numeric amount.
    ///
    /// Unparseable amounts are compared as trimmed strings.
    #[must_use]
    pub fn same_amount(&self, other: &Self) -> bool {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => {
                self.amount.as_deref().map(str::trim) == other.amount.as_deref().map(str::trim)
            }
            _ => false,
        }
    }
}

// =============================================================================
// Cart Types
// =============================================================================

/// Stock information for a line item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAvailability {
    /// `AVAILABLE`, `NOT_AVAILABLE`, `NOT_FOUND`, `PARTIALLY_AVAILABLE`.
    pub status: Option<String>,
    /// Remaining purchasable stock, when inventory is tracked.
    pub quantity_available: Option<u32>,
}

/// A color attribute on a description line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorInfo {
    pub original: Option<String>,
    pub translated: Option<String>,
    /// Hex code, e.g. `#FF0000`.
    pub code: Option<String>,
}

/// One descriptive line on a line item (selected option or free text).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionLine {
    pub name: Option<TranslatableString>,
    pub plain_text: Option<TranslatableString>,
    pub color_info: Option<ColorInfo>,
}

impl DescriptionLine {
    /// Resolved display text: the color if present, otherwise the plain text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.color_info
            .as_ref()
            .and_then(|c| c.translated.as_deref().or(c.original.as_deref()))
            .filter(|s| !s.is_empty())
            .or_else(|| self.plain_text.as_ref().and_then(TranslatableString::text))
    }
}

/// Reference from a line item back to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogReference {
    pub catalog_item_id: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// One product entry within a cart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(rename = "_id")]
    pub id: Option<LineItemId>,
    pub quantity: Option<u32>,
    pub product_name: Option<TranslatableString>,
    /// Product page URL on the platform; the slug is its last segment.
    pub url: Option<String>,
    /// Opaque media identifier.
    pub image: Option<String>,
    pub price: Option<MultiCurrencyPrice>,
    /// Price before discounts, present when discounted.
    pub full_price: Option<MultiCurrencyPrice>,
    pub availability: Option<ItemAvailability>,
    #[serde(default)]
    pub description_lines: Vec<DescriptionLine>,
    pub catalog_reference: Option<CatalogReference>,
}

/// A visitor's shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(rename = "_id")]
    pub id: Option<CartId>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub subtotal: Option<MultiCurrencyPrice>,
    pub currency: Option<CurrencyCode>,
    pub converted_currency: Option<CurrencyCode>,
}

impl Cart {
    /// Currency used for display fallbacks.
    #[must_use]
    pub fn display_currency(&self) -> Option<&CurrencyCode> {
        self.converted_currency.as_ref().or(self.currency.as_ref())
    }
}

/// Input for adding a catalog item to a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub catalog_reference: CatalogReference,
    pub quantity: u32,
}

impl LineItemInput {
    /// A stores-app product, optionally with a variant.
    #[must_use]
    pub fn product(product_id: &ProductId, variant_id: Option<&str>, quantity: u32) -> Self {
        Self {
            catalog_reference: CatalogReference {
                catalog_item_id: product_id.to_string(),
                app_id: STORES_APP_ID.to_string(),
                options: variant_id.map(|v| serde_json::json!({ "variantId": v })),
            },
            quantity,
        }
    }
}

/// Input for changing a line item's quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemQuantityUpdate {
    #[serde(rename = "_id")]
    pub id: LineItemId,
    pub quantity: u32,
}

/// Response envelope for cart endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CartEnvelope {
    pub cart: Option<Cart>,
}

/// Response of the create-checkout endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutEnvelope {
    pub checkout_id: Option<CheckoutId>,
}

// =============================================================================
// Catalog Types
// =============================================================================

/// Image metadata on a product's main media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaImage {
    /// Media identifier or absolute URL.
    pub url: Option<String>,
    pub alt_text: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A single media entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub image: Option<MediaImage>,
}

/// A product's media collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMedia {
    pub main_media: Option<MediaItem>,
    #[serde(default)]
    pub items: Vec<MediaItem>,
}

/// Kind of discount attached to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Amount,
    Percent,
    /// `NONE`, and any type this storefront does not know.
    #[default]
    #[serde(other)]
    None,
}

/// Discount descriptor attached to a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    #[serde(rename = "type", default)]
    pub kind: DiscountType,
    pub value: Option<Decimal>,
}

/// Pre-formatted price strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedPrice {
    pub price: Option<String>,
    pub discounted_price: Option<String>,
}

/// A product's fixed price data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    pub currency: Option<CurrencyCode>,
    pub price: Option<Decimal>,
    pub discounted_price: Option<Decimal>,
    pub formatted: Option<FormattedPrice>,
}

/// Minimum and maximum price across a product's variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
}

/// A catalog product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Option<ProductId>,
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Rich text description as HTML.
    pub description: Option<String>,
    pub media: Option<ProductMedia>,
    pub ribbon: Option<String>,
    pub discount: Option<Discount>,
    pub price_data: Option<PriceData>,
    pub price_range: Option<PriceRange>,
    pub in_stock: Option<bool>,
}

impl Product {
    /// The main image, if the product has one.
    #[must_use]
    pub fn main_image(&self) -> Option<&MediaImage> {
        self.media
            .as_ref()
            .and_then(|m| m.main_media.as_ref())
            .and_then(|m| m.image.as_ref())
    }
}

/// Response envelope for the product query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsEnvelope {
    #[serde(default)]
    pub products: Vec<Product>,
    pub total_results: Option<u32>,
}
