//! A single cart line.

use cartwheel_core::LineItemId;

use crate::commerce::{Cart, LineItem, TranslatableString};
use crate::media::{ImageView, MediaResolver};
use crate::mutation::PendingChange;

/// Thumbnail size in the cart panel.
pub const CART_IMAGE_SIZE: u32 = 110;

/// Mutation status of one line, as tracked by the mutation service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMutationState {
    pub pending: Option<PendingChange>,
    pub failure: Option<String>,
}

/// Display data for one line item in the cart panel.
#[derive(Debug, Clone)]
pub struct CartLineItemView {
    /// Line ID for mutation forms; empty when the platform sent none.
    pub id: String,
    pub href: String,
    pub name: String,
    pub image: ImageView,
    pub description: Option<String>,
    /// Quantity shown, which is the in-flight quantity while a change is pending.
    pub quantity: Option<u32>,
    pub unit_price: String,
    /// Original price, only when it differs from the unit price.
    pub full_price: Option<String>,
    pub limit_reached: bool,
    pub decrement_disabled: bool,
    pub increment_disabled: bool,
    pub remove_disabled: bool,
    pub busy: bool,
    pub removing: bool,
    pub error: Option<String>,
}

/// Last non-empty path segment of a product URL.
#[must_use]
pub fn product_slug(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').find(|s| !s.is_empty())
}

impl CartLineItemView {
    #[must_use]
    pub fn build(
        item: &LineItem,
        cart: &Cart,
        media: &MediaResolver,
        state: LineMutationState,
    ) -> Self {
        let currency = cart.display_currency();
        let slug = item.url.as_deref().and_then(product_slug);
        let href = slug.map_or_else(
            || "/shop".to_string(),
            |s| format!("/products/{}", urlencoding::encode(s)),
        );

        let translated_name = item
            .product_name
            .as_ref()
            .and_then(TranslatableString::text);
        let name = translated_name.unwrap_or("Item").to_string();
        let image = media.image(
            item.image.as_deref(),
            translated_name,
            "Product image",
            CART_IMAGE_SIZE,
            CART_IMAGE_SIZE,
        );

        let resolved: Vec<&str> = item
            .description_lines
            .iter()
            .filter_map(|line| line.text())
            .collect();
        let description = (!resolved.is_empty()).then(|| resolved.join(", "));

        let unit_price = item
            .price
            .as_ref()
            .and_then(|p| p.display(currency))
            .unwrap_or_default();
        let full_price = match (&item.full_price, &item.price) {
            (Some(full), Some(price)) if full.same_amount(price) => None,
            (Some(full), _) => full.display(currency),
            (None, _) => None,
        };

        let busy = state.pending.is_some();
        let removing = state.pending == Some(PendingChange::Removal);
        let quantity = match state.pending {
            Some(PendingChange::Quantity(q)) => Some(q),
            _ => item.quantity,
        };
        let available = item.availability.as_ref().and_then(|a| a.quantity_available);
        let limit_reached = matches!((quantity, available), (Some(q), Some(a)) if q >= a);

        let id = item.id.as_ref().map(LineItemId::to_string).unwrap_or_default();
        let locked = busy || id.is_empty();

        Self {
            href,
            name,
            image,
            description,
            unit_price,
            full_price,
            limit_reached,
            decrement_disabled: quantity.is_none_or(|q| q <= 1) || locked,
            increment_disabled: limit_reached || quantity.is_none() || locked,
            remove_disabled: locked,
            quantity,
            busy,
            removing,
            error: state.failure,
            id,
        }
    }

    /// Quantity the "-" button submits.
    #[must_use]
    pub fn decrement_to(&self) -> u32 {
        self.quantity.unwrap_or(1).saturating_sub(1).max(1)
    }

    /// Quantity the "+" button submits.
    #[must_use]
    pub fn increment_to(&self) -> u32 {
        self.quantity.unwrap_or(0).saturating_add(1)
    }

    /// Quantity text, blank when unknown.
    #[must_use]
    pub fn quantity_label(&self) -> String {
        self.quantity.map(|q| q.to_string()).unwrap_or_default()
    }
}
