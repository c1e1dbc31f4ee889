//! The cart flyout panel and its trigger button.

use cartwheel_core::LineItemId;

use crate::commerce::{Cart, LineItem};
use crate::media::MediaResolver;
use crate::query::QuerySnapshot;

use super::line_item::{CartLineItemView, LineMutationState};

/// Totals at or above this show as "9+".
const BADGE_SATURATION: u32 = 10;

/// Sum of line quantities; a missing quantity counts as zero.
#[must_use]
pub fn total_quantity(items: &[LineItem]) -> u32 {
    items
        .iter()
        .fold(0u32, |acc, item| acc.saturating_add(item.quantity.unwrap_or(0)))
}

/// Badge text for the cart trigger button.
#[must_use]
pub fn quantity_badge(total: u32) -> String {
    if total < BADGE_SATURATION {
        total.to_string()
    } else {
        format!("{}+", BADGE_SATURATION - 1)
    }
}

#[must_use]
pub const fn item_noun(total: u32) -> &'static str {
    if total == 1 { "item" } else { "items" }
}

/// Everything the cart button and flyout panel render.
#[derive(Debug, Clone)]
pub struct CartSummaryView {
    pub open: bool,
    pub total_quantity: u32,
    pub badge: String,
    pub noun: &'static str,
    pub items: Vec<CartLineItemView>,
    pub is_pending: bool,
    pub error: Option<String>,
    pub show_empty_state: bool,
    pub subtotal: Option<String>,
    pub checkout_enabled: bool,
}

impl CartSummaryView {
    /// Build the view from the latest query snapshot.
    ///
    /// `line_state` reports per-line mutation status (in-flight change,
    /// last failure). The list, the loading indicator and the error can all
    /// show at once; the empty state shows only when the query has settled
    /// with no items and no error.
    pub fn build<F>(
        snapshot: &QuerySnapshot<Cart>,
        open: bool,
        media: &MediaResolver,
        mut line_state: F,
    ) -> Self
    where
        F: FnMut(&LineItemId) -> LineMutationState,
    {
        let cart = snapshot.data.as_deref();
        let line_items = cart.map_or(&[][..], |c| c.line_items.as_slice());

        let items: Vec<CartLineItemView> = cart
            .map(|cart| {
                line_items
                    .iter()
                    .map(|item| {
                        let state = item
                            .id
                            .as_ref()
                            .map(&mut line_state)
                            .unwrap_or_default();
                        CartLineItemView::build(item, cart, media, state)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = total_quantity(line_items);
        let error = snapshot.error.as_ref().map(|e| e.message.clone());
        let subtotal = cart.and_then(|c| {
            c.subtotal
                .as_ref()
                .and_then(|s| s.display(c.display_currency()))
        });

        Self {
            open,
            total_quantity: total,
            badge: quantity_badge(total),
            noun: item_noun(total),
            show_empty_state: !snapshot.is_pending && items.is_empty() && error.is_none(),
            checkout_enabled: !items.is_empty(),
            is_pending: snapshot.is_pending,
            items,
            error,
            subtotal,
        }
    }
}
