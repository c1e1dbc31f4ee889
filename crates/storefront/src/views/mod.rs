//! View models.
//!
//! Each view turns platform payloads (all-optional wire types) into the
//! plain values a template renders. Templates contain no business rules:
//! badge saturation, quantity limits, strike-through prices and price
//! ranges are all decided here, where they can be unit tested.

mod cart_summary;
mod line_item;
mod product_card;

pub use cart_summary::{CartSummaryView, item_noun, quantity_badge, total_quantity};
pub use line_item::{
    CART_IMAGE_SIZE, CartLineItemView, LineMutationState, product_slug,
};
pub use product_card::{
    CARD_IMAGE_SIZE, ProductCardView, discount_label, display_price, plain_text_excerpt, product_href,
};
