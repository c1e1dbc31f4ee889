//! Product listing card.

use std::sync::LazyLock;

use cartwheel_core::{CurrencyCode, format_currency};
use regex::Regex;

use crate::commerce::{Discount, DiscountType, Product};
use crate::media::{ImageView, MediaResolver};

/// Card image size.
pub const CARD_IMAGE_SIZE: u32 = 700;

/// Characters kept from the description on a card.
const EXCERPT_CHARS: usize = 160;

/// Matches HTML tags.
#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

/// Matches whitespace runs.
#[allow(clippy::expect_used)]
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// Display data for a product card.
#[derive(Debug, Clone)]
pub struct ProductCardView {
    pub href: String,
    pub name: String,
    pub image: ImageView,
    pub ribbon: Option<String>,
    pub discount: Option<String>,
    pub price: String,
    pub excerpt: String,
}

impl ProductCardView {
    #[must_use]
    pub fn build(product: &Product, media: &MediaResolver) -> Self {
        let main_image = product.main_image();
        let name = product.name.clone().unwrap_or_default();
        let currency = product.price_data.as_ref().and_then(|p| p.currency.as_ref());

        Self {
            href: product_href(product),
            image: media.image(
                main_image.and_then(|i| i.url.as_deref()),
                main_image.and_then(|i| i.alt_text.as_deref()),
                &name,
                CARD_IMAGE_SIZE,
                CARD_IMAGE_SIZE,
            ),
            ribbon: product.ribbon.clone().filter(|r| !r.trim().is_empty()),
            discount: product
                .discount
                .as_ref()
                .and_then(|d| discount_label(d, currency)),
            price: display_price(product),
            excerpt: product
                .description
                .as_deref()
                .map(|html| plain_text_excerpt(html, EXCERPT_CHARS))
                .unwrap_or_default(),
            name,
        }
    }
}

/// Detail page path for a product, or the listing when it has no slug.
#[must_use]
pub fn product_href(product: &Product) -> String {
    product
        .slug
        .as_deref()
        .filter(|s| !s.is_empty())
        .map_or_else(
            || "/shop".to_string(),
            |slug| format!("/products/{}", urlencoding::encode(slug)),
        )
}

/// Price badge text.
///
/// Products whose variants span a range show `from {min}`; everything else
/// shows the formatted discounted price, the formatted base price, or `n/a`.
#[must_use]
pub fn display_price(product: &Product) -> String {
    let price_data = product.price_data.as_ref();

    if let Some(range) = &product.price_range
        && let (Some(min), Some(max)) = (range.min_value, range.max_value)
        && min != max
    {
        let currency = price_data
            .and_then(|p| p.currency.clone())
            .unwrap_or_default();
        return format!("from {}", format_currency(min, &currency));
    }

    price_data
        .and_then(|p| p.formatted.as_ref())
        .and_then(|f| {
            f.discounted_price
                .as_deref()
                .filter(|s| !s.is_empty())
                .or_else(|| f.price.as_deref().filter(|s| !s.is_empty()))
        })
        .unwrap_or("n/a")
        .to_string()
}

/// Discount badge text: `-20%` or `-$5.00`.
///
/// `None` when the discount type is `NONE` or the value is not positive.
#[must_use]
pub fn discount_label(discount: &Discount, currency: Option<&CurrencyCode>) -> Option<String> {
    let value = discount.value.filter(|v| v.is_sign_positive() && !v.is_zero())?;
    match discount.kind {
        DiscountType::None => None,
        DiscountType::Percent => Some(format!("-{}%", value.normalize())),
        DiscountType::Amount => Some(format!(
            "-{}",
            format_currency(value, &currency.cloned().unwrap_or_default())
        )),
    }
}

/// Plain-text excerpt of an HTML description.
///
/// Tags are stripped, common entities decoded and whitespace collapsed; the
/// result is cut at `max_chars` characters with an ellipsis.
#[must_use]
pub fn plain_text_excerpt(html: &str, max_chars: usize) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = WHITESPACE_RE.replace_all(text.trim(), " ");

    if text.chars().count() <= max_chars {
        return text.into_owned();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::commerce::{FormattedPrice, MediaImage, MediaItem, PriceData, PriceRange, ProductMedia};

    fn priced(base: Option<&str>, discounted: Option<&str>) -> Product {
        Product {
            name: Some("Canvas Tote".to_string()),
            slug: Some("canvas-tote".to_string()),
            price_data: Some(PriceData {
                currency: Some(CurrencyCode::default()),
                formatted: Some(FormattedPrice {
                    price: base.map(str::to_string),
                    discounted_price: discounted.map(str::to_string),
                }),
                ..PriceData::default()
            }),
            ..Product::default()
        }
    }

    #[test]
    fn test_display_price_fixed() {
        assert_eq!(display_price(&priced(Some("$30.00"), None)), "$30.00");
    }

    #[test]
    fn test_display_price_discounted() {
        assert_eq!(
            display_price(&priced(Some("$30.00"), Some("$24.00"))),
            "$24.00"
        );
    }

    #[test]
    fn test_display_price_range() {
        let mut product = priced(Some("$12.00"), None);
        product.price_range = Some(PriceRange {
            min_value: Some(Decimal::new(12, 0)),
            max_value: Some(Decimal::new(18, 0)),
        });
        assert_eq!(display_price(&product), "from $12.00");
    }

    #[test]
    fn test_display_price_equal_range_is_fixed() {
        let mut product = priced(Some("$12.00"), None);
        product.price_range = Some(PriceRange {
            min_value: Some(Decimal::new(12, 0)),
            max_value: Some(Decimal::new(1200, 2)),
        });
        assert_eq!(display_price(&product), "$12.00");
    }

    #[test]
    fn test_display_price_missing() {
        assert_eq!(display_price(&Product::default()), "n/a");
        assert_eq!(display_price(&priced(Some(""), None)), "n/a");
    }

    #[test]
    fn test_discount_label() {
        let percent = Discount {
            kind: DiscountType::Percent,
            value: Some(Decimal::new(2000, 2)),
        };
        assert_eq!(discount_label(&percent, None).as_deref(), Some("-20%"));

        let amount = Discount {
            kind: DiscountType::Amount,
            value: Some(Decimal::new(5, 0)),
        };
        assert_eq!(discount_label(&amount, None).as_deref(), Some("-$5.00"));

        let none = Discount {
            kind: DiscountType::None,
            value: Some(Decimal::new(5, 0)),
        };
        assert_eq!(discount_label(&none, None), None);

        let zero = Discount {
            kind: DiscountType::Percent,
            value: Some(Decimal::ZERO),
        };
        assert_eq!(discount_label(&zero, None), None);
    }

    #[test]
    fn test_plain_text_excerpt() {
        let html = "<p>Heavy cotton&nbsp;canvas &amp; leather</p>\n<p>handles.</p>";
        assert_eq!(
            plain_text_excerpt(html, 200),
            "Heavy cotton canvas & leather handles."
        );
        assert_eq!(plain_text_excerpt("<b>abcdef</b>", 3), "abc…");
    }

    #[test]
    fn test_card_badges_and_image() {
        let mut product = priced(Some("$30.00"), Some("$24.00"));
        product.ribbon = Some("Sale".to_string());
        product.discount = Some(Discount {
            kind: DiscountType::Percent,
            value: Some(Decimal::new(20, 0)),
        });
        product.media = Some(ProductMedia {
            main_media: Some(MediaItem {
                image: Some(MediaImage {
                    url: Some("wix:image://v1/tote~mv2.jpg/tote.jpg".to_string()),
                    ..MediaImage::default()
                }),
            }),
            items: Vec::new(),
        });

        let card = ProductCardView::build(&product, &MediaResolver::new("https://media.test"));
        assert_eq!(card.href, "/products/canvas-tote");
        assert_eq!(card.ribbon.as_deref(), Some("Sale"));
        assert_eq!(card.discount.as_deref(), Some("-20%"));
        assert_eq!(card.price, "$24.00");
        assert_eq!(card.image.alt, "Canvas Tote");
        assert!(card.image.src.contains("w_700,h_700"));
    }
}
