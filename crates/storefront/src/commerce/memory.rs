//! In-memory commerce backend.
//!
//! Serves a small demo catalog and keeps carts in a `HashMap`, so the
//! storefront can run locally without platform credentials
//! (`COMMERCE_BACKEND=memory`). Tests use the same backend and its hooks to
//! hold mutations open or make the next call fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cartwheel_core::{
    CartId, CheckoutId, CurrencyCode, LineItemId, ProductId, format_currency,
};
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

use super::types::{
    Cart, CatalogReference, ColorInfo, DescriptionLine, Discount, DiscountType, FormattedPrice,
    ItemAvailability, LineItem, LineItemInput, LineItemQuantityUpdate, MediaImage, MediaItem,
    MultiCurrencyPrice, PriceData, PriceRange, Product, ProductMedia, STORES_APP_ID,
    TranslatableString,
};
use super::{CommerceApi, CommerceError};

/// Catalog entry plus the stock the fake enforces.
#[derive(Debug, Clone)]
struct StockedProduct {
    product: Product,
    stock: Option<u32>,
    color: Option<String>,
}

#[derive(Default)]
struct Store {
    products: Vec<StockedProduct>,
    carts: HashMap<CartId, Cart>,
    fail_next_fetch: Option<CommerceError>,
    fail_next_mutation: Option<CommerceError>,
    gate: Option<Arc<Semaphore>>,
}

/// Blocks cart mutations on a [`MemoryCommerce`] until released.
pub struct MutationGate {
    semaphore: Arc<Semaphore>,
}

impl MutationGate {
    /// Let held and future mutations proceed.
    pub fn release(&self) {
        self.semaphore.close();
    }
}

/// In-memory implementation of [`CommerceApi`].
#[derive(Default)]
pub struct MemoryCommerce {
    store: Mutex<Store>,
}

fn usd() -> CurrencyCode {
    CurrencyCode::default()
}

fn money(amount: Decimal) -> MultiCurrencyPrice {
    let formatted = format_currency(amount, &usd());
    MultiCurrencyPrice {
        amount: Some(amount.to_string()),
        converted_amount: Some(amount.to_string()),
        formatted_amount: Some(formatted.clone()),
        formatted_converted_amount: Some(formatted),
    }
}

#[allow(clippy::too_many_arguments)]
fn demo_product(
    slug: &str,
    name: &str,
    price: Decimal,
    discounted: Option<Decimal>,
    range: Option<(Decimal, Decimal)>,
    ribbon: Option<&str>,
    discount: Option<Discount>,
    description: &str,
) -> Product {
    let currency = usd();
    let discounted_price = discounted.unwrap_or(price);
    Product {
        id: Some(ProductId::new(format!("{slug}-id"))),
        name: Some(name.to_string()),
        slug: Some(slug.to_string()),
        description: Some(description.to_string()),
        media: Some(ProductMedia {
            main_media: Some(MediaItem {
                image: Some(MediaImage {
                    url: Some(format!("wix:image://v1/{slug}~mv2.jpg/{slug}.jpg")),
                    alt_text: Some(name.to_string()),
                    width: Some(1000),
                    height: Some(1000),
                }),
            }),
            items: Vec::new(),
        }),
        ribbon: ribbon.map(str::to_string),
        discount,
        price_data: Some(PriceData {
            price: Some(price),
            discounted_price: Some(discounted_price),
            formatted: Some(FormattedPrice {
                price: Some(format_currency(price, &currency)),
                discounted_price: Some(format_currency(discounted_price, &currency)),
            }),
            currency: Some(currency),
        }),
        price_range: range.map(|(min, max)| PriceRange {
            min_value: Some(min),
            max_value: Some(max),
        }),
        in_stock: Some(true),
    }
}

fn demo_catalog() -> Vec<StockedProduct> {
    vec![
        StockedProduct {
            product: demo_product(
                "linen-shirt",
                "Linen Shirt",
                Decimal::new(4500, 2),
                None,
                None,
                Some("New"),
                None,
                "<p>Breathable <strong>linen</strong> for warm days.</p>",
            ),
            stock: Some(5),
            color: Some("Sand".to_string()),
        },
        StockedProduct {
            product: demo_product(
                "ceramic-mug",
                "Ceramic Mug",
                Decimal::new(1200, 2),
                None,
                Some((Decimal::new(1200, 2), Decimal::new(1800, 2))),
                None,
                None,
                "<p>Hand-glazed stoneware, 350&nbsp;ml.</p>",
            ),
            stock: None,
            color: None,
        },
        StockedProduct {
            product: demo_product(
                "canvas-tote",
                "Canvas Tote",
                Decimal::new(3000, 2),
                Some(Decimal::new(2400, 2)),
                None,
                Some("Sale"),
                Some(Discount {
                    kind: DiscountType::Percent,
                    value: Some(Decimal::new(20, 0)),
                }),
                "<p>Heavy cotton canvas &amp; leather handles.</p>",
            ),
            stock: Some(12),
            color: Some("Natural".to_string()),
        },
    ]
}

impl MemoryCommerce {
    /// A backend with the demo catalog and no carts.
    #[must_use]
    pub fn with_demo_catalog() -> Self {
        Self {
            store: Mutex::new(Store {
                products: demo_catalog(),
                ..Store::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put `quantity` of the product `slug` into cart `cart_id`, creating
    /// the cart if needed. Returns the cart and new line IDs.
    ///
    /// # Panics
    ///
    /// Panics if `slug` is not in the catalog.
    #[allow(clippy::expect_used)]
    pub fn seed_cart(&self, cart_id: &str, slug: &str, quantity: u32) -> (CartId, LineItemId) {
        let mut store = self.lock();
        let stocked = store
            .products
            .iter()
            .find(|p| p.product.slug.as_deref() == Some(slug))
            .cloned()
            .expect("seeded product must exist in the demo catalog");

        let id = CartId::new(cart_id);
        let line = build_line(&stocked, quantity);
        let line_id = line.id.clone().unwrap_or_else(|| LineItemId::new(""));

        let cart = store.carts.entry(id.clone()).or_insert_with(|| Cart {
            id: Some(id.clone()),
            currency: Some(usd()),
            ..Cart::default()
        });
        cart.line_items.push(line);
        recompute_subtotal(cart);

        (id, line_id)
    }

    /// Make the next `get_cart` fail with `err`.
    pub fn fail_next_fetch(&self, err: CommerceError) {
        self.lock().fail_next_fetch = Some(err);
    }

    /// Make the next cart mutation fail with `err`.
    pub fn fail_next_mutation(&self, err: CommerceError) {
        self.lock().fail_next_mutation = Some(err);
    }

    /// Drop every cart, as the platform does once their orders are placed.
    /// Returns the dropped cart IDs.
    pub fn expire_carts(&self) -> Vec<CartId> {
        self.lock().carts.drain().map(|(id, _)| id).collect()
    }

    /// Hold all cart mutations until the returned gate is released.
    #[must_use]
    pub fn hold_mutations(&self) -> MutationGate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.lock().gate = Some(Arc::clone(&semaphore));
        MutationGate { semaphore }
    }

    /// Wait on the gate (if any), then apply `change` to the cart.
    async fn mutate<F>(&self, cart_id: &CartId, change: F) -> Result<Cart, CommerceError>
    where
        F: FnOnce(&[StockedProduct], &mut Cart) -> Result<(), CommerceError> + Send,
    {
        let gate = self.lock().gate.clone();
        if let Some(gate) = gate {
            // A closed semaphore means the gate was released.
            let _ = gate.acquire().await;
        }

        let mut store = self.lock();
        if let Some(err) = store.fail_next_mutation.take() {
            return Err(err);
        }
        let Store {
            products, carts, ..
        } = &mut *store;
        let cart = carts
            .get_mut(cart_id)
            .ok_or_else(|| CommerceError::NotFound(format!("Cart not found: {cart_id}")))?;
        change(products, cart)?;
        recompute_subtotal(cart);
        Ok(cart.clone())
    }
}

fn build_line(stocked: &StockedProduct, quantity: u32) -> LineItem {
    let product = &stocked.product;
    let price_data = product.price_data.clone().unwrap_or_default();
    let price = price_data.discounted_price.or(price_data.price).unwrap_or_default();
    let full_price = price_data.price.unwrap_or(price);

    LineItem {
        id: Some(LineItemId::new(Uuid::new_v4().to_string())),
        quantity: Some(quantity),
        product_name: Some(TranslatableString {
            original: product.name.clone(),
            translated: product.name.clone(),
        }),
        url: product
            .slug
            .as_ref()
            .map(|s| format!("https://shop.example.com/product-page/{s}")),
        image: product.main_image().and_then(|i| i.url.clone()),
        price: Some(money(price)),
        full_price: Some(money(full_price)),
        availability: Some(ItemAvailability {
            status: Some("AVAILABLE".to_string()),
            quantity_available: stocked.stock,
        }),
        description_lines: stocked
            .color
            .iter()
            .map(|color| DescriptionLine {
                name: Some(TranslatableString {
                    original: Some("Color".to_string()),
                    translated: None,
                }),
                plain_text: None,
                color_info: Some(ColorInfo {
                    original: Some(color.clone()),
                    translated: None,
                    code: None,
                }),
            })
            .collect(),
        catalog_reference: Some(CatalogReference {
            catalog_item_id: product.id.as_ref().map(ToString::to_string).unwrap_or_default(),
            app_id: STORES_APP_ID.to_string(),
            options: None,
        }),
    }
}

fn recompute_subtotal(cart: &mut Cart) {
    let total: Decimal = cart
        .line_items
        .iter()
        .filter_map(|line| {
            let unit = line.price.as_ref()?.value()?;
            Some(unit * Decimal::from(line.quantity.unwrap_or(0)))
        })
        .sum();
    cart.subtotal = Some(money(total));
}

fn check_stock(line: &LineItem, quantity: u32) -> Result<(), CommerceError> {
    match line.availability.as_ref().and_then(|a| a.quantity_available) {
        Some(stock) if quantity > stock => Err(CommerceError::UserError(format!(
            "Only {stock} left in stock"
        ))),
        _ => Ok(()),
    }
}

fn add_lines(
    products: &[StockedProduct],
    cart: &mut Cart,
    lines: Vec<LineItemInput>,
) -> Result<(), CommerceError> {
    for input in lines {
        let item_id = input.catalog_reference.catalog_item_id;
        let stocked = products
            .iter()
            .find(|p| p.product.id.as_ref().map(ProductId::as_str) == Some(item_id.as_str()))
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {item_id}")))?;

        let existing = cart.line_items.iter_mut().find(|line| {
            line.catalog_reference
                .as_ref()
                .is_some_and(|r| r.catalog_item_id == item_id)
        });

        if let Some(line) = existing {
            let quantity = line
                .quantity
                .unwrap_or(0)
                .checked_add(input.quantity)
                .ok_or_else(|| CommerceError::UserError("Quantity is too large".to_string()))?;
            check_stock(line, quantity)?;
            line.quantity = Some(quantity);
        } else {
            let line = build_line(stocked, input.quantity);
            check_stock(&line, input.quantity)?;
            cart.line_items.push(line);
        }
    }
    Ok(())
}

#[async_trait]
impl CommerceApi for MemoryCommerce {
    async fn get_cart(&self, cart_id: &CartId) -> Result<Cart, CommerceError> {
        let mut store = self.lock();
        if let Some(err) = store.fail_next_fetch.take() {
            return Err(err);
        }
        store
            .carts
            .get(cart_id)
            .cloned()
            .ok_or_else(|| CommerceError::NotFound(format!("Cart not found: {cart_id}")))
    }

    async fn create_cart(&self, lines: Vec<LineItemInput>) -> Result<Cart, CommerceError> {
        let id = CartId::new(Uuid::new_v4().to_string());
        let mut cart = Cart {
            id: Some(id.clone()),
            currency: Some(usd()),
            ..Cart::default()
        };

        let mut store = self.lock();
        add_lines(&store.products, &mut cart, lines)?;
        recompute_subtotal(&mut cart);
        store.carts.insert(id, cart.clone());
        debug!(cart_id = ?cart.id, "Created in-memory cart");
        Ok(cart)
    }

    async fn add_to_cart(
        &self,
        cart_id: &CartId,
        lines: Vec<LineItemInput>,
    ) -> Result<Cart, CommerceError> {
        self.mutate(cart_id, move |products, cart| add_lines(products, cart, lines))
            .await
    }

    async fn update_line_item_quantity(
        &self,
        cart_id: &CartId,
        updates: Vec<LineItemQuantityUpdate>,
    ) -> Result<Cart, CommerceError> {
        self.mutate(cart_id, move |_, cart| {
            for update in updates {
                let line = cart
                    .line_items
                    .iter_mut()
                    .find(|l| l.id.as_ref() == Some(&update.id))
                    .ok_or_else(|| {
                        CommerceError::NotFound(format!("Line item not found: {}", update.id))
                    })?;
                check_stock(line, update.quantity)?;
                line.quantity = Some(update.quantity);
            }
            Ok(())
        })
        .await
    }

    async fn remove_line_items(
        &self,
        cart_id: &CartId,
        line_item_ids: Vec<LineItemId>,
    ) -> Result<Cart, CommerceError> {
        self.mutate(cart_id, move |_, cart| {
            cart.line_items
                .retain(|l| l.id.as_ref().is_none_or(|id| !line_item_ids.contains(id)));
            Ok(())
        })
        .await
    }

    async fn create_checkout(&self, cart_id: &CartId) -> Result<CheckoutId, CommerceError> {
        let store = self.lock();
        let cart = store
            .carts
            .get(cart_id)
            .ok_or_else(|| CommerceError::NotFound(format!("Cart not found: {cart_id}")))?;
        if cart.line_items.is_empty() {
            return Err(CommerceError::UserError("Your cart is empty".to_string()));
        }
        Ok(CheckoutId::new(Uuid::new_v4().to_string()))
    }

    async fn query_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .products
            .iter()
            .take(limit)
            .map(|p| p.product.clone())
            .collect())
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Product, CommerceError> {
        self.lock()
            .products
            .iter()
            .find(|p| p.product.slug.as_deref() == Some(slug))
            .map(|p| p.product.clone())
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {slug}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_merges_existing_line() {
        let api = MemoryCommerce::with_demo_catalog();
        let (cart_id, _) = api.seed_cart("c", "canvas-tote", 1);

        let input = LineItemInput::product(&ProductId::new("canvas-tote-id"), None, 2);
        let cart = api.add_to_cart(&cart_id, vec![input]).await.unwrap();
        assert_eq!(cart.line_items.len(), 1);
        assert_eq!(cart.line_items[0].quantity, Some(3));
        assert_eq!(
            cart.subtotal.unwrap().formatted_converted_amount.as_deref(),
            Some("$72.00")
        );
    }

    #[tokio::test]
    async fn test_add_overflowing_quantity_is_user_error() {
        let api = MemoryCommerce::with_demo_catalog();
        let (cart_id, _) = api.seed_cart("c", "ceramic-mug", u32::MAX);

        let input = LineItemInput::product(&ProductId::new("ceramic-mug-id"), None, 1);
        let err = api.add_to_cart(&cart_id, vec![input]).await.unwrap_err();
        assert!(matches!(err, CommerceError::UserError(_)));

        let cart = api.get_cart(&cart_id).await.unwrap();
        assert_eq!(cart.line_items[0].quantity, Some(u32::MAX));
    }

    #[tokio::test]
    async fn test_update_beyond_stock_is_user_error() {
        let api = MemoryCommerce::with_demo_catalog();
        let (cart_id, line_id) = api.seed_cart("c", "linen-shirt", 1);

        let err = api
            .update_line_item_quantity(
                &cart_id,
                vec![LineItemQuantityUpdate {
                    id: line_id,
                    quantity: 6,
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User error: Only 5 left in stock");
    }

    #[tokio::test]
    async fn test_fail_next_fetch_is_one_shot() {
        let api = MemoryCommerce::with_demo_catalog();
        let (cart_id, _) = api.seed_cart("c", "ceramic-mug", 1);
        api.fail_next_fetch(CommerceError::RateLimited(2));

        assert!(api.get_cart(&cart_id).await.is_err());
        assert!(api.get_cart(&cart_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_checkout_requires_items() {
        let api = MemoryCommerce::with_demo_catalog();
        let (cart_id, line_id) = api.seed_cart("c", "ceramic-mug", 1);
        api.remove_line_items(&cart_id, vec![line_id]).await.unwrap();

        let err = api.create_checkout(&cart_id).await.unwrap_err();
        assert!(matches!(err, CommerceError::UserError(_)));
    }
}
