//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::commerce::{CommerceError, Product};
use crate::error::{AppError, Result};
use crate::filters;
use crate::media::ImageView;
use crate::middleware::CspNonce;
use crate::models::CartSession;
use crate::routes::cart::load_summary;
use crate::state::AppState;
use crate::views::{CartSummaryView, ProductCardView, display_price, plain_text_excerpt};

/// Products shown on the listing page by default.
const DEFAULT_LIMIT: u32 = 24;

/// Most products a single listing request may ask for.
const MAX_LIMIT: u32 = 100;

/// Detail page image size.
const DETAIL_IMAGE_SIZE: u32 = 1000;

/// Detail pages show the whole description as text.
const DETAIL_DESCRIPTION_CHARS: usize = 2000;

/// Listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub limit: Option<u32>,
}

/// Product detail display data.
#[derive(Debug, Clone)]
pub struct ProductDetailView {
    pub id: String,
    pub name: String,
    pub image: ImageView,
    pub ribbon: Option<String>,
    pub price: String,
    pub description: String,
    pub in_stock: bool,
}

impl ProductDetailView {
    fn build(product: &Product, state: &AppState) -> Self {
        let main_image = product.main_image();
        let name = product.name.clone().unwrap_or_default();
        Self {
            id: product.id.as_ref().map(ToString::to_string).unwrap_or_default(),
            image: state.media().image(
                main_image.and_then(|i| i.url.as_deref()),
                main_image.and_then(|i| i.alt_text.as_deref()),
                &name,
                DETAIL_IMAGE_SIZE,
                DETAIL_IMAGE_SIZE,
            ),
            ribbon: product.ribbon.clone().filter(|r| !r.trim().is_empty()),
            price: display_price(product),
            description: product
                .description
                .as_deref()
                .map(|html| plain_text_excerpt(html, DETAIL_DESCRIPTION_CHARS))
                .unwrap_or_default(),
            in_stock: product.in_stock.unwrap_or(true),
            name,
        }
    }
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "shop/index.html")]
pub struct ShopTemplate {
    pub cart: CartSummaryView,
    pub products: Vec<ProductCardView>,
    pub nonce: String,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub cart: CartSummaryView,
    pub product: ProductDetailView,
    pub nonce: String,
}

/// Display the product listing.
#[instrument(skip(state, session, nonce))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    CspNonce(nonce): CspNonce,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let products = state.commerce().query_products(limit).await?;
    let cart = load_summary(&state, &CartSession::new(session), std::time::Duration::ZERO, false)
        .await?;

    Ok(ShopTemplate {
        cart,
        products: products
            .iter()
            .map(|p| ProductCardView::build(p, state.media()))
            .collect(),
        nonce,
    })
}

/// Display a product detail page.
#[instrument(skip(state, session, nonce))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CspNonce(nonce): CspNonce,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let product = match state.commerce().get_product_by_slug(&slug).await {
        Ok(product) => product,
        Err(CommerceError::NotFound(_)) => {
            return Err(AppError::NotFound(format!("Product {slug}")));
        }
        Err(e) => return Err(e.into()),
    };
    let cart = load_summary(&state, &CartSession::new(session), std::time::Duration::ZERO, false)
        .await?;

    Ok(ProductShowTemplate {
        cart,
        product: ProductDetailView::build(&product, &state),
        nonce,
    })
}
