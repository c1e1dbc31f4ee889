//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Redirect to the catalog
//! GET  /health                 - Liveness check
//!
//! # Catalog
//! GET  /shop                   - Product grid
//! GET  /products/{slug}        - Product detail with add-to-cart form
//!
//! # Cart (HTMX fragments)
//! GET  /cart/button            - Trigger button with quantity badge
//! GET  /cart/panel             - Flyout panel (polls itself while pending)
//! POST /cart/panel/open        - Open the flyout
//! POST /cart/panel/close       - Close the flyout
//! GET  /cart/start-shopping    - Close the flyout and go to /shop
//! POST /cart/add               - Add a product (creates the cart if needed)
//! POST /cart/update            - Set a line's quantity
//! POST /cart/remove            - Remove a line
//!
//! # Checkout
//! GET  /checkout               - Create a checkout and redirect to it
//! GET  /checkout/ready         - Landing page for demo-backend checkouts
//! ```

pub mod cart;
pub mod products;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/button", get(cart::button))
        .route("/panel", get(cart::panel))
        .route("/panel/open", post(cart::open))
        .route("/panel/close", post(cart::close))
        .route("/start-shopping", get(cart::start_shopping))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::permanent("/shop") }))
        .route("/health", get(health))
        .route("/shop", get(products::index))
        .route("/products/{slug}", get(products::show))
        .nest("/cart", cart_routes())
        .route("/checkout", get(cart::checkout))
        .route("/checkout/ready", get(cart::checkout_ready))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check the platform.
async fn health() -> &'static str {
    "ok"
}
