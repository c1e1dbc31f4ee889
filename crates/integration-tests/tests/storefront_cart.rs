//! Integration tests for the cart flyout and cart mutations.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::{Method, StatusCode};
use cartwheel_integration_tests::{BASE_URL, TestApp, buffer, line_ids};
use cartwheel_storefront::commerce::CommerceError;
use tower::ServiceExt;

// =============================================================================
// Panel State
// =============================================================================

#[tokio::test]
async fn test_closed_panel_renders_no_sheet() {
    let mut app = TestApp::new();
    let res = app.get("/cart/panel").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("id=\"cart-panel\""));
    assert!(res.body.contains("data-open=\"false\""));
    assert!(!res.body.contains("Your cart is empty"));
}

#[tokio::test]
async fn test_open_empty_cart_shows_empty_state() {
    let mut app = TestApp::new();
    let res = app.post_form("/cart/panel/open", "").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("(0 items)"));
    assert!(res.body.contains("Your cart is empty"));
    assert!(res.body.contains("href=\"/cart/start-shopping\""));
    assert!(res.body.contains("Shipping and taxes calculated at checkout"));

    // The open flag lives in the session
    let res = app.get("/cart/panel").await;
    assert!(res.body.contains("data-open=\"true\""));
}

#[tokio::test]
async fn test_start_shopping_closes_panel() {
    let mut app = TestApp::new();
    app.post_form("/cart/panel/open", "").await;

    let res = app.get("/cart/start-shopping").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), Some("/shop"));

    let res = app.get("/cart/panel").await;
    assert!(res.body.contains("data-open=\"false\""));
}

#[tokio::test]
async fn test_close_panel() {
    let mut app = TestApp::new();
    app.post_form("/cart/panel/open", "").await;
    let res = app.post_form("/cart/panel/close", "").await;
    assert!(res.body.contains("data-open=\"false\""));
}

// =============================================================================
// Add / Update / Remove
// =============================================================================

#[tokio::test]
async fn test_add_creates_cart_and_opens_panel() {
    let mut app = TestApp::new();
    let res = app
        .post_form("/cart/add", "product_id=linen-shirt-id&quantity=2")
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("hx-trigger"), Some("cart-updated"));
    assert!(res.body.contains("data-open=\"true\""));
    assert!(res.body.contains("Linen Shirt"));
    assert!(res.body.contains("2 × $45.00"));
    assert!(res.body.contains("Sand"));
    assert!(res.body.contains("(2 items)"));
    assert!(res.body.contains("$90.00"));
    assert!(!res.body.contains("Your cart is empty"));

    let button = app.get("/cart/button").await;
    assert!(button.body.contains("data-total=\"2\">2<"));
}

#[tokio::test]
async fn test_badge_saturates_at_ten() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", "product_id=ceramic-mug-id&quantity=10")
        .await;
    let button = app.get("/cart/button").await;
    assert!(button.body.contains(">9+<"));
}

#[tokio::test]
async fn test_add_zero_quantity_is_rejected() {
    let mut app = TestApp::new();
    let res = app
        .post_form("/cart/add", "product_id=linen-shirt-id&quantity=0")
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_strike_through_for_discounted_line() {
    let mut app = TestApp::new();
    let res = app.post_form("/cart/add", "product_id=canvas-tote-id").await;
    assert!(res.body.contains("1 × $24.00"));
    assert!(res.body.contains("<span class=\"strike\">$30.00</span>"));
    assert!(res.body.contains("(1 item)"));
}

#[tokio::test]
async fn test_quantity_limit_notice() {
    let mut app = TestApp::new();
    let res = app
        .post_form("/cart/add", "product_id=linen-shirt-id&quantity=4")
        .await;
    assert!(!res.body.contains("Quantity limit reached"));
    let line_id = line_ids(&res.body).remove(0);

    let res = app
        .post_form("/cart/update", &format!("line_id={line_id}&quantity=5"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("hx-trigger"), Some("cart-updated"));
    assert!(res.body.contains("5 × $45.00"));
    assert!(res.body.contains("Quantity limit reached"));
}

#[tokio::test]
async fn test_failed_update_shows_inline_error_once() {
    let mut app = TestApp::new();
    let res = app
        .post_form("/cart/add", "product_id=linen-shirt-id&quantity=5")
        .await;
    let line_id = line_ids(&res.body).remove(0);

    let res = app
        .post_form("/cart/update", &format!("line_id={line_id}&quantity=6"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.header("hx-trigger").is_none());
    assert!(res.body.contains("Only 5 left in stock"));
    // Reverted to the remote quantity
    assert!(res.body.contains("5 × $45.00"));

    let res = app.get("/cart/panel").await;
    assert!(!res.body.contains("Only 5 left in stock"));
}

#[tokio::test]
async fn test_query_error_shows_with_stale_items() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", "product_id=ceramic-mug-id").await;

    // The failed mutation refetches the cart, and that fetch fails too
    app.commerce.fail_next_fetch(CommerceError::RateLimited(3));
    let res = app
        .post_form("/cart/update", "line_id=missing-line&quantity=2")
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("The store is busy, please try again in a moment."));
    assert!(res.body.contains("Ceramic Mug"));
    assert!(!res.body.contains("Your cart is empty"));
}

#[tokio::test]
async fn test_remove_last_line_shows_empty_state() {
    let mut app = TestApp::new();
    let res = app.post_form("/cart/add", "product_id=ceramic-mug-id").await;
    let line_id = line_ids(&res.body).remove(0);

    let res = app
        .post_form("/cart/remove", &format!("line_id={line_id}"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(line_ids(&res.body).is_empty());
    assert!(res.body.contains("Your cart is empty"));
    assert!(res.body.contains("(0 items)"));
}

#[tokio::test]
async fn test_expired_cart_renders_empty_and_leaves_session() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", "product_id=linen-shirt-id").await;

    // The platform dropped the cart and the cached query went idle
    for cart_id in app.commerce.expire_carts() {
        app.state.queries().forget(&cart_id).await;
    }

    let res = app.get("/cart/panel").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Your cart is empty"));
    assert!(!res.body.contains("could not be found"));
    assert!(line_ids(&res.body).is_empty());

    // The stale cart ID is gone from the session
    let res = app.get("/checkout").await;
    assert_eq!(res.header("location"), Some("/shop"));
}

#[tokio::test]
async fn test_mutation_on_expired_cart_shows_empty_state() {
    let mut app = TestApp::new();
    let res = app.post_form("/cart/add", "product_id=ceramic-mug-id").await;
    let line_id = line_ids(&res.body).remove(0);
    app.commerce.expire_carts();

    let res = app
        .post_form("/cart/update", &format!("line_id={line_id}&quantity=2"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Your cart is empty"));
    assert!(res.body.contains("(0 items)"));

    // Adding again starts a new cart
    let res = app.post_form("/cart/add", "product_id=ceramic-mug-id").await;
    assert!(res.body.contains("1 × $12.00"));
}

#[tokio::test]
async fn test_add_overflowing_quantity_is_rejected() {
    let mut app = TestApp::new();
    let form = "product_id=ceramic-mug-id&quantity=4294967295";
    assert_eq!(app.post_form("/cart/add", form).await.status, StatusCode::OK);

    let res = app.post_form("/cart/add", form).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Quantity is too large");
}

#[tokio::test]
async fn test_update_without_cart_is_bad_request() {
    let mut app = TestApp::new();
    let res = app
        .post_form("/cart/update", "line_id=abc&quantity=2")
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_update_on_same_line_is_busy() {
    let mut app = TestApp::new();
    let res = app
        .post_form("/cart/add", "product_id=canvas-tote-id&quantity=1")
        .await;
    let line_id = line_ids(&res.body).remove(0);
    let gate = app.commerce.hold_mutations();

    let first = {
        let request = app.request(
            Method::POST,
            "/cart/update",
            Some(format!("line_id={line_id}&quantity=2")),
        );
        let router = app.router();
        tokio::spawn(async move { buffer(router.oneshot(request).await.unwrap()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = app
        .post_form("/cart/update", &format!("line_id={line_id}&quantity=3"))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.body.contains("is-busy"));
    assert!(second.header("hx-trigger").is_none());

    gate.release();
    let first = first.await.unwrap();
    assert_eq!(first.header("hx-trigger"), Some("cart-updated"));
    assert!(first.body.contains("2 × $24.00"));
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_redirects_with_checkout_id() {
    let mut app = TestApp::new();
    app.post_form("/cart/add", "product_id=linen-shirt-id").await;

    let res = app.get("/checkout").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let location = res.header("location").unwrap();
    let prefix = format!("{BASE_URL}/checkout/ready?checkoutId=");
    assert!(location.starts_with(&prefix), "location = {location}");

    let path = location.trim_start_matches(BASE_URL).to_string();
    let res = app.get(&path).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Your checkout is ready"));
}

#[tokio::test]
async fn test_checkout_without_cart_goes_to_shop() {
    let mut app = TestApp::new();
    let res = app.get("/checkout").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), Some("/shop"));
}
