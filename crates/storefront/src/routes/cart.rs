//! Cart route handlers.
//!
//! The cart button and flyout panel are HTMX fragments. Every cart response
//! is rendered from the cart query snapshot; while a fetch is pending the
//! panel polls itself until the snapshot settles. Mutations return the
//! re-rendered panel and fire `cart-updated` so the button refreshes.

use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use cartwheel_core::{CartId, LineItemId, ProductId};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::commerce::{CommerceError, LineItemInput};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::models::CartSession;
use crate::mutation::MutationError;
use crate::query::QuerySnapshot;
use crate::state::AppState;
use crate::views::{CartSummaryView, LineMutationState};

/// How long a cart response waits for a pending fetch before rendering the
/// loading state.
const SETTLE_WAIT: Duration = Duration::from_millis(250);

/// HTMX event fired after any cart change.
const CART_UPDATED: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Cart trigger button fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_button.html")]
pub struct CartButtonTemplate {
    pub cart: CartSummaryView,
}

/// Cart flyout panel fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_panel.html")]
pub struct CartPanelTemplate {
    pub cart: CartSummaryView,
}

/// Checkout landing page.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/ready.html")]
pub struct CheckoutReadyTemplate {
    pub cart: CartSummaryView,
    pub checkout_id: String,
    pub nonce: String,
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: Option<u32>,
}

/// Quantity change form data.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityForm {
    pub line_id: String,
    pub quantity: u32,
}

/// Remove line form data.
#[derive(Debug, Deserialize)]
pub struct RemoveLineForm {
    pub line_id: String,
}

/// Checkout landing query.
#[derive(Debug, Deserialize)]
pub struct CheckoutReadyQuery {
    #[serde(rename = "checkoutId")]
    pub checkout_id: Option<String>,
}

/// Build the cart summary for this visitor.
///
/// Waits up to `wait` for a pending fetch. With `consume_failures`, inline
/// mutation errors are taken so they show exactly once. A session cart the
/// platform no longer has (an order was placed, or it expired) is dropped
/// from the session and renders as an empty cart.
pub async fn load_summary(
    state: &AppState,
    cart_session: &CartSession,
    wait: Duration,
    consume_failures: bool,
) -> Result<CartSummaryView> {
    let open = cart_session.is_open().await?;
    let cart_id = cart_session.cart_id().await?;
    let snapshot = match cart_id.as_ref() {
        Some(cart_id) => {
            let mut query = state.queries().query(cart_id, None).await;
            let snapshot = if wait.is_zero() {
                query.snapshot()
            } else {
                query.settled(wait).await
            };
            if !snapshot.is_pending && snapshot.data.is_none() && snapshot.error.is_none() {
                info!(cart_id = %cart_id, "Session cart no longer exists");
                cart_session.clear_cart_id().await?;
                state.queries().forget(cart_id).await;
            }
            snapshot
        }
        None => QuerySnapshot::empty(),
    };

    let mutations = state.mutations();
    Ok(CartSummaryView::build(&snapshot, open, state.media(), |line_id| {
        let Some(cart_id) = cart_id.as_ref() else {
            return LineMutationState::default();
        };
        LineMutationState {
            pending: mutations.pending(cart_id, line_id),
            failure: if consume_failures {
                mutations.take_failure(cart_id, line_id)
            } else {
                None
            },
        }
    }))
}

async fn panel_response(state: &AppState, cart_session: &CartSession) -> Result<Response> {
    let cart = load_summary(state, cart_session, SETTLE_WAIT, true).await?;
    Ok(CartPanelTemplate { cart }.into_response())
}

/// Cart trigger button with the quantity badge (HTMX).
#[instrument(skip(state, session))]
pub async fn button(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let cart_session = CartSession::new(session);
    let cart = load_summary(&state, &cart_session, SETTLE_WAIT, false).await?;
    Ok(CartButtonTemplate { cart })
}

/// Flyout panel (HTMX). Re-requested by the client while pending.
#[instrument(skip(state, session))]
pub async fn panel(State(state): State<AppState>, session: Session) -> Result<Response> {
    panel_response(&state, &CartSession::new(session)).await
}

/// Open the flyout.
#[instrument(skip(state, session))]
pub async fn open(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart_session = CartSession::new(session);
    cart_session.set_open(true).await?;
    panel_response(&state, &cart_session).await
}

/// Close the flyout.
#[instrument(skip(state, session))]
pub async fn close(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart_session = CartSession::new(session);
    cart_session.set_open(false).await?;
    panel_response(&state, &cart_session).await
}

/// Empty-state link: close the flyout and go to the catalog.
#[instrument(skip(session))]
pub async fn start_shopping(session: Session) -> Result<Redirect> {
    CartSession::new(session).set_open(false).await?;
    Ok(Redirect::to("/shop"))
}

/// Add a product to the cart, creating the cart on first add (HTMX).
///
/// A session cart the platform no longer knows is replaced by a new one.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let quantity = form.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::BadRequest("Quantity must be at least 1".to_string()));
    }
    let input = LineItemInput::product(
        &ProductId::new(form.product_id),
        form.variant_id.as_deref().filter(|v| !v.is_empty()),
        quantity,
    );

    let cart_session = CartSession::new(session);
    let existing = cart_session.cart_id().await?;

    let cart = match state.mutations().add(existing.as_ref(), input.clone()).await {
        Err(MutationError::Failed(CommerceError::NotFound(_))) if existing.is_some() => {
            warn!("Session cart no longer exists, creating a new one");
            if let Some(stale) = existing.as_ref() {
                state.queries().forget(stale).await;
            }
            cart_session.clear_cart_id().await?;
            state.mutations().add(None, input).await?
        }
        other => other?,
    };

    let cart_id = cart
        .id
        .ok_or_else(|| AppError::Internal("Cart response without an ID".to_string()))?;
    cart_session.set_cart_id(&cart_id).await?;
    cart_session.set_open(true).await?;
    add_breadcrumb("cart", "Added item", Some(&[("cart_id", cart_id.as_str())]));

    let panel = panel_response(&state, &cart_session).await?;
    Ok((AppendHeaders([CART_UPDATED]), panel).into_response())
}

/// Set a line's quantity (HTMX).
///
/// Busy and failed mutations still answer with the panel: the line shows
/// its in-flight state or its inline error.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateQuantityForm>,
) -> Result<Response> {
    let cart_session = CartSession::new(session);
    let cart_id = require_cart(&cart_session).await?;
    let line_id = LineItemId::new(form.line_id);

    let outcome = state
        .mutations()
        .set_quantity(&cart_id, &line_id, form.quantity)
        .await;
    mutation_response(&state, &cart_session, outcome.map(|_| ())).await
}

/// Remove a line (HTMX).
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveLineForm>,
) -> Result<Response> {
    let cart_session = CartSession::new(session);
    let cart_id = require_cart(&cart_session).await?;
    let line_id = LineItemId::new(form.line_id);

    let outcome = state.mutations().remove(&cart_id, &line_id).await;
    mutation_response(&state, &cart_session, outcome.map(|_| ())).await
}

async fn require_cart(cart_session: &CartSession) -> Result<CartId> {
    cart_session
        .cart_id()
        .await?
        .ok_or_else(|| AppError::BadRequest("No cart in session".to_string()))
}

async fn mutation_response(
    state: &AppState,
    cart_session: &CartSession,
    outcome: std::result::Result<(), MutationError>,
) -> Result<Response> {
    let changed = match outcome {
        Ok(()) => true,
        Err(MutationError::InvalidQuantity) => {
            return Err(AppError::from(MutationError::InvalidQuantity));
        }
        Err(MutationError::Busy) => false,
        Err(MutationError::Failed(err)) => {
            warn!(error = %err, "Showing inline cart error");
            false
        }
    };

    let panel = panel_response(state, cart_session).await?;
    if changed {
        Ok((AppendHeaders([CART_UPDATED]), panel).into_response())
    } else {
        Ok(panel)
    }
}

/// Create a checkout for the cart and redirect to the hosted checkout page.
#[instrument(skip(state, session))]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart_session = CartSession::new(session);
    let Some(cart_id) = cart_session.cart_id().await? else {
        return Ok(Redirect::to("/shop").into_response());
    };

    let checkout_id = state.commerce().create_checkout(&cart_id).await?;
    add_breadcrumb(
        "cart",
        "Created checkout",
        Some(&[("checkout_id", checkout_id.as_str())]),
    );

    let separator = if state.config().commerce.checkout_url.contains('?') {
        '&'
    } else {
        '?'
    };
    let target = format!(
        "{}{separator}checkoutId={}",
        state.config().commerce.checkout_url,
        urlencoding::encode(checkout_id.as_str())
    );
    Ok(Redirect::to(&target).into_response())
}

/// Landing page for checkouts created against the demo backend.
#[instrument(skip(state, session, nonce))]
pub async fn checkout_ready(
    State(state): State<AppState>,
    session: Session,
    crate::middleware::CspNonce(nonce): crate::middleware::CspNonce,
    Query(query): Query<CheckoutReadyQuery>,
) -> Result<impl IntoResponse> {
    let checkout_id = query
        .checkout_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing checkout ID".to_string()))?;
    let cart_session = CartSession::new(session);
    let cart = load_summary(&state, &cart_session, Duration::ZERO, false).await?;

    Ok(CheckoutReadyTemplate {
        cart,
        checkout_id,
        nonce,
    })
}
