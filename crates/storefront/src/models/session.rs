//! Session-stored cart state.
//!
//! The visitor's cart ID and whether the cart flyout is open live in the
//! session. Everything else about the cart comes from the query cache.

use cartwheel_core::CartId;
use tower_sessions::Session;
use tower_sessions::session::Error;

/// Session keys for cart data.
pub mod keys {
    /// Key for the platform cart ID.
    pub const CART_ID: &str = "cart_id";

    /// Key for the flyout open flag.
    pub const CART_OPEN: &str = "cart_open";
}

/// Typed access to the cart keys of a session.
#[derive(Clone)]
pub struct CartSession {
    session: Session,
}

impl CartSession {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    /// The visitor's cart, if one has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn cart_id(&self) -> Result<Option<CartId>, Error> {
        self.session.get::<CartId>(keys::CART_ID).await
    }

    /// Remember the visitor's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn set_cart_id(&self, cart_id: &CartId) -> Result<(), Error> {
        self.session.insert(keys::CART_ID, cart_id).await
    }

    /// Drop a cart the platform no longer knows.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn clear_cart_id(&self) -> Result<(), Error> {
        self.session.remove::<CartId>(keys::CART_ID).await.map(|_| ())
    }

    /// Whether the flyout is open. Defaults to closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn is_open(&self) -> Result<bool, Error> {
        Ok(self
            .session
            .get::<bool>(keys::CART_OPEN)
            .await?
            .unwrap_or(false))
    }

    /// Open or close the flyout.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn set_open(&self, open: bool) -> Result<(), Error> {
        self.session.insert(keys::CART_OPEN, open).await
    }
}
