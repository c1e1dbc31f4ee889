//! Cart mutations serialized per line item.
//!
//! At most one quantity change or removal may be in flight for a given
//! line item. A second request for the same line is rejected with
//! [`MutationError::Busy`] instead of being queued, so double clicks never
//! race each other against the remote cart. Different lines proceed
//! independently.
//!
//! Successful mutations write the returned cart into the [`CartQueryCache`].
//! Failed mutations leave an inline error for the line (consumed by the next
//! render) and refetch the cart so the display reverts to the remote state.
//! Errors are kept only for lines of the cached cart, and unconsumed ones
//! expire after [`FAILURE_TTL`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cartwheel_core::{CartId, LineItemId};
use moka::sync::Cache;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::commerce::{Cart, CommerceApi, CommerceError, LineItemInput, LineItemQuantityUpdate};
use crate::query::CartQueryCache;

/// Errors returned by cart mutations.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Another mutation for the same line item has not finished.
    #[error("A change to this item is already in progress")]
    Busy,

    /// Quantities below one are not sent; removal is a separate operation.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The platform rejected or failed the mutation.
    #[error("Cart update failed: {0}")]
    Failed(#[from] CommerceError),
}

impl MutationError {
    /// Message shown next to the affected line item.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Busy | Self::InvalidQuantity => self.to_string(),
            Self::Failed(err) => err.public_message(),
        }
    }
}

/// A change that has been sent but not yet answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingChange {
    /// Quantity being set.
    Quantity(u32),
    /// Line being removed.
    Removal,
}

/// How long an inline error waits for a render to show it.
pub const FAILURE_TTL: Duration = Duration::from_secs(300);

/// Most inline errors held at once.
const MAX_FAILURES: u64 = 10_000;

/// A line item within a particular cart.
type LineKey = (CartId, LineItemId);

fn line_key(cart_id: &CartId, line_id: &LineItemId) -> LineKey {
    (cart_id.clone(), line_id.clone())
}

/// Cart mutation service.
///
/// Cheap to clone; clones share in-flight tracking.
#[derive(Clone)]
pub struct CartMutations {
    api: Arc<dyn CommerceApi>,
    queries: CartQueryCache,
    in_flight: Arc<Mutex<HashMap<LineKey, PendingChange>>>,
    failures: Cache<LineKey, String>,
}

/// Releases a line's in-flight slot when dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashMap<LineKey, PendingChange>>>,
    key: LineKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl CartMutations {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, queries: CartQueryCache) -> Self {
        Self {
            api,
            queries,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            failures: Cache::builder()
                .max_capacity(MAX_FAILURES)
                .time_to_live(FAILURE_TTL)
                .build(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<LineKey, PendingChange>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the line's in-flight slot, clearing any earlier failure.
    fn begin(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
        change: PendingChange,
    ) -> Result<InFlightGuard, MutationError> {
        let key = line_key(cart_id, line_id);
        let mut in_flight = self.lock();
        if in_flight.contains_key(&key) {
            return Err(MutationError::Busy);
        }
        in_flight.insert(key.clone(), change);
        drop(in_flight);

        self.failures.invalidate(&key);
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key,
        })
    }

    /// The change currently in flight for a line, if any.
    #[must_use]
    pub fn pending(&self, cart_id: &CartId, line_id: &LineItemId) -> Option<PendingChange> {
        self.lock().get(&line_key(cart_id, line_id)).copied()
    }

    /// Take the inline error left by the line's last failed mutation.
    #[must_use]
    pub fn take_failure(&self, cart_id: &CartId, line_id: &LineItemId) -> Option<String> {
        self.failures.remove(&line_key(cart_id, line_id))
    }

    /// Set a line item's quantity.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if the line already has a mutation in flight,
    /// `InvalidQuantity` for zero, and `Failed` if the platform call fails.
    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    pub async fn set_quantity(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
        quantity: u32,
    ) -> Result<Cart, MutationError> {
        if quantity == 0 {
            return Err(MutationError::InvalidQuantity);
        }
        let _guard = self.begin(cart_id, line_id, PendingChange::Quantity(quantity))?;

        let update = LineItemQuantityUpdate {
            id: line_id.clone(),
            quantity,
        };
        let result = self
            .api
            .update_line_item_quantity(cart_id, vec![update])
            .await;
        self.settle(cart_id, line_id, result).await
    }

    /// Remove a line item.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if the line already has a mutation in flight and
    /// `Failed` if the platform call fails.
    #[instrument(skip(self), fields(cart_id = %cart_id, line_id = %line_id))]
    pub async fn remove(&self, cart_id: &CartId, line_id: &LineItemId) -> Result<Cart, MutationError> {
        let _guard = self.begin(cart_id, line_id, PendingChange::Removal)?;
        let result = self
            .api
            .remove_line_items(cart_id, vec![line_id.clone()])
            .await;
        self.settle(cart_id, line_id, result).await
    }

    /// Add catalog items, creating a cart when the visitor has none.
    ///
    /// # Errors
    ///
    /// Returns `Failed` if the platform call fails.
    #[instrument(skip(self, input))]
    pub async fn add(
        &self,
        cart_id: Option<&CartId>,
        input: LineItemInput,
    ) -> Result<Cart, MutationError> {
        let cart = match cart_id {
            Some(id) => self.api.add_to_cart(id, vec![input]).await?,
            None => self.api.create_cart(vec![input]).await?,
        };
        if let Some(id) = cart.id.as_ref() {
            self.queries.write(id, cart.clone()).await;
        }
        info!(cart_id = ?cart.id, "Added item to cart");
        Ok(cart)
    }

    async fn settle(
        &self,
        cart_id: &CartId,
        line_id: &LineItemId,
        result: Result<Cart, CommerceError>,
    ) -> Result<Cart, MutationError> {
        match result {
            Ok(cart) => {
                self.queries.write(cart_id, cart.clone()).await;
                Ok(cart)
            }
            Err(err) => {
                warn!(error = %err, "Cart mutation failed");
                // Only lines the visitor can see get an inline error.
                if self.queries.contains_line(cart_id, line_id).await {
                    self.failures
                        .insert(line_key(cart_id, line_id), err.public_message());
                }
                self.queries.invalidate(cart_id).await;
                Err(MutationError::Failed(err))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::commerce::memory::MemoryCommerce;

    fn setup() -> (Arc<MemoryCommerce>, CartMutations, CartQueryCache, CartId, LineItemId) {
        let api = Arc::new(MemoryCommerce::with_demo_catalog());
        let (cart_id, line_id) = api.seed_cart("cart-1", "linen-shirt", 2);
        let queries = CartQueryCache::new(api.clone(), Duration::from_secs(60));
        let mutations = CartMutations::new(api.clone(), queries.clone());
        (api, mutations, queries, cart_id, line_id)
    }

    #[tokio::test]
    async fn test_set_quantity_writes_query_cache() {
        let (_api, mutations, queries, cart_id, line_id) = setup();

        let cart = mutations.set_quantity(&cart_id, &line_id, 3).await.unwrap();
        assert_eq!(cart.line_items[0].quantity, Some(3));

        let snapshot = queries.query(&cart_id, None).await.snapshot();
        assert_eq!(snapshot.data.unwrap().line_items[0].quantity, Some(3));
        assert!(mutations.pending(&cart_id, &line_id).is_none());
    }

    #[tokio::test]
    async fn test_second_mutation_on_same_line_is_busy() {
        let (api, mutations, _queries, cart_id, line_id) = setup();
        let gate = api.hold_mutations();

        let first = {
            let mutations = mutations.clone();
            let cart_id = cart_id.clone();
            let line_id = line_id.clone();
            tokio::spawn(async move { mutations.set_quantity(&cart_id, &line_id, 3).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mutations.pending(&cart_id, &line_id), Some(PendingChange::Quantity(3)));

        let second = mutations.set_quantity(&cart_id, &line_id, 4).await;
        assert!(matches!(second, Err(MutationError::Busy)));

        gate.release();
        let cart = first.await.unwrap().unwrap();
        assert_eq!(cart.line_items[0].quantity, Some(3));
        assert!(mutations.pending(&cart_id, &line_id).is_none());
    }

    #[tokio::test]
    async fn test_other_lines_are_not_blocked() {
        let (api, mutations, _queries, cart_id, line_id) = setup();
        let (_, other_line) = api.seed_cart("cart-1", "ceramic-mug", 1);
        let gate = api.hold_mutations();

        let first = {
            let mutations = mutations.clone();
            let cart_id = cart_id.clone();
            let line_id = line_id.clone();
            tokio::spawn(async move { mutations.set_quantity(&cart_id, &line_id, 3).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let other = {
            let mutations = mutations.clone();
            let cart_id = cart_id.clone();
            let other_line = other_line.clone();
            tokio::spawn(async move { mutations.set_quantity(&cart_id, &other_line, 2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mutations.pending(&cart_id, &other_line), Some(PendingChange::Quantity(2)));

        gate.release();
        first.await.unwrap().unwrap();
        other.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failure_leaves_inline_error_once() {
        let (api, mutations, queries, cart_id, line_id) = setup();
        queries.query(&cart_id, None).await.settled(Duration::from_secs(2)).await;
        api.fail_next_mutation(CommerceError::UserError("Only 5 left in stock".to_string()));

        let err = mutations.set_quantity(&cart_id, &line_id, 6).await.unwrap_err();
        assert!(matches!(err, MutationError::Failed(_)));
        assert!(mutations.pending(&cart_id, &line_id).is_none());

        assert_eq!(
            mutations.take_failure(&cart_id, &line_id).as_deref(),
            Some("Only 5 left in stock")
        );
        assert!(mutations.take_failure(&cart_id, &line_id).is_none());
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected_without_call() {
        let (_api, mutations, _queries, cart_id, line_id) = setup();
        let err = mutations.set_quantity(&cart_id, &line_id, 0).await.unwrap_err();
        assert!(matches!(err, MutationError::InvalidQuantity));
    }

    #[tokio::test]
    async fn test_remove_and_add() {
        let (_api, mutations, _queries, cart_id, line_id) = setup();
        let cart = mutations.remove(&cart_id, &line_id).await.unwrap();
        assert!(cart.line_items.is_empty());

        let input = LineItemInput::product(&"ceramic-mug-id".into(), None, 1);
        let fresh = mutations.add(None, input).await.unwrap();
        assert_eq!(fresh.line_items.len(), 1);
        assert_ne!(fresh.id.as_ref(), Some(&cart_id));
    }

    #[tokio::test]
    async fn test_failures_for_unknown_lines_are_not_kept() {
        let (_api, mutations, queries, cart_id, _line_id) = setup();
        queries.query(&cart_id, None).await.settled(Duration::from_secs(2)).await;

        for n in 0..100 {
            let bogus = LineItemId::new(format!("bogus-{n}"));
            let err = mutations.set_quantity(&cart_id, &bogus, 2).await.unwrap_err();
            assert!(matches!(err, MutationError::Failed(CommerceError::NotFound(_))));
        }

        mutations.failures.run_pending_tasks();
        assert_eq!(mutations.failures.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_same_line_id_in_other_cart_is_not_busy() {
        let (_api, mutations, _queries, cart_id, line_id) = setup();
        let other_cart = CartId::new("cart-2");

        let _held = mutations
            .begin(&cart_id, &line_id, PendingChange::Quantity(3))
            .unwrap();
        assert!(
            mutations
                .begin(&other_cart, &line_id, PendingChange::Removal)
                .is_ok()
        );
        assert!(matches!(
            mutations.begin(&cart_id, &line_id, PendingChange::Removal),
            Err(MutationError::Busy)
        ));
        assert_eq!(mutations.pending(&other_cart, &line_id), None);
    }
}
