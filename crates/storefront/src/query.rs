//! Cart query cache.
//!
//! Each cart has at most one live query entry, keyed by cart ID. An entry
//! owns a `watch` channel of immutable [`QuerySnapshot`]s: readers take the
//! latest snapshot (the panel renders whatever is cached, pending or not)
//! or wait for the next settled one.
//!
//! A cart the platform no longer has (`NotFound`) settles with no data and no
//! error, so the visitor sees an empty cart. Querying an entry whose last
//! fetch failed starts a new fetch.
//!
//! Fetches run on spawned tasks and apply their result only if:
//! - the entry still exists (a result for an evicted or forgotten entry is
//!   dropped, so nothing updates a query nobody can observe), and
//! - no newer fetch or direct write has been issued for the entry since.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use cartwheel_core::{CartId, LineItemId};
use moka::future::Cache;
use tokio::sync::watch;
use tracing::{Instrument, debug, info_span, warn};

use crate::commerce::{Cart, CommerceApi, CommerceError};

/// Human-readable failure attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub message: String,
}

impl From<&CommerceError> for QueryError {
    fn from(err: &CommerceError) -> Self {
        Self {
            message: err.public_message(),
        }
    }
}

/// Point-in-time state of a query.
#[derive(Debug)]
pub struct QuerySnapshot<T> {
    /// Last successfully fetched (or seeded) data, kept across refetches.
    pub data: Option<Arc<T>>,
    /// A fetch is in progress.
    pub is_pending: bool,
    /// The most recent fetch failed.
    pub error: Option<QueryError>,
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_pending: self.is_pending,
            error: self.error.clone(),
        }
    }
}

impl<T> Default for QuerySnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_pending: false,
            error: None,
        }
    }
}

impl<T> QuerySnapshot<T> {
    /// A settled snapshot holding `data`.
    #[must_use]
    pub fn ready(data: T) -> Self {
        Self {
            data: Some(Arc::new(data)),
            is_pending: false,
            error: None,
        }
    }

    /// A settled snapshot with no data, used when there is nothing to fetch.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Handle to one cart's query.
#[derive(Debug, Clone)]
pub struct CartQuery {
    rx: watch::Receiver<QuerySnapshot<Cart>>,
}

impl CartQuery {
    /// The latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> QuerySnapshot<Cart> {
        self.rx.borrow().clone()
    }

    /// Wait until the query is no longer pending, up to `timeout`.
    ///
    /// Returns the latest snapshot either way; a pending snapshot means the
    /// timeout elapsed or the entry was evicted mid-fetch.
    pub async fn settled(&mut self, timeout: Duration) -> QuerySnapshot<Cart> {
        let wait = self.rx.wait_for(|s| !s.is_pending);
        if let Ok(Ok(snapshot)) = tokio::time::timeout(timeout, wait).await {
            return snapshot.clone();
        }
        self.snapshot()
    }
}

struct QueryEntry {
    tx: watch::Sender<QuerySnapshot<Cart>>,
    /// Bumped on every fetch or direct write; held while publishing.
    generation: Mutex<u64>,
}

impl QueryEntry {
    fn new(initial: Option<Cart>) -> Self {
        let (tx, _rx) = watch::channel(QuerySnapshot {
            data: initial.map(Arc::new),
            is_pending: false,
            error: None,
        });
        Self {
            tx,
            generation: Mutex::new(0),
        }
    }

    /// Mark pending and return the generation the new fetch owns.
    fn begin_fetch(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.tx.send_modify(|s| s.is_pending = true);
        *generation
    }

    /// Publish a fetch result unless a newer generation superseded it.
    fn resolve(&self, fetch_generation: u64, result: Result<Cart, CommerceError>) -> bool {
        let generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *generation != fetch_generation {
            return false;
        }
        self.tx.send_modify(|s| {
            s.is_pending = false;
            match result {
                Ok(cart) => {
                    s.data = Some(Arc::new(cart));
                    s.error = None;
                }
                Err(CommerceError::NotFound(_)) => {
                    s.data = None;
                    s.error = None;
                }
                Err(ref err) => {
                    s.error = Some(QueryError::from(err));
                }
            }
        });
        true
    }

    /// Replace the data directly, superseding any fetch in flight.
    fn write(&self, cart: Cart) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.tx.send_replace(QuerySnapshot::ready(cart));
    }
}

/// Process-wide cache of cart queries.
///
/// Cheap to clone; clones share entries.
#[derive(Clone)]
pub struct CartQueryCache {
    api: Arc<dyn CommerceApi>,
    entries: Cache<CartId, Arc<QueryEntry>>,
}

impl CartQueryCache {
    /// Create a cache whose entries expire after `idle_ttl` without access.
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, idle_ttl: Duration) -> Self {
        Self {
            api,
            entries: Cache::builder()
                .max_capacity(10_000)
                .time_to_idle(idle_ttl)
                .build(),
        }
    }

    /// Get the query for `cart_id`, creating and fetching it if needed.
    ///
    /// `initial` seeds a newly created entry so the first render has data
    /// while the fetch runs. It is ignored for existing entries. An existing
    /// entry is refetched only when its last fetch failed.
    pub async fn query(&self, cart_id: &CartId, initial: Option<Cart>) -> CartQuery {
        let entry = self
            .entries
            .entry_by_ref(cart_id)
            .or_insert_with(async { Arc::new(QueryEntry::new(initial)) })
            .await;

        let fresh = entry.is_fresh();
        let entry = entry.into_value();
        let failed = {
            let snapshot = entry.tx.borrow();
            !snapshot.is_pending && snapshot.error.is_some()
        };
        if fresh || failed {
            self.spawn_fetch(cart_id.clone(), &entry);
        }

        CartQuery {
            rx: entry.tx.subscribe(),
        }
    }

    /// Refetch `cart_id` if it has a live entry; stale data stays visible.
    pub async fn invalidate(&self, cart_id: &CartId) {
        if let Some(entry) = self.entries.get(cart_id).await {
            self.spawn_fetch(cart_id.clone(), &entry);
        }
    }

    /// Store a cart returned by a mutation, creating the entry if needed.
    pub async fn write(&self, cart_id: &CartId, cart: Cart) {
        let entry = self
            .entries
            .get_with_by_ref(cart_id, async { Arc::new(QueryEntry::new(None)) })
            .await;
        entry.write(cart);
    }

    /// Whether the cached cart for `cart_id` has the line `line_id`.
    ///
    /// Never fetches; an unknown cart has no lines.
    pub async fn contains_line(&self, cart_id: &CartId, line_id: &LineItemId) -> bool {
        let Some(entry) = self.entries.get(cart_id).await else {
            return false;
        };
        let snapshot = entry.tx.borrow();
        snapshot.data.as_ref().is_some_and(|cart| {
            cart.line_items
                .iter()
                .any(|line| line.id.as_ref() == Some(line_id))
        })
    }

    /// Drop the entry; fetches still in flight for it are discarded.
    pub async fn forget(&self, cart_id: &CartId) {
        self.entries.invalidate(cart_id).await;
    }

    fn spawn_fetch(&self, cart_id: CartId, entry: &Arc<QueryEntry>) {
        let generation = entry.begin_fetch();
        let weak: Weak<QueryEntry> = Arc::downgrade(entry);
        let api = Arc::clone(&self.api);
        let span = info_span!("cart_query_fetch", cart_id = %cart_id, generation);

        tokio::spawn(
            async move {
                let result = api.get_cart(&cart_id).await;
                if let Err(ref err) = result {
                    warn!(error = %err, "Cart fetch failed");
                }

                let Some(entry) = weak.upgrade() else {
                    debug!("Discarding cart fetch for evicted query");
                    return;
                };
                if !entry.resolve(generation, result) {
                    debug!("Discarding superseded cart fetch");
                }
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use cartwheel_core::CheckoutId;
    use tokio::sync::oneshot;

    use super::*;
    use crate::commerce::{LineItem, LineItemInput, LineItemQuantityUpdate, Product};

    type Reply = oneshot::Receiver<Result<Cart, CommerceError>>;

    /// `get_cart` answers come from test-controlled oneshot channels, in call order.
    #[derive(Default)]
    struct ScriptedApi {
        replies: Mutex<VecDeque<Reply>>,
    }

    impl ScriptedApi {
        fn expect_call(&self) -> oneshot::Sender<Result<Cart, CommerceError>> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().unwrap().push_back(rx);
            tx
        }
    }

    fn unsupported<T>() -> Result<T, CommerceError> {
        Err(CommerceError::UserError("unsupported in test".to_string()))
    }

    #[async_trait]
    impl CommerceApi for ScriptedApi {
        async fn get_cart(&self, _cart_id: &CartId) -> Result<Cart, CommerceError> {
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(CommerceError::NotFound("dropped".to_string()))),
                None => Err(CommerceError::NotFound("no scripted reply".to_string())),
            }
        }
        async fn create_cart(&self, _: Vec<LineItemInput>) -> Result<Cart, CommerceError> {
            unsupported()
        }
        async fn add_to_cart(&self, _: &CartId, _: Vec<LineItemInput>) -> Result<Cart, CommerceError> {
            unsupported()
        }
        async fn update_line_item_quantity(
            &self,
            _: &CartId,
            _: Vec<LineItemQuantityUpdate>,
        ) -> Result<Cart, CommerceError> {
            unsupported()
        }
        async fn remove_line_items(&self, _: &CartId, _: Vec<LineItemId>) -> Result<Cart, CommerceError> {
            unsupported()
        }
        async fn create_checkout(&self, _: &CartId) -> Result<CheckoutId, CommerceError> {
            unsupported()
        }
        async fn query_products(&self, _: u32) -> Result<Vec<Product>, CommerceError> {
            unsupported()
        }
        async fn get_product_by_slug(&self, _: &str) -> Result<Product, CommerceError> {
            unsupported()
        }
    }

    fn cart_with_quantity(quantity: u32) -> Cart {
        Cart {
            line_items: vec![LineItem {
                id: Some(LineItemId::new("l1")),
                quantity: Some(quantity),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn quantity_of(snapshot: &QuerySnapshot<Cart>) -> Option<u32> {
        snapshot.data.as_ref()?.line_items.first()?.quantity
    }

    fn setup() -> (Arc<ScriptedApi>, CartQueryCache, CartId) {
        let api = Arc::new(ScriptedApi::default());
        let cache = CartQueryCache::new(api.clone(), Duration::from_secs(60));
        (api, cache, CartId::new("cart-1"))
    }

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_query_starts_pending_with_initial_data() {
        let (api, cache, id) = setup();
        let reply = api.expect_call();

        let mut query = cache.query(&id, Some(cart_with_quantity(1))).await;
        let first = query.snapshot();
        assert!(first.is_pending);
        assert_eq!(quantity_of(&first), Some(1));

        reply.send(Ok(cart_with_quantity(3))).unwrap();
        let settled = query.settled(WAIT).await;
        assert!(!settled.is_pending);
        assert!(settled.error.is_none());
        assert_eq!(quantity_of(&settled), Some(3));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_data_and_reports_error() {
        let (api, cache, id) = setup();
        let first = api.expect_call();
        let mut query = cache.query(&id, None).await;
        first.send(Ok(cart_with_quantity(2))).unwrap();
        query.settled(WAIT).await;

        let second = api.expect_call();
        cache.invalidate(&id).await;
        assert!(query.snapshot().is_pending);
        second
            .send(Err(CommerceError::UserError("Cart is locked".to_string())))
            .unwrap();

        let settled = query.settled(WAIT).await;
        assert_eq!(quantity_of(&settled), Some(2));
        assert_eq!(settled.error.unwrap().message, "Cart is locked");
    }

    #[tokio::test]
    async fn test_superseded_fetch_does_not_overwrite_newer_data() {
        let (api, cache, id) = setup();
        let slow = api.expect_call();
        let mut query = cache.query(&id, None).await;

        let fast = api.expect_call();
        cache.invalidate(&id).await;

        fast.send(Ok(cart_with_quantity(5))).unwrap();
        let settled = query.settled(WAIT).await;
        assert_eq!(quantity_of(&settled), Some(5));

        // The first fetch finishes last; its result must be ignored.
        slow.send(Ok(cart_with_quantity(1))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(quantity_of(&query.snapshot()), Some(5));
    }

    #[tokio::test]
    async fn test_write_supersedes_inflight_fetch() {
        let (api, cache, id) = setup();
        let reply = api.expect_call();
        let query = cache.query(&id, None).await;

        cache.write(&id, cart_with_quantity(4)).await;
        let snapshot = query.snapshot();
        assert!(!snapshot.is_pending);
        assert_eq!(quantity_of(&snapshot), Some(4));

        reply.send(Ok(cart_with_quantity(9))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(quantity_of(&query.snapshot()), Some(4));
    }

    #[tokio::test]
    async fn test_result_for_forgotten_entry_is_dropped() {
        let (api, cache, id) = setup();
        let reply = api.expect_call();
        let old = cache.query(&id, None).await;

        cache.forget(&id).await;
        cache.entries.run_pending_tasks().await;
        reply.send(Ok(cart_with_quantity(7))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = old.snapshot();
        assert!(snapshot.is_pending);
        assert!(snapshot.data.is_none());
    }

    #[tokio::test]
    async fn test_existing_entry_is_not_refetched() {
        let (api, cache, id) = setup();
        let reply = api.expect_call();
        let mut query = cache.query(&id, None).await;
        reply.send(Ok(cart_with_quantity(2))).unwrap();
        query.settled(WAIT).await;

        // No scripted reply queued: a second fetch would surface an error.
        let again = cache.query(&id, Some(cart_with_quantity(8))).await;
        let snapshot = again.snapshot();
        assert!(!snapshot.is_pending);
        assert!(snapshot.error.is_none());
        assert_eq!(quantity_of(&snapshot), Some(2));
    }

    #[tokio::test]
    async fn test_missing_cart_settles_empty() {
        let (api, cache, id) = setup();
        let reply = api.expect_call();
        let mut query = cache.query(&id, Some(cart_with_quantity(2))).await;

        reply
            .send(Err(CommerceError::NotFound("Cart not found".to_string())))
            .unwrap();
        let settled = query.settled(WAIT).await;
        assert!(!settled.is_pending);
        assert!(settled.data.is_none());
        assert!(settled.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_entry_is_refetched_on_next_query() {
        let (api, cache, id) = setup();
        let first = api.expect_call();
        let mut query = cache.query(&id, None).await;
        first.send(Err(CommerceError::RateLimited(1))).unwrap();
        assert!(query.settled(WAIT).await.error.is_some());

        let second = api.expect_call();
        let mut again = cache.query(&id, None).await;
        assert!(again.snapshot().is_pending);
        second.send(Ok(cart_with_quantity(4))).unwrap();

        let settled = again.settled(WAIT).await;
        assert!(settled.error.is_none());
        assert_eq!(quantity_of(&settled), Some(4));
    }

    #[tokio::test]
    async fn test_contains_line_reads_cached_cart_only() {
        let (_api, cache, id) = setup();
        let line = LineItemId::new("l1");
        assert!(!cache.contains_line(&id, &line).await);

        cache.write(&id, cart_with_quantity(1)).await;
        assert!(cache.contains_line(&id, &line).await);
        assert!(!cache.contains_line(&id, &LineItemId::new("other")).await);
    }
}
