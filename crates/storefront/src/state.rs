//! Application state shared across handlers.

use std::sync::Arc;

use url::Url;

use crate::commerce::memory::MemoryCommerce;
use crate::commerce::{CommerceApi, CommerceClient};
use crate::config::{CommerceBackend, StorefrontConfig};
use crate::media::MediaResolver;
use crate::mutation::CartMutations;
use crate::query::CartQueryCache;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    commerce: Arc<dyn CommerceApi>,
    queries: CartQueryCache,
    mutations: CartMutations,
    media: MediaResolver,
    media_origin: String,
}

impl AppState {
    /// Create the state with the backend named in the configuration.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let commerce: Arc<dyn CommerceApi> = match config.commerce.backend {
            CommerceBackend::Remote => Arc::new(CommerceClient::new(&config.commerce)),
            CommerceBackend::Memory => Arc::new(MemoryCommerce::with_demo_catalog()),
        };
        Self::with_commerce(config, commerce)
    }

    /// Create the state around an existing commerce backend.
    #[must_use]
    pub fn with_commerce(config: StorefrontConfig, commerce: Arc<dyn CommerceApi>) -> Self {
        let queries = CartQueryCache::new(Arc::clone(&commerce), config.cart_query_ttl);
        let mutations = CartMutations::new(Arc::clone(&commerce), queries.clone());
        let media = MediaResolver::new(&config.commerce.media_url);
        let media_origin = origin_of(&config.commerce.media_url);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                commerce,
                queries,
                mutations,
                media,
                media_origin,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The commerce backend.
    #[must_use]
    pub fn commerce(&self) -> &dyn CommerceApi {
        self.inner.commerce.as_ref()
    }

    /// Cart query cache.
    #[must_use]
    pub fn queries(&self) -> &CartQueryCache {
        &self.inner.queries
    }

    /// Cart mutation service.
    #[must_use]
    pub fn mutations(&self) -> &CartMutations {
        &self.inner.mutations
    }

    #[must_use]
    pub fn media(&self) -> &MediaResolver {
        &self.inner.media
    }

    /// Origin of the media CDN, for the CSP `img-src` directive.
    #[must_use]
    pub fn media_origin(&self) -> &str {
        &self.inner.media_origin
    }
}

/// `scheme://host[:port]` of a URL; unparseable URLs yield an empty string.
fn origin_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .ok()
        .filter(|o| o != "null")
        .unwrap_or_default()
}
