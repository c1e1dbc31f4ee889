//! Integration test harness for Cartwheel.
//!
//! Builds the full storefront router (middleware, sessions, templates) over
//! the in-memory commerce backend and drives it with
//! `tower::ServiceExt::oneshot`, carrying the session cookie between
//! requests like a browser would.
//!
//! ```rust,ignore
//! let mut app = TestApp::new();
//! let res = app.post_form("/cart/add", "product_id=linen-shirt-id").await;
//! assert!(res.body.contains("Linen Shirt"));
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::Router;
use cartwheel_storefront::commerce::memory::MemoryCommerce;
use cartwheel_storefront::config::{CommerceBackend, CommerceConfig, LogFormat, StorefrontConfig};
use cartwheel_storefront::state::AppState;
use secrecy::SecretString;
use tower::ServiceExt;

/// Base URL the test configuration serves from.
pub const BASE_URL: &str = "http://localhost:3000";

/// Configuration for the memory backend.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: BASE_URL.to_string(),
        commerce: CommerceConfig {
            backend: CommerceBackend::Memory,
            api_url: "http://commerce.invalid".to_string(),
            site_id: "demo".to_string(),
            api_key: SecretString::from(String::new()),
            media_url: "https://media.test/media".to_string(),
            checkout_url: format!("{BASE_URL}/checkout/ready"),
            catalog_cache_ttl: Duration::from_secs(300),
        },
        cart_query_ttl: Duration::from_secs(60),
        log_format: LogFormat::Pretty,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// Value of a response header, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One visitor talking to a storefront.
#[derive(Clone)]
pub struct TestApp {
    pub commerce: Arc<MemoryCommerce>,
    pub state: AppState,
    router: Router,
    cookie: Option<String>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// A storefront over a fresh demo catalog.
    #[must_use]
    pub fn new() -> Self {
        let commerce = Arc::new(MemoryCommerce::with_demo_catalog());
        let state = AppState::with_commerce(test_config(), commerce.clone());
        let router = cartwheel_storefront::app(state.clone());
        Self {
            commerce,
            state,
            router,
            cookie: None,
        }
    }

    /// Send a GET request.
    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    /// Send a POST request with a URL-encoded form body.
    pub async fn post_form(&mut self, path: &str, form: &str) -> TestResponse {
        self.send(Method::POST, path, Some(form.to_string())).await
    }

    /// Send a request, storing any session cookie the response sets.
    pub async fn send(&mut self, method: Method, path: &str, form: Option<String>) -> TestResponse {
        let request = self.request(method, path, form);
        let response = self.router.clone().oneshot(request).await.unwrap();
        let response = buffer(response).await;

        if let Some(set_cookie) = response.header(header::SET_COOKIE.as_str())
            && let Some(pair) = set_cookie.split(';').next()
        {
            self.cookie = Some(pair.to_string());
        }
        response
    }

    /// Build a request carrying this visitor's cookie, for sending elsewhere.
    #[must_use]
    pub fn request(&self, method: Method, path: &str, form: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("HX-Request", "true");
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match form {
            Some(form) => builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    /// The router, for driving requests concurrently.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Read a response body into a string.
pub async fn buffer(response: axum::response::Response) -> TestResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

/// Line item IDs in a rendered cart panel, in display order.
#[must_use]
pub fn line_ids(html: &str) -> Vec<String> {
    const MARKER: &str = "name=\"line_id\" value=\"";
    html.match_indices(MARKER)
        .filter_map(|(at, _)| {
            let rest = html.get(at + MARKER.len()..)?;
            rest.split('"').next().map(str::to_string)
        })
        .collect()
}
