//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `COMMERCE_SITE_ID` - Site ID on the commerce platform (remote backend only)
//! - `COMMERCE_API_KEY` - Server-side API key, high entropy and never a
//!   placeholder (remote backend only)
//!
//! ## Optional
//! - `COMMERCE_BACKEND` - `remote` (default) or `memory` for the built-in demo catalog
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `COMMERCE_API_URL` - API base URL (default: <https://www.wixapis.com>)
//! - `COMMERCE_MEDIA_URL` - Media CDN base (default: <https://static.wixstatic.com/media>)
//! - `COMMERCE_CHECKOUT_URL` - Hosted checkout page (default: `{STOREFRONT_BASE_URL}/checkout/ready`)
//! - `CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `CART_QUERY_TTL_SECS` - Idle lifetime of a cart query entry (default: 1800)
//! - `LOG_FORMAT` - `json` for JSON logs, anything else for human-readable
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Commerce platform API configuration
    pub commerce: CommerceConfig,
    /// How long an idle cart query entry is kept
    pub cart_query_ttl: Duration,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions sent to Sentry
    pub sentry_traces_sample_rate: f32,
}

/// Where cart and catalog data come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommerceBackend {
    /// The platform's HTTP API.
    #[default]
    Remote,
    /// The in-process demo catalog; nothing leaves the machine.
    Memory,
}

/// Commerce platform API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct CommerceConfig {
    /// Which backend serves carts and products
    pub backend: CommerceBackend,
    /// REST API base URL
    pub api_url: String,
    /// Site the storefront sells from
    pub site_id: String,
    /// Server-side API key
    pub api_key: SecretString,
    /// Media CDN base URL used to resolve image identifiers
    pub media_url: String,
    /// Hosted checkout page; the checkout ID is appended as a query parameter
    pub checkout_url: String,
    /// Catalog cache lifetime
    pub catalog_cache_ttl: Duration,
}

impl std::fmt::Debug for CommerceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommerceConfig")
            .field("backend", &self.backend)
            .field("api_url", &self.api_url)
            .field("site_id", &self.site_id)
            .field("api_key", &"[REDACTED]")
            .field("media_url", &self.media_url)
            .field("checkout_url", &self.checkout_url)
            .field("catalog_cache_ttl", &self.catalog_cache_ttl)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;

        let commerce = CommerceConfig::from_env(&base_url)?;
        let cart_query_ttl = Duration::from_secs(parse_env("CART_QUERY_TTL_SECS", "1800")?);

        let log_format = match get_optional_env("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host,
            port,
            base_url,
            commerce,
            cart_query_ttl,
            log_format,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the storefront is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CommerceConfig {
    fn from_env(base_url: &str) -> Result<Self, ConfigError> {
        let default_checkout = format!("{}/checkout/ready", base_url.trim_end_matches('/'));
        let backend = match get_optional_env("COMMERCE_BACKEND").as_deref() {
            None | Some("remote") => CommerceBackend::Remote,
            Some("memory") => CommerceBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar(
                    "COMMERCE_BACKEND".to_string(),
                    format!("expected 'remote' or 'memory', got '{other}'"),
                ));
            }
        };

        let (site_id, api_key) = match backend {
            CommerceBackend::Remote => (
                get_required_env("COMMERCE_SITE_ID")?,
                get_validated_secret("COMMERCE_API_KEY")?,
            ),
            CommerceBackend::Memory => (
                get_env_or_default("COMMERCE_SITE_ID", "demo"),
                SecretString::from(String::new()),
            ),
        };

        Ok(Self {
            backend,
            api_url: get_env_or_default("COMMERCE_API_URL", "https://www.wixapis.com"),
            site_id,
            api_key,
            media_url: get_env_or_default(
                "COMMERCE_MEDIA_URL",
                "https://static.wixstatic.com/media",
            ),
            checkout_url: get_env_or_default("COMMERCE_CHECKOUT_URL", &default_checkout),
            catalog_cache_ttl: Duration::from_secs(parse_env("CATALOG_CACHE_TTL_SECS", "300")?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a default literal.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn commerce_config() -> CommerceConfig {
        CommerceConfig {
            backend: CommerceBackend::Remote,
            api_url: "https://api.test".to_string(),
            site_id: "site-123".to_string(),
            api_key: SecretString::from("super_secret_api_key_value"),
            media_url: "https://media.test".to_string(),
            checkout_url: "https://shop.test/checkout".to_string(),
            catalog_cache_ttl: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "COMMERCE_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "COMMERCE_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "COMMERCE_API_KEY");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr_and_secure() {
        let config = StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "https://shop.test".to_string(),
            commerce: commerce_config(),
            cart_query_ttl: Duration::from_secs(60),
            log_format: LogFormat::Pretty,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
        assert!(config.is_secure());
    }

    #[test]
    fn test_commerce_config_debug_redacts_key() {
        let debug_output = format!("{:?}", commerce_config());

        assert!(debug_output.contains("site-123"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_api_key_value"));
    }
}
