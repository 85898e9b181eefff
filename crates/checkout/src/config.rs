//! Checkout server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CHECKOUT_BASE_URL` - Public URL the checkout pages are served from
//!
//! ## Optional
//! - `CHECKOUT_HOST` - Bind address (default: 127.0.0.1)
//! - `CHECKOUT_PORT` - Listen port (default: 3000)
//! - `BACKEND_URL` - Payment backend base URL (default: <http://localhost:4000>)
//! - `BACKEND_STATUS_PATH` - Status lookup path (default: /payment/hyperpay/status)
//! - `BACKEND_TIMEOUT_SECS` - Backend request timeout (default: 10)
//! - `WIDGET_ORIGIN` - Origin serving the payment widget (default: <https://eu-test.oppwa.com>)
//! - `WIDGET_DEPENDENCY_URL` - Dependency library URL (default: <https://code.jquery.com/jquery.js>)
//! - `WIDGET_PARENT_ORIGIN` - Origin allowed to receive cross-window messages
//!   (default: origin of `CHECKOUT_BASE_URL`)
//! - `POLL_INTERVAL_SECS` - Delay between automatic status checks (default: 30)
//! - `POLL_MAX_ATTEMPTS` - Automatic status checks before giving up (default: 10)
//! - `WELL_KNOWN_DIR` - Directory holding `.well-known` artifacts
//!   (default: crates/checkout/public/.well-known)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.1)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hosted_checkout_core::message::Origin;
use hosted_checkout_core::reconcile::ReconcilePolicy;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Checkout server configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the checkout pages
    pub base_url: Url,
    /// Payment backend connection settings
    pub backend: BackendConfig,
    /// Hosted widget settings
    pub widget: WidgetSettings,
    /// Status polling settings
    pub poll: PollSettings,
    /// Directory served under `/.well-known`
    pub well_known_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of error events sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions sent to Sentry
    pub sentry_traces_sample_rate: f32,
}

/// Payment backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend (scheme, host, port)
    pub base_url: Url,
    /// Path of the status lookup endpoint
    pub status_path: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Hosted widget settings.
#[derive(Debug, Clone)]
pub struct WidgetSettings {
    /// Origin serving the widget script, frames and form posts
    pub origin: Origin,
    /// Full URL of the dependency library
    pub dependency_url: Url,
    /// Origin allowed to receive cross-window messages
    pub parent_origin: Origin,
}

impl WidgetSettings {
    /// Origin of the dependency library.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL has an opaque origin.
    pub fn dependency_origin(&self) -> Result<Origin, ConfigError> {
        Origin::parse(self.dependency_url.as_str()).map_err(|e| {
            ConfigError::InvalidEnvVar("WIDGET_DEPENDENCY_URL".to_string(), e.to_string())
        })
    }
}

/// Status polling settings.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay between automatic checks
    pub interval: Duration,
    /// Automatic checks before the loop stops
    pub max_attempts: u32,
}

impl PollSettings {
    /// The reconciliation policy these settings describe.
    #[must_use]
    pub const fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy::new(self.interval, self.max_attempts)
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.parsed("CHECKOUT_HOST", "127.0.0.1")?;
        let port = env.parsed("CHECKOUT_PORT", "3000")?;
        let base_url = env.url(
            "CHECKOUT_BASE_URL",
            &env.required("CHECKOUT_BASE_URL")?,
        )?;

        let backend = BackendConfig {
            base_url: env.url(
                "BACKEND_URL",
                &env.or_default("BACKEND_URL", "http://localhost:4000"),
            )?,
            status_path: normalize_path(&env.or_default(
                "BACKEND_STATUS_PATH",
                "/payment/hyperpay/status",
            )),
            timeout: Duration::from_secs(env.parsed("BACKEND_TIMEOUT_SECS", "10")?),
        };

        let parent_origin = match env.optional("WIDGET_PARENT_ORIGIN") {
            Some(value) => env.origin("WIDGET_PARENT_ORIGIN", &value)?,
            None => env.origin("CHECKOUT_BASE_URL", base_url.as_str())?,
        };
        let widget = WidgetSettings {
            origin: env.origin(
                "WIDGET_ORIGIN",
                &env.or_default("WIDGET_ORIGIN", "https://eu-test.oppwa.com"),
            )?,
            dependency_url: env.url(
                "WIDGET_DEPENDENCY_URL",
                &env.or_default("WIDGET_DEPENDENCY_URL", "https://code.jquery.com/jquery.js"),
            )?,
            parent_origin,
        };

        let poll = PollSettings {
            interval: Duration::from_secs(env.parsed("POLL_INTERVAL_SECS", "30")?),
            max_attempts: env.parsed("POLL_MAX_ATTEMPTS", "10")?,
        };
        if poll.interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "POLL_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            base_url,
            backend,
            widget,
            poll,
            well_known_dir: PathBuf::from(
                env.or_default("WELL_KNOWN_DIR", "crates/checkout/public/.well-known"),
            ),
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parsed("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: env.parsed("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with the error conventions of this module.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable (or its default) with `FromStr`.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    fn url(&self, key: &str, value: &str) -> Result<Url, ConfigError> {
        Url::parse(value.trim())
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    fn origin(&self, key: &str, value: &str) -> Result<Origin, ConfigError> {
        Origin::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

/// Ensure a path starts with exactly one slash.
fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim().trim_start_matches('/'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<CheckoutConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CheckoutConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("CHECKOUT_BASE_URL", "https://pay.example.com/")]).unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.backend.base_url.as_str(), "http://localhost:4000/");
        assert_eq!(config.backend.status_path, "/payment/hyperpay/status");
        assert_eq!(config.backend.timeout, Duration::from_secs(10));
        assert_eq!(config.widget.origin.as_str(), "https://eu-test.oppwa.com");
        assert_eq!(
            config.widget.dependency_origin().unwrap().as_str(),
            "https://code.jquery.com"
        );
        assert_eq!(config.widget.parent_origin.as_str(), "https://pay.example.com");
        assert_eq!(config.poll.interval, Duration::from_secs(30));
        assert_eq!(config.poll.max_attempts, 10);
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_base_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "CHECKOUT_BASE_URL"));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[
            ("CHECKOUT_BASE_URL", "https://pay.example.com"),
            ("CHECKOUT_PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "CHECKOUT_PORT"));
    }

    #[test]
    fn test_opaque_widget_origin_rejected() {
        let err = load(&[
            ("CHECKOUT_BASE_URL", "https://pay.example.com"),
            ("WIDGET_ORIGIN", "data:text/plain,hi"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "WIDGET_ORIGIN"));
    }

    #[test]
    fn test_explicit_parent_origin() {
        let config = load(&[
            ("CHECKOUT_BASE_URL", "https://pay.example.com"),
            ("WIDGET_PARENT_ORIGIN", "https://app.merchant.example/dashboard"),
        ])
        .unwrap();
        assert_eq!(
            config.widget.parent_origin.as_str(),
            "https://app.merchant.example"
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = load(&[
            ("CHECKOUT_BASE_URL", "https://pay.example.com"),
            ("POLL_INTERVAL_SECS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_status_path_normalized() {
        let config = load(&[
            ("CHECKOUT_BASE_URL", "https://pay.example.com"),
            ("BACKEND_STATUS_PATH", "payments/status"),
        ])
        .unwrap();
        assert_eq!(config.backend.status_path, "/payments/status");
    }
}
