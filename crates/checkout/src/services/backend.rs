//! Client for the payment backend's checkout status endpoint.
//!
//! The backend is the authority on whether a checkout has completed:
//!
//! ```text
//! GET <BACKEND_URL><BACKEND_STATUS_PATH>?checkoutId=<id>
//! ```
//!
//! A 2xx JSON body with a truthy `subscription` field is terminal success.
//! Any other 2xx body means the payment is still pending. Non-2xx answers
//! and transport failures are errors; the reconciliation loop treats them as
//! transient.
//!
//! Confirmed results are cached for an hour since a completed payment
//! never reverts. Pending results are never cached.

use std::sync::Arc;
use std::time::Duration;

use hosted_checkout_core::reconcile::CheckOutcome;
use hosted_checkout_core::{CheckoutId, StatusPayload};
use moka::future::Cache;
use reqwest::header::{ACCEPT, HeaderValue};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::BackendConfig;

/// How long a confirmed status is served from memory.
const CONFIRMED_TTL: Duration = Duration::from_secs(3600);

/// Errors that can occur when querying the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status.
    #[error("Backend API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse the response body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The configured endpoint could not be joined into a URL.
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Append `path` to the path of `base`.
///
/// Unlike [`Url::join`], a base with its own path prefix keeps it, so
/// `https://api.example.com/v1` with `/payment/status` resolves to
/// `https://api.example.com/v1/payment/status`.
fn endpoint_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

/// Client for the backend status endpoint.
///
/// Cheap to clone; clones share the HTTP connection pool and cache.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    status_url: Url,
    confirmed: Cache<CheckoutId, StatusPayload>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the status URL is invalid or the HTTP client fails
    /// to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let status_url = endpoint_url(&config.base_url, &config.status_path)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let confirmed = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(CONFIRMED_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                status_url,
                confirmed,
            }),
        })
    }

    /// The status lookup URL for a checkout.
    #[must_use]
    pub fn status_url(&self, checkout_id: &CheckoutId) -> Url {
        let mut url = self.inner.status_url.clone();
        url.query_pairs_mut()
            .append_pair("checkoutId", checkout_id.as_str());
        url
    }

    /// Look up the status of a checkout.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the backend answers with a
    /// non-success status, or the body is not JSON.
    #[instrument(skip(self), fields(checkout_id = %checkout_id))]
    pub async fn check_status(
        &self,
        checkout_id: &CheckoutId,
    ) -> Result<StatusPayload, BackendError> {
        if let Some(payload) = self.inner.confirmed.get(checkout_id).await {
            debug!("Cache hit for confirmed checkout");
            return Ok(payload);
        }

        let url = self.status_url(checkout_id);
        debug!(%url, "Calling backend status endpoint");

        let response = self
            .inner
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: StatusPayload = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        if payload.is_confirmed() {
            self.inner
                .confirmed
                .insert(checkout_id.clone(), payload.clone())
                .await;
        }

        Ok(payload)
    }

    /// Look up the status of a checkout as a reconciliation outcome.
    ///
    /// Errors become [`CheckOutcome::Failed`] so the caller can count them
    /// without stopping.
    pub async fn check(&self, checkout_id: &CheckoutId) -> CheckOutcome {
        match self.check_status(checkout_id).await {
            Ok(payload) => CheckOutcome::Payload(payload),
            Err(e) => CheckOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    #[derive(serde::Deserialize)]
    struct StatusQuery {
        #[serde(rename = "checkoutId")]
        checkout_id: String,
    }

    /// Serve a fake backend on an ephemeral port and return its base URL.
    async fn fake_backend(hits: Arc<AtomicUsize>) -> Url {
        async fn status(
            State(hits): State<Arc<AtomicUsize>>,
            Query(query): Query<StatusQuery>,
        ) -> (StatusCode, Json<Value>) {
            hits.fetch_add(1, Ordering::SeqCst);
            match query.checkout_id.as_str() {
                "done" => (
                    StatusCode::OK,
                    Json(json!({"subscription": {"plan": {"name": "Pro"}}})),
                ),
                "broken" => (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": "upstream unavailable"})),
                ),
                _ => (StatusCode::OK, Json(json!({"status": "pending"}))),
            }
        }

        let app = Router::new()
            .route("/payment/hyperpay/status", get(status))
            .with_state(hits);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    fn client(base_url: Url) -> BackendClient {
        BackendClient::new(&BackendConfig {
            base_url,
            status_path: "/payment/hyperpay/status".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn id(s: &str) -> CheckoutId {
        CheckoutId::parse(s).unwrap()
    }

    #[test]
    fn test_status_url() {
        let client = client(Url::parse("http://localhost:4000").unwrap());
        assert_eq!(
            client.status_url(&id("abc.123")).as_str(),
            "http://localhost:4000/payment/hyperpay/status?checkoutId=abc.123"
        );
    }

    #[test]
    fn test_status_url_keeps_base_path_prefix() {
        for base in ["https://api.example.com/v1", "https://api.example.com/v1/"] {
            let client = client(Url::parse(base).unwrap());
            assert_eq!(
                client.status_url(&id("abc123")).as_str(),
                "https://api.example.com/v1/payment/hyperpay/status?checkoutId=abc123",
                "{base}"
            );
        }
    }

    #[test]
    fn test_cannot_be_a_base_url_is_rejected() {
        let err = BackendClient::new(&BackendConfig {
            base_url: Url::parse("mailto:ops@example.com").unwrap(),
            status_path: "/payment/hyperpay/status".to_string(),
            timeout: Duration::from_secs(5),
        })
        .err()
        .unwrap();
        assert!(matches!(err, BackendError::Url(_)));
    }

    #[tokio::test]
    async fn test_pending_is_not_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let client = client(fake_backend(Arc::clone(&hits)).await);

        let first = client.check_status(&id("abc")).await.unwrap();
        let second = client.check_status(&id("abc")).await.unwrap();

        assert!(!first.is_confirmed());
        assert!(!second.is_confirmed());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_confirmed_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let client = client(fake_backend(Arc::clone(&hits)).await);

        let first = client.check_status(&id("done")).await.unwrap();
        let second = client.check_status(&id("done")).await.unwrap();

        assert!(first.is_confirmed());
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let client = client(fake_backend(hits).await);

        let err = client.check_status(&id("broken")).await.unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 502, .. }));

        let outcome = client.check(&id("broken")).await;
        assert!(matches!(outcome, CheckOutcome::Failed(ref msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let client = client(Url::parse("http://127.0.0.1:9").unwrap());
        let err = client.check_status(&id("abc")).await.unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
    }
}
