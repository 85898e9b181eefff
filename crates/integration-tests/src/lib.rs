//! Integration tests for the hosted checkout.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p hosted-checkout-integration-tests
//! ```
//!
//! Every test starts its own checkout server and a fake payment backend on
//! ephemeral ports, so no external services are needed and tests can run in
//! parallel.
//!
//! # Test Categories
//!
//! - `checkout_pages` - Policy headers and nonce tagging on served pages
//! - `checkout_status` - Status proxy, pending fragment and reconciliation
//! - `operator_tools` - Nonce probes and policy audits against a live server

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use hosted_checkout::config::CheckoutConfig;
use hosted_checkout::routes;
use hosted_checkout::state::AppState;
use reqwest::Client;
use serde_json::{Value, json};

/// Checkout reference the fake backend always confirms.
pub const CONFIRMED: &str = "confirmed";

/// Checkout reference the fake backend always fails with 502.
pub const BROKEN: &str = "broken";

/// Checkout reference the fake backend confirms on its third lookup.
pub const SETTLING: &str = "settling";

/// An in-process stand-in for the payment backend's status endpoint.
#[derive(Clone)]
pub struct FakeBackend {
    pub url: String,
    calls: Arc<AtomicUsize>,
}

impl FakeBackend {
    /// Serve the fake backend on an ephemeral port.
    pub async fn start() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/payment/hyperpay/status", get(status))
            .with_state(Arc::clone(&calls));
        let url = serve(app).await;
        Self { url, calls }
    }

    /// Status lookups served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn status(
    State(calls): State<Arc<AtomicUsize>>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    let confirmed = || {
        (
            StatusCode::OK,
            Json(json!({"subscription": {"plan": {"name": "Pro"}}})),
        )
    };

    match query.get("checkoutId").map(String::as_str) {
        Some(CONFIRMED) => confirmed(),
        Some(SETTLING) if call >= 3 => confirmed(),
        Some(BROKEN) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "upstream unavailable"})),
        ),
        _ => (StatusCode::OK, Json(json!({"status": "pending"}))),
    }
}

/// A running checkout server wired to a [`FakeBackend`].
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub backend: FakeBackend,
    pub well_known_dir: PathBuf,
}

impl TestContext {
    /// Start a checkout server with default settings.
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    /// Start a checkout server with extra environment settings.
    pub async fn with_env(extra: &[(&str, &str)]) -> Self {
        let backend = FakeBackend::start().await;
        let well_known_dir =
            std::env::temp_dir().join(format!("hosted-checkout-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&well_known_dir).unwrap();

        let mut vars: HashMap<String, String> = HashMap::from([
            (
                "CHECKOUT_BASE_URL".to_string(),
                "https://pay.example.com".to_string(),
            ),
            ("BACKEND_URL".to_string(), backend.url.clone()),
            (
                "WELL_KNOWN_DIR".to_string(),
                well_known_dir.display().to_string(),
            ),
        ]);
        for (key, value) in extra {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = CheckoutConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let app = routes::router(AppState::new(config).unwrap());
        let base_url = serve(app).await;

        Self {
            client: Client::new(),
            base_url,
            backend,
            well_known_dir,
        }
    }

    /// Absolute URL of a path on the checkout server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET a path and return the response.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}

/// Serve a router on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

/// Value of a `data-*` attribute in rendered markup.
#[must_use]
pub fn data_attr<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("data-{name}=\"");
    let start = html.find(&needle)? + needle.len();
    let len = html.get(start..)?.find('"')?;
    html.get(start..start + len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_attr() {
        let html = r#"<div id="pending-status" data-auto="3" data-next-poll-ms="30000">"#;
        assert_eq!(data_attr(html, "auto"), Some("3"));
        assert_eq!(data_attr(html, "next-poll-ms"), Some("30000"));
        assert_eq!(data_attr(html, "manual"), None);
    }
}
