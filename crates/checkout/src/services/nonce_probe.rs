//! Client-side nonce accessor.
//!
//! Recovers the nonce of a page by re-requesting it with `HEAD` and reading
//! the carrier header. The policy middleware generates a fresh nonce per
//! response, so the probed value matches the probe response, not any earlier
//! render of the same page. Operators use this to check that a deployment
//! emits a nonce at all and that the header and policy agree.

use hosted_checkout_core::policy::ContentSecurityPolicy;
use reqwest::header::{CACHE_CONTROL, CONTENT_SECURITY_POLICY, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::middleware::csp::NONCE_HEADER;

/// Headers of interest from a probe response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NonceProbe {
    /// Value of the carrier header, or empty.
    pub nonce: String,
    /// The `Content-Security-Policy` header, if any.
    pub policy: Option<String>,
}

impl NonceProbe {
    fn from_headers(headers: &HeaderMap) -> Self {
        let nonce = headers
            .get(NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let policy = headers
            .get(CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Self { nonce, policy }
    }

    /// Whether the policy's `script-src` nonce equals the carrier header.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let Some(policy) = self.policy.as_deref() else {
            return false;
        };
        !self.nonce.is_empty()
            && ContentSecurityPolicy::parse(policy).script_nonce() == Some(self.nonce.as_str())
    }
}

/// Probe a page and return its headers of interest.
///
/// Never fails: transport errors are logged and yield an empty probe.
#[instrument(skip(client))]
pub async fn probe_page(client: &reqwest::Client, url: &str) -> NonceProbe {
    let response = client
        .head(url)
        .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .send()
        .await;

    match response {
        Ok(response) => NonceProbe::from_headers(response.headers()),
        Err(e) => {
            warn!(error = %e, "Could not get nonce from headers");
            NonceProbe::default()
        }
    }
}

/// Fetch the nonce of a page, or `""` when none can be obtained.
pub async fn fetch_page_nonce(client: &reqwest::Client, url: &str) -> String {
    probe_page(client, url).await.nonce
}
