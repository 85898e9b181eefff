//! Policy diagnostics page.
//!
//! `/csp-test` is itself a payment surface, so it shows the exact policy
//! its own response is served with and audits it.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use hosted_checkout_core::Nonce;
use hosted_checkout_core::policy::ComplianceCheck;

use crate::filters;
use crate::middleware::CspNonce;
use crate::state::AppState;

/// Diagnostics page template.
#[derive(Template, WebTemplate)]
#[template(path = "csp_test.html")]
pub struct CspTestTemplate {
    pub nonce: String,
    pub policy: Option<String>,
    pub checks: Vec<ComplianceCheck>,
}

/// GET /csp-test
pub async fn csp_test_page(State(state): State<AppState>, CspNonce(nonce): CspNonce) -> Response {
    let (policy, checks) = match Nonce::from_value(&nonce) {
        Some(n) => {
            let policy = state.policy().for_nonce(&n);
            let checks = state.policy().audit(&policy);
            (Some(policy.header_value()), checks)
        }
        None => (None, Vec::new()),
    };

    CspTestTemplate {
        nonce,
        policy,
        checks,
    }
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::header::CONTENT_SECURITY_POLICY;

    use crate::routes::test_support::{body_string, get, offline_app};

    #[tokio::test]
    async fn test_page_shows_served_policy() {
        let response = get(offline_app(), "/csp-test").await;
        let csp = response
            .headers()
            .get(CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        let body = body_string(response).await;

        // Single quotes in the policy are entity-escaped in the markup.
        let nonce_source = csp
            .split_whitespace()
            .find(|s| s.starts_with("'nonce-"))
            .unwrap()
            .trim_matches(['\'', ';']);
        assert!(body.contains(nonce_source));
        assert!(body.contains("PCI DSS v4.0 CSP Compliance Test"));
        assert!(body.contains("Widget Script Source"));
        assert!(body.contains("Object Source"));
        assert!(!body.contains("data-passed=\"false\""));
    }
}
