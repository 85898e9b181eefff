//! Success and failure outcome pages.
//!
//! Both are terminal: they render whatever the redirect carried and offer
//! to close the payment window. Neither calls the backend.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::Query,
    response::{IntoResponse, Response},
};
use hosted_checkout_core::Amount;
use serde::Deserialize;
use tracing::instrument;

use crate::filters;
use crate::middleware::CspNonce;

/// Query parameters of the success redirect.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessQuery {
    pub transaction_id: Option<String>,
    pub amount: Option<String>,
}

/// Query parameters of the failure redirect.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureQuery {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Success page template.
#[derive(Template, WebTemplate)]
#[template(path = "success.html")]
pub struct SuccessTemplate {
    pub nonce: String,
    pub transaction_id: Option<String>,
    pub amount: Option<String>,
}

/// Failure page template.
#[derive(Template, WebTemplate)]
#[template(path = "failure.html")]
pub struct FailureTemplate {
    pub nonce: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Drop absent and blank query values.
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Format the redirect amount with two decimals, keeping unparseable input
/// as given.
fn display_amount(raw: &str) -> String {
    Amount::parse(raw).map_or_else(
        |e| {
            tracing::debug!(error = %e, "Showing unparsed amount");
            raw.trim().to_owned()
        },
        |amount| amount.to_string(),
    )
}

/// Success page handler.
#[instrument(skip(nonce))]
pub async fn success(CspNonce(nonce): CspNonce, Query(query): Query<SuccessQuery>) -> Response {
    tracing::info!(transaction_id = ?query.transaction_id, "Payment succeeded");

    SuccessTemplate {
        nonce,
        transaction_id: present(query.transaction_id),
        amount: present(query.amount).map(|a| display_amount(&a)),
    }
    .into_response()
}

/// Failure page handler.
#[instrument(skip(nonce))]
pub async fn failure(CspNonce(nonce): CspNonce, Query(query): Query<FailureQuery>) -> Response {
    tracing::warn!(error_code = ?query.error_code, "Payment failed");

    FailureTemplate {
        nonce,
        error_code: present(query.error_code),
        error_message: present(query.error_message),
    }
    .into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::routes::test_support::{body_string, get, offline_app};

    #[test]
    fn test_display_amount() {
        assert_eq!(display_amount("99"), "99.00");
        assert_eq!(display_amount("1,250.5"), "1250.50");
        assert_eq!(display_amount(" 12 SAR "), "12 SAR");
    }

    #[tokio::test]
    async fn test_success_page() {
        let response = get(offline_app(), "/success?transactionId=tx-42&amount=99.5").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("Payment Successful!"));
        assert!(body.contains("Your subscription has been activated"));
        assert!(body.contains("tx-42"));
        assert!(body.contains("99.50"));
        assert!(body.contains("✅ Completed"));
    }

    #[tokio::test]
    async fn test_success_page_without_details() {
        let body = body_string(get(offline_app(), "/success").await).await;
        assert!(body.contains("Payment Successful!"));
        assert!(!body.contains("Transaction ID"));
        assert!(!body.contains("Amount"));
    }

    #[tokio::test]
    async fn test_failure_page_escapes_message() {
        let body = body_string(
            get(
                offline_app(),
                "/failure?errorCode=800.100.151&errorMessage=%3Cb%3Einvalid%20card%3C%2Fb%3E",
            )
            .await,
        )
        .await;

        assert!(body.contains("Payment Failed"));
        assert!(body.contains("800.100.151"));
        assert!(body.contains("&#60;b&#62;invalid card"));
        assert!(!body.contains("<b>invalid card"));
        assert!(body.contains("❌ Failed"));
    }
}
