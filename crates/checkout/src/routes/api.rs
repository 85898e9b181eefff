//! JSON API routes.
//!
//! Everything under `/api` is outside the payment policy: these responses
//! carry no nonce and no `Content-Security-Policy`.

use std::io::ErrorKind;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use hosted_checkout_core::{CheckoutId, StatusPayload};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::routes::WELL_KNOWN_CACHE_CONTROL;
use crate::state::AppState;

/// File name of the Apple Pay merchant domain association.
pub const APPLE_PAY_ASSOCIATION_FILE: &str = "apple-developer-merchantid-domain-association.txt";

/// Error response for API endpoints.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            error: msg.into(),
            details: None,
            path: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Query for the status proxy.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusQuery {
    pub checkout_id: Option<String>,
}

/// Look up a checkout's status at the backend and pass the body through.
///
/// GET /api/payment/check-status?checkoutId=<id>
///
/// # Errors
///
/// Returns 400 without a checkout reference and 502 when the backend call
/// fails.
#[instrument(skip(state))]
pub async fn check_status(
    State(state): State<AppState>,
    Query(query): Query<CheckStatusQuery>,
) -> Result<Json<StatusPayload>, ApiError> {
    let checkout_id = CheckoutId::from_query(query.checkout_id.as_deref())
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Checkout ID is required"))?;

    match state.backend().check_status(&checkout_id).await {
        Ok(payload) => Ok(Json(payload)),
        Err(e) => {
            let event_id = sentry::capture_error(&e);
            tracing::error!(
                error = %e,
                checkout_id = %checkout_id,
                sentry_event_id = %event_id,
                "Status lookup failed"
            );
            Err(
                ApiError::new(StatusCode::BAD_GATEWAY, "Failed to check payment status")
                    .with_details(e.to_string()),
            )
        }
    }
}

/// Successful association file report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationReport {
    pub success: bool,
    pub message: &'static str,
    pub file_path: String,
    pub content_length: usize,
    pub content: String,
    pub headers: ServedHeaders,
}

/// Headers the association file is served with.
#[derive(Debug, Serialize)]
pub struct ServedHeaders {
    #[serde(rename = "Content-Type")]
    pub content_type: &'static str,
    #[serde(rename = "Cache-Control")]
    pub cache_control: &'static str,
}

/// Report whether the Apple Pay domain association file is in place.
///
/// GET /api/apple-pay-domain-test
///
/// # Errors
///
/// Returns 404 with the expected path when the file is absent, 500 when it
/// cannot be read.
#[instrument(skip(state))]
pub async fn apple_pay_domain_test(
    State(state): State<AppState>,
) -> Result<Json<AssociationReport>, ApiError> {
    let path = state
        .config()
        .well_known_dir
        .join(APPLE_PAY_ASSOCIATION_FILE);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Apple Pay domain association file missing");
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "Apple Pay domain association file not found",
            )
            .with_path(path.display().to_string()));
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Could not read association file");
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read Apple Pay domain association file",
            )
            .with_details(e.to_string()));
        }
    };

    Ok(Json(AssociationReport {
        success: true,
        message: "Apple Pay domain association file is properly configured",
        file_path: format!("/.well-known/{APPLE_PAY_ASSOCIATION_FILE}"),
        content_length: content.chars().count(),
        content,
        headers: ServedHeaders {
            content_type: "text/plain",
            cache_control: WELL_KNOWN_CACHE_CONTROL,
        },
    }))
}

/// Smoke-test response.
#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// GET /api/test
pub async fn test() -> Json<TestResponse> {
    Json(TestResponse {
        message: "Test API is working!",
        timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    })
}

/// GET /api/csp-test
///
/// Always answered without a policy; useful for checking the route
/// predicate from outside.
pub async fn csp_test() -> Json<TestResponse> {
    Json(TestResponse {
        message: "CSP test endpoint",
        timestamp: None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::header;
    use serde_json::Value;

    use super::*;
    use crate::routes::router;
    use crate::routes::test_support::{
        body_string, fake_backend, get, offline_app, online_app, scratch_dir, state,
    };

    async fn json(response: Response) -> Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_check_status_passes_body_through() {
        let response = get(online_app().await, "/api/payment/check-status?checkoutId=done").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_SECURITY_POLICY).is_none());
        assert_eq!(json(response).await["subscription"]["plan"]["name"], "Pro");
    }

    #[tokio::test]
    async fn test_check_status_requires_checkout() {
        let response = get(offline_app(), "/api/payment/check-status").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "Checkout ID is required");
    }

    #[tokio::test]
    async fn test_check_status_backend_failure() {
        let response =
            get(online_app().await, "/api/payment/check-status?checkoutId=broken").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = json(response).await;
        assert_eq!(body["error"], "Failed to check payment status");
        assert!(body["details"].as_str().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn test_domain_association_missing() {
        let dir = scratch_dir();
        let app = router(state(&fake_backend().await, &dir));

        let response = get(app, "/api/apple-pay-domain-test").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json(response).await;
        assert_eq!(body["error"], "Apple Pay domain association file not found");
        assert!(
            body["path"]
                .as_str()
                .unwrap()
                .ends_with(APPLE_PAY_ASSOCIATION_FILE)
        );
    }

    #[tokio::test]
    async fn test_domain_association_present() {
        let dir = scratch_dir();
        std::fs::write(dir.join(APPLE_PAY_ASSOCIATION_FILE), "7b2270737022").unwrap();
        let app = router(state("http://127.0.0.1:9", &dir));

        let response = get(app, "/api/apple-pay-domain-test").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["content"], "7b2270737022");
        assert_eq!(body["contentLength"], 12);
        assert_eq!(
            body["filePath"],
            "/.well-known/apple-developer-merchantid-domain-association.txt"
        );
        assert_eq!(body["headers"]["Cache-Control"], "public, max-age=86400");
    }

    #[tokio::test]
    async fn test_smoke_endpoints() {
        let body = json(get(offline_app(), "/api/test").await).await;
        assert_eq!(body["message"], "Test API is working!");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

        let body = json(get(offline_app(), "/api/csp-test").await).await;
        assert_eq!(body["message"], "CSP test endpoint");
        assert!(body.get("timestamp").is_none());
    }
}
