//! Request ID middleware for request tracing and correlation.
//!
//! Every request carries an `x-request-id`: the upstream proxy's value when
//! it looks sane, otherwise a fresh UUID v4. The ID, and the checkout
//! reference when the query string has one, are:
//! - Recorded in the current tracing span
//! - Added to the Sentry scope for error correlation
//!
//! The request ID is also returned in the response headers.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use hosted_checkout_core::CheckoutId;
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest upstream request ID accepted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Middleware that ensures every request has a request ID and tags the
/// trace and Sentry scope with it.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| is_acceptable(id))
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    let checkout_id = checkout_id_from_query(request.uri().query());

    let span = Span::current();
    span.record("request_id", &request_id);
    if let Some(id) = &checkout_id {
        span.record("checkout_id", id.as_str());
    }

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
        if let Some(id) = &checkout_id {
            scope.set_tag("checkout_id", id);
        }
    });

    let mut response = next.run(request).await;

    // Add to response headers so clients can reference the request ID
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Upstream IDs must be short and printable ASCII.
fn is_acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}

/// The `checkoutId` query parameter, when present and well formed.
fn checkout_id_from_query(query: Option<&str>) -> Option<CheckoutId> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "checkoutId")
        .and_then(|(_, value)| CheckoutId::parse(&value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_id_validation() {
        assert!(is_acceptable("cf-8a7b6c5d"));
        assert!(!is_acceptable(""));
        assert!(!is_acceptable("has space"));
        assert!(!is_acceptable(&"x".repeat(MAX_REQUEST_ID_LEN + 1)));
    }

    #[test]
    fn test_checkout_id_from_query() {
        assert_eq!(
            checkout_id_from_query(Some("brand=VISA&checkoutId=abc.123")).map(CheckoutId::into_inner),
            Some("abc.123".to_string())
        );
        assert!(checkout_id_from_query(Some("checkoutId=%3Cscript%3E")).is_none());
        assert!(checkout_id_from_query(None).is_none());
    }
}
