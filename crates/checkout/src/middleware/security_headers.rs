//! Baseline hardening headers for every response.
//!
//! The payment policy itself is applied by the CSP middleware to payment
//! surfaces only. This layer adds the headers that are safe everywhere,
//! including API and static responses. It never sets a
//! `Content-Security-Policy` and never overwrites a header a handler or
//! inner layer already set.
//!
//! `Cross-Origin-Opener-Policy` is not set: checkout popups must keep their
//! opener to post outcome messages.

use axum::{
    extract::Request,
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS},
    },
    middleware::Next,
    response::Response,
};

/// Add baseline security headers to all responses.
///
/// Headers applied when not already present:
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `Permissions-Policy` - Deny sensitive device features; `payment` stays
///   available to the page itself for wallet buttons
/// - `Cache-Control: no-store, max-age=0` - Keep payment pages out of caches
/// - `X-DNS-Prefetch-Control: off` - Prevent DNS prefetch leakage
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_hardening_headers(response.headers_mut());
    response
}

/// Insert the baseline headers into a header map, keeping existing values.
pub fn apply_hardening_headers(headers: &mut HeaderMap) {
    // Prevent MIME sniffing
    headers
        .entry(X_CONTENT_TYPE_OPTIONS)
        .or_insert(HeaderValue::from_static("nosniff"));

    headers
        .entry(HeaderName::from_static("permissions-policy"))
        .or_insert(HeaderValue::from_static(
            "accelerometer=(), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             magnetometer=(), \
             microphone=(), \
             midi=(), \
             payment=(self), \
             usb=()",
        ));

    // Prevent caching of payment responses unless a route opted in
    headers
        .entry(CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("no-store, max-age=0"));

    headers
        .entry(HeaderName::from_static("x-dns-prefetch-control"))
        .or_insert(HeaderValue::from_static("off"));
}
