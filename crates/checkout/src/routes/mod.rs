//! HTTP route handlers for the checkout server.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                            - Payment page (widget loader)
//! GET  /success                     - Success outcome page
//! GET  /failure                     - Failure outcome page
//! GET  /pending                     - Pending outcome page (reconciliation)
//! GET  /pending/status              - Reconciliation fragment (polled)
//! GET  /csp-test                    - Policy diagnostics page
//! GET  /health                      - Liveness check
//!
//! # API (no payment policy)
//! GET  /api/payment/check-status    - Proxy to the backend status lookup
//! GET  /api/apple-pay-domain-test   - Domain association file diagnostics
//! GET  /api/test                    - Smoke test
//! GET  /api/csp-test                - Smoke test for the policy exclusion
//!
//! # Static
//! GET  /static/*                    - CSS and scripts
//! GET  /.well-known/*               - Compliance artifacts (text/plain, 24 h)
//! ```

pub mod api;
pub mod diagnostics;
pub mod outcome;
pub mod payment;
pub mod pending;

use std::path::Path;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, Uri, header},
    middleware,
    response::Response,
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{
    services::{ServeDir, fs::ServeFileSystemResponseBody},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::middleware::{
    PaymentPolicy, payment_csp_middleware, request_id_middleware, security_headers_middleware,
    status_rate_limiter,
};
use crate::state::AppState;

/// Cache directive for compliance artifacts.
pub const WELL_KNOWN_CACHE_CONTROL: &str = "public, max-age=86400";

/// Directory holding the CSS and scripts served under `/static`.
const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Status lookup routes. Every request here reaches the backend, so they
/// share a per-client rate limit.
pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/api/payment/check-status", get(api::check_status))
        .route("/pending/status", get(pending::status_fragment))
        .layer(status_rate_limiter())
}

/// Page routes.
pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(payment::payment_page))
        .route("/success", get(outcome::success))
        .route("/failure", get(outcome::failure))
        .route("/pending", get(pending::pending_page))
        .route("/csp-test", get(diagnostics::csp_test_page))
}

/// Diagnostic API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/apple-pay-domain-test",
            get(api::apple_pay_domain_test),
        )
        .route("/api/test", get(api::test))
        .route("/api/csp-test", get(api::csp_test))
}

/// Cache directive for a well-known response. Only files that were found
/// are cacheable; misses fall through to the no-store default.
fn well_known_cache<B>(response: &Response<B>) -> Option<HeaderValue> {
    response
        .status()
        .is_success()
        .then(|| HeaderValue::from_static(WELL_KNOWN_CACHE_CONTROL))
}

/// Serve the well-known directory as plain text with a 24 hour cache
/// lifetime.
fn well_known_service(dir: &Path) -> Router {
    Router::new().fallback_service(
        ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                well_known_cache::<ServeFileSystemResponseBody>,
            ))
            .service(ServeDir::new(dir)),
    )
}

/// Build the complete application router with its middleware stack.
///
/// Layers are applied in reverse, so the last `.layer` call is outermost.
pub fn router(state: AppState) -> Router {
    let payment_policy = PaymentPolicy::new(state.policy().clone());
    let well_known = well_known_service(&state.config().well_known_dir);

    Router::new()
        .route("/health", get(health))
        .merge(page_routes())
        .merge(api_routes())
        .merge(status_routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .nest_service("/.well-known", well_known)
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            payment_policy,
            payment_csp_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = tracing::field::Empty,
                checkout_id = tracing::field::Empty,
            )
        }))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check the backend.
async fn health() -> &'static str {
    "ok"
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
