//! HTTP middleware stack for the checkout server.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with `request_id` and `checkout_id` fields)
//! 3. Request ID (record IDs into the span and Sentry scope)
//! 4. Security headers (baseline hardening on every response)
//! 5. Payment CSP (nonce + policy on payment surfaces only)
//! 6. Rate limiting (governor, status lookup routes only)

pub mod csp;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use csp::{
    CspNonce, NONCE_HEADER, PaymentPolicy, is_payment_surface, payment_csp_middleware,
    server_nonce,
};
pub use rate_limit::status_rate_limiter;
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
