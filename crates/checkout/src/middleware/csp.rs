//! Payment-surface Content-Security-Policy middleware.
//!
//! Every request to a payment surface gets a fresh 128-bit nonce. The nonce
//! is stamped into the `script-src` directive of the response policy, handed
//! to the page renderer through request extensions and the `x-csp-nonce`
//! request header, and echoed on the response as `X-CSP-Nonce` so a
//! client-side probe can recover it.
//!
//! # Route predicate
//!
//! Every path is a payment surface except:
//! - paths starting with `/api`, `/_next/static`, `/_next/image` or `/static`
//! - exactly `/favicon.ico`
//!
//! Excluded paths pass through untouched.
//!
//! # Degradation
//!
//! If the nonce cannot be generated the request is served without a policy
//! and without a nonce header. Pages then render with a fallback nonce and
//! the browser blocks their scripts.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
        request::Parts,
    },
    middleware::Next,
    response::Response,
};
use hosted_checkout_core::policy::PolicyTemplate;
use hosted_checkout_core::{Nonce, NonceError};

/// Header carrying the nonce on the request (to renderers) and the response
/// (to client-side probes).
pub const NONCE_HEADER: &str = "x-csp-nonce";

/// Path prefixes that never receive a payment policy.
const EXCLUDED_PREFIXES: [&str; 4] = ["/api", "/_next/static", "/_next/image", "/static"];

/// Paths that never receive a payment policy.
const EXCLUDED_PATHS: [&str; 1] = ["/favicon.ico"];

/// Whether a request path gets the payment policy.
#[must_use]
pub fn is_payment_surface(path: &str) -> bool {
    !(EXCLUDED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || EXCLUDED_PATHS.contains(&path))
}

/// Nonce generator used by the middleware.
pub type NonceGenerator = fn() -> Result<Nonce, NonceError>;

/// State for [`payment_csp_middleware`].
#[derive(Clone, Debug)]
pub struct PaymentPolicy {
    template: PolicyTemplate,
    generate: NonceGenerator,
}

impl PaymentPolicy {
    /// Policy middleware state drawing nonces from the OS RNG.
    #[must_use]
    pub fn new(template: PolicyTemplate) -> Self {
        Self {
            template,
            generate: Nonce::generate,
        }
    }

    /// Replace the nonce generator.
    #[must_use]
    pub fn with_generator(mut self, generate: NonceGenerator) -> Self {
        self.generate = generate;
        self
    }
}

/// The CSP nonce assigned to the current request.
///
/// Extracted from request extensions; empty when the request is not a
/// payment surface or the nonce could not be generated.
///
/// # Example
///
/// ```ignore
/// async fn handler(CspNonce(nonce): CspNonce) -> impl IntoResponse {
///     MyTemplate { nonce, /* ... */ }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct CspNonce(pub String);

impl CspNonce {
    /// Get the nonce value for use in templates.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CspNonce
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_else(|| {
            tracing::warn!(
                path = %parts.uri.path(),
                "CSP nonce not found in request extensions"
            );
            Self(String::new())
        }))
    }
}

/// Read the nonce from the request carrier header, or `""`.
#[must_use]
pub fn server_nonce(headers: &HeaderMap) -> &str {
    headers
        .get(NONCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Middleware that applies the payment policy to payment surfaces.
///
/// Any inbound `x-csp-nonce` header is discarded first, so the carrier
/// header only ever holds a value generated here.
pub async fn payment_csp_middleware(
    State(policy): State<PaymentPolicy>,
    mut request: Request,
    next: Next,
) -> Response {
    request.headers_mut().remove(NONCE_HEADER);

    if !is_payment_surface(request.uri().path()) {
        return next.run(request).await;
    }

    let nonce = match (policy.generate)() {
        Ok(nonce) => nonce,
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %request.uri().path(),
                "Could not generate CSP nonce; serving without a policy"
            );
            return next.run(request).await;
        }
    };

    let csp = policy.template.for_nonce(&nonce).header_value();
    let (Ok(nonce_value), Ok(csp_value)) =
        (HeaderValue::from_str(nonce.value()), HeaderValue::from_str(&csp))
    else {
        tracing::warn!("CSP header contains invalid characters; serving without a policy");
        return next.run(request).await;
    };

    request
        .headers_mut()
        .insert(NONCE_HEADER, nonce_value.clone());
    request
        .extensions_mut()
        .insert(CspNonce(nonce.value().to_owned()));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(HeaderName::from_static(NONCE_HEADER), nonce_value);
    headers.insert(CONTENT_SECURITY_POLICY, csp_value);
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}
