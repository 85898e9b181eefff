//! Per-response CSP nonce.
//!
//! A nonce lives for exactly one response: it is generated by the policy
//! middleware, embedded in the `script-src` directive, and copied onto every
//! script element rendered for that response. It is never persisted.

use core::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{TryRngCore, rngs::OsRng};
use serde::Serialize;
use uuid::Uuid;

/// Errors that can occur when generating a [`Nonce`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NonceError {
    /// The operating system RNG could not provide entropy.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),
}

/// A CSP nonce value.
///
/// Generated nonces are 128 bits from the OS RNG, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Number of random bytes in a generated nonce.
    pub const ENTROPY_BYTES: usize = 16;

    /// Generate a new random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::EntropyUnavailable`] if the OS RNG fails.
    pub fn generate() -> Result<Self, NonceError> {
        let mut bytes = [0u8; Self::ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| NonceError::EntropyUnavailable(e.to_string()))?;
        Ok(Self(STANDARD.encode(bytes)))
    }

    /// Generate a locally random nonce that matches no emitted policy.
    ///
    /// Only for degraded environments where neither the response header nor
    /// a probe request yielded a value. Elements tagged with it will be
    /// blocked by a nonce-based policy.
    #[must_use]
    pub fn fallback() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a nonce read back from a header or attribute.
    ///
    /// Returns `None` for empty values or values containing characters that
    /// cannot appear in a base64 or hex token.
    #[must_use]
    pub fn from_value(value: &str) -> Option<Self> {
        let value = value.trim();
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_'));
        valid.then(|| Self(value.to_owned()))
    }

    /// Get the nonce value for use in templates and headers.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    /// The `script-src` source expression for this nonce: `'nonce-<value>'`.
    #[must_use]
    pub fn source_expression(&self) -> String {
        format!("'nonce-{}'", self.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a resolved nonce came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceSource {
    /// Read from the carrier header of the current request.
    Server,
    /// Read from the carrier header of a probe request for the same page.
    Client,
    /// Generated locally; will not match the emitted policy.
    Fallback,
}

impl NonceSource {
    /// Whether scripts tagged with this nonce are expected to run.
    #[must_use]
    pub const fn matches_policy(self) -> bool {
        !matches!(self, Self::Fallback)
    }

    /// Stable string form for markup attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::Fallback => "fallback",
        }
    }
}

/// A nonce together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNonce {
    pub nonce: Nonce,
    pub source: NonceSource,
}

/// Pick the nonce to tag injected scripts with.
///
/// Prefers the server-side accessor, then the client-side probe, and only
/// then generates a fallback. Both accessors report "no nonce" as an empty
/// string. Falling back is logged at `warn` because the page's scripts will
/// be blocked by the browser.
#[must_use]
pub fn resolve_nonce(server: &str, client: &str) -> ResolvedNonce {
    if let Some(nonce) = Nonce::from_value(server) {
        return ResolvedNonce {
            nonce,
            source: NonceSource::Server,
        };
    }

    if let Some(nonce) = Nonce::from_value(client) {
        return ResolvedNonce {
            nonce,
            source: NonceSource::Client,
        };
    }

    tracing::warn!(
        "No CSP nonce available from response headers; using a fallback nonce that the policy will reject"
    );
    ResolvedNonce {
        nonce: Nonce::fallback(),
        source: NonceSource::Fallback,
    }
}
