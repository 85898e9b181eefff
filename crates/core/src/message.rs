//! Cross-window messages between the payment frame and its embedding page.
//!
//! When the checkout runs inside an iframe or popup, the embedding page
//! learns about an in-widget success only through `postMessage`. Messages
//! are a tagged union serialized as `{ "type": ..., "data": ... }`, and
//! inbound messages are accepted only from a configured origin.

use serde::{Deserialize, Serialize};
use url::Url;

/// Errors raised when validating an inbound message.
#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    /// The message came from an origin other than the trusted one.
    #[error("message from untrusted origin {0}")]
    UntrustedOrigin(String),
    /// The payload is not a known message kind.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The configured or supplied origin is not a valid URL origin.
    #[error("invalid origin {0}")]
    InvalidOrigin(String),
}

/// A message posted to the embedding page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParentMessage {
    /// The widget reported a successful payment.
    PaymentSuccess {
        #[serde(rename = "resourcePath")]
        resource_path: String,
    },
}

/// A normalized `scheme://host[:port]` origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Parse an origin from any URL on it.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidOrigin`] for unparseable input and for
    /// opaque origins (e.g. `data:` URLs), which can never be trusted.
    pub fn parse(s: &str) -> Result<Self, MessageError> {
        let url = Url::parse(s.trim()).map_err(|_| MessageError::InvalidOrigin(s.to_owned()))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(MessageError::InvalidOrigin(s.to_owned()));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Origin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate an inbound message against the trusted origin.
///
/// # Errors
///
/// Returns [`MessageError::UntrustedOrigin`] when `origin` does not match
/// `trusted`, and [`MessageError::Malformed`] when the payload is not a
/// known message kind. The origin is checked before the payload is parsed.
pub fn accept_message(
    origin: &str,
    trusted: &Origin,
    payload: &str,
) -> Result<ParentMessage, MessageError> {
    let sender = Origin::parse(origin).map_err(|_| MessageError::UntrustedOrigin(origin.to_owned()))?;
    if &sender != trusted {
        return Err(MessageError::UntrustedOrigin(origin.to_owned()));
    }
    Ok(serde_json::from_str(payload)?)
}

/// Destination for messages to the embedding page.
pub trait MessageSink {
    /// Post a message restricted to `target_origin`.
    fn post(&mut self, message: ParentMessage, target_origin: &Origin);
}

/// Sink that records posted messages. Useful in tests and for rendering.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub posted: Vec<(ParentMessage, Origin)>,
}

impl MessageSink for RecordingSink {
    fn post(&mut self, message: ParentMessage, target_origin: &Origin) {
        self.posted.push((message, target_origin.clone()));
    }
}
