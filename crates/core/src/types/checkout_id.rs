//! Checkout session reference type.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CheckoutId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutIdError {
    /// The input string is empty (after trimming).
    #[error("checkout id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("checkout id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside the allowed set.
    #[error("checkout id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Opaque identifier of one in-progress payment attempt.
///
/// Issued by the payment backend before the page loads and passed through
/// the `checkoutId` query parameter. The front end never mutates it; it is
/// only used as the reconciliation key and to build the widget script URL.
///
/// ## Constraints
///
/// - Length: 1-128 characters
/// - Characters: ASCII alphanumerics, `.`, `-` and `_`
///
/// The character set keeps the value safe to interpolate into a script URL
/// and into the generated configuration block.
///
/// ## Examples
///
/// ```
/// use hosted_checkout_core::CheckoutId;
///
/// assert!(CheckoutId::parse("8ac7a4c8-93f1.prod01_ab").is_ok());
///
/// assert!(CheckoutId::parse("").is_err());
/// assert!(CheckoutId::parse("abc\"><script>").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct CheckoutId(String);

impl CheckoutId {
    /// Maximum length of a checkout reference.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `CheckoutId` from a string, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than
    /// [`Self::MAX_LENGTH`], or contains a character outside the allowed set.
    pub fn parse(s: &str) -> Result<Self, CheckoutIdError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(CheckoutIdError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(CheckoutIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(CheckoutIdError::InvalidCharacter(c));
        }

        Ok(Self(s.to_owned()))
    }

    /// Parse an optional query value, treating absent and invalid alike.
    ///
    /// Invalid values are logged so a malformed redirect is visible in traces.
    #[must_use]
    pub fn from_query(value: Option<&str>) -> Option<Self> {
        let value = value?;
        match Self::parse(value) {
            Ok(id) => Some(id),
            Err(CheckoutIdError::Empty) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed checkout id");
                None
            }
        }
    }

    /// Returns the checkout reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `CheckoutId` and returns the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CheckoutId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CheckoutId {
    type Err = CheckoutIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CheckoutId {
    type Error = CheckoutIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CheckoutId> for String {
    fn from(id: CheckoutId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = CheckoutId::parse("abc123").expect("valid");
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = CheckoutId::parse("  abc123\n").expect("valid");
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(CheckoutId::parse(""), Err(CheckoutIdError::Empty));
        assert_eq!(CheckoutId::parse("   "), Err(CheckoutIdError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(CheckoutId::MAX_LENGTH + 1);
        assert!(matches!(
            CheckoutId::parse(&long),
            Err(CheckoutIdError::TooLong { .. })
        ));
        assert!(CheckoutId::parse(&"a".repeat(CheckoutId::MAX_LENGTH)).is_ok());
    }

    #[test]
    fn test_parse_rejects_markup_and_query_breakers() {
        for bad in ["a&b=c", "a\"b", "a<b", "a b", "a/b", "a?b"] {
            assert!(
                matches!(
                    CheckoutId::parse(bad),
                    Err(CheckoutIdError::InvalidCharacter(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_query() {
        assert_eq!(CheckoutId::from_query(None), None);
        assert_eq!(CheckoutId::from_query(Some("")), None);
        assert_eq!(CheckoutId::from_query(Some("bad id")), None);
        assert_eq!(
            CheckoutId::from_query(Some("abc123")),
            Some(CheckoutId::parse("abc123").expect("valid"))
        );
    }

    #[test]
    fn test_serde_validates() {
        let id: CheckoutId = serde_json::from_str("\"abc123\"").expect("valid");
        assert_eq!(id.as_str(), "abc123");
        assert!(serde_json::from_str::<CheckoutId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"abc123\"");
    }
}
