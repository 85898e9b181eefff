//! Payment amount as echoed back on the success redirect.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Amount`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The value is not a decimal number.
    #[error("invalid amount: {0}")]
    Invalid(String),
    /// The value is negative.
    #[error("amount cannot be negative")]
    Negative,
}

/// A non-negative monetary amount, displayed with two decimal places.
///
/// The success redirect carries the amount as free text. It is display-only
/// here; nothing in the front end does arithmetic on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Parse an amount such as `"99"`, `"99.5"` or `"1,250.00"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a decimal number or is negative.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
        let value =
            Decimal::from_str(&cleaned).map_err(|_| AmountError::Invalid(s.trim().to_owned()))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(value))
    }

    /// The underlying decimal value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0.round_dp(2))
    }
}
