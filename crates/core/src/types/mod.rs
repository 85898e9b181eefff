//! Core types for the hosted checkout.
//!
//! This module provides type-safe wrappers for the values that cross the
//! boundary between the page, the payment widget and the backend.

pub mod amount;
pub mod checkout_id;
pub mod nonce;
pub mod status;

pub use amount::{Amount, AmountError};
pub use checkout_id::{CheckoutId, CheckoutIdError};
pub use nonce::{Nonce, NonceError, NonceSource, ResolvedNonce, resolve_nonce};
pub use status::{StatusPayload, Subscription};
