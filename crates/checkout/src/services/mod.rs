//! Services that talk to the outside world.
//!
//! # Services
//!
//! - `backend` - Checkout status lookups against the payment backend
//! - `nonce_probe` - Client-side recovery of a page's CSP nonce
//! - `reconciler` - Timer-driven status reconciliation loop

pub mod backend;
pub mod nonce_probe;
pub mod reconciler;

pub use backend::{BackendClient, BackendError};
pub use nonce_probe::{NonceProbe, fetch_page_nonce, probe_page};
pub use reconciler::{Reconciler, ReconcilerHandle, StatusSource};
