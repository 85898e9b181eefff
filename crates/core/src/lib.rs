//! Hosted Checkout Core - Shared types and state machines.
//!
//! This crate provides the pieces of the checkout front end that do not
//! touch the network:
//! - `checkout` - Server binary (policy middleware, pages, backend proxy)
//! - `cli` - Operator tools (status lookups, reconciliation, CSP probes)
//!
//! # Architecture
//!
//! The core crate contains only types, traits and sans-IO state machines -
//! no HTTP clients, no timers, no DOM. Callers feed events in and act on the
//! transitions that come out, which keeps everything here unit-testable.
//!
//! # Modules
//!
//! - [`types`] - Checkout references, nonces, amounts and backend payloads
//! - [`policy`] - Content-Security-Policy construction and parsing
//! - [`widget`] - Ordered, nonce-tagged loading of the hosted payment widget
//! - [`message`] - Cross-window messages posted to the embedding page
//! - [`reconcile`] - Bookkeeping for polling the backend for an outcome

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod message;
pub mod policy;
pub mod reconcile;
pub mod types;
pub mod widget;

pub use types::*;
