//! Hosted Checkout server library.
//!
//! The binary is a thin wrapper around [`routes::router`]; everything it
//! serves is built here so tests can drive the real router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
