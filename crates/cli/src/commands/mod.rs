//! Subcommand implementations.

pub mod probe;
pub mod status;
