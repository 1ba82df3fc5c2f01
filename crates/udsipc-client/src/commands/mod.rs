//! Subcommand implementations.

pub mod send;
pub mod serve;
