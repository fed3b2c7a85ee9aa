//! Subcommand implementations

pub mod alerts;
pub mod analysis;
pub mod cost;
