//! Subcommand implementations

pub mod clusters;
pub mod cpu;
pub mod graph;
