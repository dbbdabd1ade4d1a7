//! Command-line interface for tillsync.

pub mod args;
pub mod commands;
