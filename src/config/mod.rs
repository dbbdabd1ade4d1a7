//! Configuration management for tillsync.
//!
//! This module handles loading and saving configuration from `~/.tillsync/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{retention_window, Config, GeneralConfig, SyncConfig};
