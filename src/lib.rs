//! tillsync - offline-first write queue for point-of-sale clients
//!
//! Writes made while the device is offline are persisted in a local `SQLite`
//! queue and replayed against the remote store by a single-flight
//! orchestrator once connectivity returns. Failures are classified into
//! retryable, permanent and conflicting; the latter two wait for a human,
//! whom the bundled CLI serves.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod output;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::SyncError;
pub use sync::{QueueItem, QueueStatus, SyncOrchestrator, SyncQueue};
