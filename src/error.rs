//! Error types for tillsync.
//!
//! Failures of a remote apply attempt are not represented here; those are
//! [`ApplyError`](crate::sync::ApplyError) values, which never escape a sync
//! pass.

use thiserror::Error;

use crate::sync::QueueStatus;

/// Errors surfaced by the queue, cache, configuration and CLI layers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The durable store rejected a read or write.
    ///
    /// An enqueue that returns this error was not queued.
    #[error("storage error: {0}")]
    Storage(String),

    /// No processor is registered for an entity type.
    #[error("no processor registered for entity type '{0}'")]
    UnregisteredEntity(String),

    /// A status change that the queue state machine does not allow.
    #[error("invalid transition for item {id}: {from} -> {to}")]
    InvalidTransition {
        /// Item identifier.
        id: i64,
        /// Current status.
        from: QueueStatus,
        /// Requested status.
        to: QueueStatus,
    },

    /// The requested item or cache entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration could not be loaded, saved or resolved.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input could not be parsed or serialized.
    #[error("parse error: {0}")]
    Parse(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl SyncError {
    /// Whether this error came from the durable store.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
