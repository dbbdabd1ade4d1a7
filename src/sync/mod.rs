//! Offline write synchronization.
//!
//! Writes are queued durably while offline and replayed against the remote
//! store when connectivity allows.
//!
//! Features:
//! - Durable queue with priority ordering
//! - Per-entity-type processors registered at startup
//! - Structured failure classification (retry, fail or conflict)
//! - Per-item exponential backoff
//! - Single-flight orchestrator with stats and event streams

pub mod classifier;
pub mod connectivity;
pub mod item;
pub mod orchestrator;
pub mod processor;
pub mod queue;
pub mod state;

pub use classifier::{classify, Classifier, Verdict};
pub use connectivity::Connectivity;
pub use item::{entity, QueueItem, QueueStatus, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY};
pub use orchestrator::{
    ItemNotice, OrchestratorConfig, PassReport, PassSummary, SyncEvent, SyncOrchestrator,
    TriggerOutcome,
};
pub use processor::{Ack, ApplyError, ApplyErrorKind, FnProcessor, Processor, ProcessorRegistry};
pub use queue::{QueueStats, SyncQueue};
pub use state::{can_transition, resolve, AttemptOutcome, Backoff, Resolution};
