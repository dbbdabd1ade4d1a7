//! Sync orchestrator.
//!
//! Drives passes over the queue: pick up due items in priority order, apply
//! each through its processor, classify failures and persist the outcome.
//! Only one pass runs at a time. Observers get queue statistics through a
//! `watch` channel and per-pass or per-item notices through a `broadcast`
//! channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::Classifier;
use super::item::{QueueItem, QueueStatus};
use super::processor::{ApplyError, ProcessorRegistry};
use super::queue::{QueueStats, SyncQueue};
use super::state::{resolve, AttemptOutcome, Backoff};
use crate::config::SyncConfig;
use crate::error::SyncError;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time between periodic passes while online
    pub interval: Duration,
    /// Upper bound on one processor call
    pub apply_timeout: Duration,
    /// Delay schedule for transient failures
    pub backoff: Backoff,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

/// Shortest period the run loop ticks at.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for OrchestratorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: config.interval().max(MIN_INTERVAL),
            apply_timeout: config.apply_timeout(),
            backoff: Backoff::new(
                Duration::from_secs(config.backoff_base_secs),
                Duration::from_secs(config.backoff_max_secs),
            ),
            event_capacity: config.event_capacity.max(1),
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Items handed to a processor
    pub attempted: usize,
    /// Items that ended `synced`
    pub synced: usize,
    /// Items returned to `pending` after a transient failure
    pub retried: usize,
    /// Items that ended `failed` after an attempt
    pub failed: usize,
    /// Items that ended `conflict`
    pub conflicts: usize,
    /// Items failed without an attempt (no processor)
    pub rejected: usize,
    /// Items skipped because another claim won
    pub skipped: usize,
    /// Storage errors hit and logged during the pass
    pub storage_errors: usize,
}

/// Summary broadcast after a pass that synced something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Items synced by the pass
    pub synced_count: usize,
    /// Items still pending afterwards
    pub remaining_pending: i64,
}

/// One item that needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemNotice {
    /// Queue id
    pub id: i64,
    /// Entity type tag
    pub entity_type: String,
    /// Stored diagnostic
    pub message: String,
}

/// Notification published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A pass finished with at least one item synced.
    PassCompleted(PassSummary),
    /// An item ended `failed`.
    ItemFailed(ItemNotice),
    /// An item ended `conflict`.
    ItemConflict(ItemNotice),
}

/// Result of [`SyncOrchestrator::trigger_sync_now`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A pass ran to completion.
    Completed(PassReport),
    /// A pass was already running; nothing was started.
    AlreadyRunning,
    /// Offline; nothing was started.
    Offline,
}

/// Held for the duration of a pass; clears the in-progress flag on drop.
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Single-flight sync worker.
pub struct SyncOrchestrator {
    queue: Arc<SyncQueue>,
    registry: Arc<ProcessorRegistry>,
    classifier: Classifier,
    config: OrchestratorConfig,
    connectivity: watch::Receiver<bool>,
    running: AtomicBool,
    wake: Notify,
    events: broadcast::Sender<SyncEvent>,
    stats: watch::Sender<QueueStats>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default classifier.
    #[must_use]
    pub fn new(
        queue: Arc<SyncQueue>,
        registry: Arc<ProcessorRegistry>,
        connectivity: watch::Receiver<bool>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (stats, _) = watch::channel(QueueStats::default());

        Self {
            queue,
            registry,
            classifier: Classifier::new(),
            config,
            connectivity,
            running: AtomicBool::new(false),
            wake: Notify::new(),
            events,
            stats,
        }
    }

    /// Replace the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Queue an item and, when online, wake the run loop.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the item could not be persisted.
    pub fn enqueue(&self, item: &mut QueueItem) -> Result<i64, SyncError> {
        let id = self.queue.enqueue(item)?;
        debug!(id, entity_type = %item.entity_type, priority = item.priority, "Enqueued item");

        self.publish_stats();
        if self.is_online() {
            self.wake.notify_one();
        }
        Ok(id)
    }

    /// Current queue statistics, read live from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        self.queue.stats()
    }

    /// Statistics as last published.
    #[must_use]
    pub fn watch_stats(&self) -> watch::Receiver<QueueStats> {
        self.stats.subscribe()
    }

    /// Subscribe to pass and item notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Check the connectivity signal.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Check if a pass is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run a pass now, unless one is already running or we are offline.
    ///
    /// Never queues a second pass: anything left pending is picked up by the
    /// next tick.
    pub async fn trigger_sync_now(&self) -> TriggerOutcome {
        if !self.is_online() {
            debug!("Offline, skipping sync pass");
            return TriggerOutcome::Offline;
        }

        let Some(_guard) = PassGuard::acquire(&self.running) else {
            debug!("Sync pass already running");
            return TriggerOutcome::AlreadyRunning;
        };

        TriggerOutcome::Completed(self.execute_pass().await)
    }

    /// Main loop: periodic passes while online, an immediate pass on the
    /// offline -> online edge and on every wake from [`Self::enqueue`].
    ///
    /// Items left `syncing` by a previous process are returned to `pending`
    /// before the first pass. Returns when `shutdown` is cancelled; a pass in
    /// progress is finished first.
    ///
    /// # Errors
    ///
    /// Returns an error if in-flight recovery fails.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), SyncError> {
        let recovered = self.queue.recover_in_flight()?;
        if recovered > 0 {
            info!(recovered, "Returned interrupted items to pending");
        }
        self.publish_stats();

        let mut connectivity = self.connectivity.clone();
        let mut was_online = *connectivity.borrow_and_update();
        let mut watching = true;

        let mut ticker = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs(),
            online = was_online,
            "Sync loop started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.trigger_sync_now().await;
                },
                changed = connectivity.changed(), if watching => {
                    if changed.is_err() {
                        warn!("Connectivity signal closed; relying on periodic ticks");
                        watching = false;
                        continue;
                    }
                    let online = *connectivity.borrow_and_update();
                    if online && !was_online {
                        info!("Back online, starting sync pass");
                        self.trigger_sync_now().await;
                    } else if !online && was_online {
                        info!("Went offline");
                    }
                    was_online = online;
                },
                () = self.wake.notified() => {
                    self.trigger_sync_now().await;
                },
            }
        }

        info!("Sync loop stopped");
        Ok(())
    }

    async fn execute_pass(&self) -> PassReport {
        let mut report = PassReport::default();

        match self.queue.list_due() {
            Ok(due) => {
                debug!(due = due.len(), "Starting sync pass");
                for item in due {
                    self.process_item(item, &mut report).await;
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not list due items");
                report.storage_errors += 1;
            },
        }

        let remaining_pending = self.publish_stats().map_or_else(
            || self.stats.borrow().pending,
            |stats| stats.pending,
        );

        if report.synced > 0 {
            self.emit(SyncEvent::PassCompleted(PassSummary {
                synced_count: report.synced,
                remaining_pending,
            }));
        }

        info!(
            attempted = report.attempted,
            synced = report.synced,
            retried = report.retried,
            failed = report.failed + report.rejected,
            conflicts = report.conflicts,
            remaining_pending,
            "Sync pass finished"
        );
        report
    }

    async fn process_item(&self, item: QueueItem, report: &mut PassReport) {
        let Some(id) = item.id else {
            return;
        };

        let Some(processor) = self.registry.get(&item.entity_type) else {
            let message = SyncError::UnregisteredEntity(item.entity_type.clone()).to_string();
            error!(id, entity_type = %item.entity_type, "No processor registered");
            match self.queue.reject(id, &message) {
                Ok(_) => {
                    report.rejected += 1;
                    self.emit(SyncEvent::ItemFailed(ItemNotice {
                        id,
                        entity_type: item.entity_type,
                        message,
                    }));
                },
                Err(e) => {
                    warn!(id, error = %e, "Could not reject item");
                    report.storage_errors += 1;
                },
            }
            return;
        };

        match self.queue.claim(id) {
            Ok(true) => {},
            Ok(false) => {
                debug!(id, "Item claimed elsewhere, skipping");
                report.skipped += 1;
                return;
            },
            Err(e) => {
                warn!(id, error = %e, "Could not claim item");
                report.storage_errors += 1;
                return;
            },
        }

        report.attempted += 1;
        debug!(id, entity_type = %item.entity_type, attempt = item.attempt_count + 1, "Applying item");

        let result = tokio::time::timeout(self.config.apply_timeout, processor.apply(&item))
            .await
            .unwrap_or_else(|_| {
                Err(ApplyError::timeout(format!(
                    "no response within {}s",
                    self.config.apply_timeout.as_secs_f64()
                )))
            });

        let outcome = match result {
            Ok(ack) => {
                debug!(id, remote_id = ?ack.remote_id, "Applied item");
                AttemptOutcome::Applied
            },
            Err(e) => AttemptOutcome::Rejected {
                verdict: self.classifier.classify(&e),
                message: e.to_string(),
            },
        };

        let resolution = resolve(&item, &outcome, &self.config.backoff, self.queue.now());
        if let Err(e) = self.queue.record_outcome(id, &resolution) {
            warn!(id, error = %e, "Could not record outcome; item stays syncing until restart");
            report.storage_errors += 1;
            return;
        }

        let message = resolution.last_error.unwrap_or_default();
        match resolution.status {
            QueueStatus::Synced => report.synced += 1,
            QueueStatus::Pending => {
                warn!(
                    id,
                    attempts = resolution.attempt_count,
                    max_retries = item.max_retries,
                    next_attempt_at = ?resolution.next_attempt_at,
                    error = %message,
                    "Transient failure, will retry"
                );
                report.retried += 1;
            },
            QueueStatus::Failed => {
                warn!(id, attempts = resolution.attempt_count, error = %message, "Item failed");
                report.failed += 1;
                self.emit(SyncEvent::ItemFailed(ItemNotice {
                    id,
                    entity_type: item.entity_type,
                    message,
                }));
            },
            QueueStatus::Conflict => {
                warn!(id, error = %message, "Item conflicts with remote state");
                report.conflicts += 1;
                self.emit(SyncEvent::ItemConflict(ItemNotice {
                    id,
                    entity_type: item.entity_type,
                    message,
                }));
            },
            QueueStatus::Syncing => {},
        }
    }

    fn publish_stats(&self) -> Option<QueueStats> {
        match self.queue.stats() {
            Ok(stats) => {
                self.stats.send_replace(stats.clone());
                Some(stats)
            },
            Err(e) => {
                warn!(error = %e, "Could not refresh queue stats");
                None
            },
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        self.events.send(event).ok();
    }
}
