//! Queue state machine.
//!
//! Pure transition rules and attempt resolution. Nothing here touches the
//! database; the queue calls [`validate`] before every write and the
//! orchestrator calls [`resolve`] to turn an attempt outcome into the next
//! persisted state.
//!
//! ```text
//! pending  -> syncing    claimed by a pass
//! pending  -> failed     rejected before any attempt (no processor)
//! syncing  -> synced     applied
//! syncing  -> pending    transient failure, attempts left
//! syncing  -> failed     permanent failure, or transient with none left
//! syncing  -> conflict   remote holds a colliding record
//! failed   -> pending    explicit re-arm
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::classifier::Verdict;
use super::item::{QueueItem, QueueStatus};
use crate::error::SyncError;

/// Check whether the state machine allows `from -> to`.
#[must_use]
pub const fn can_transition(from: QueueStatus, to: QueueStatus) -> bool {
    use QueueStatus::{Conflict, Failed, Pending, Synced, Syncing};

    matches!(
        (from, to),
        (Pending, Syncing | Failed) | (Syncing, Synced | Pending | Failed | Conflict) | (Failed, Pending)
    )
}

/// Validate a transition for item `id`.
///
/// # Errors
///
/// Returns `SyncError::InvalidTransition` if the move is not allowed.
pub fn validate(id: i64, from: QueueStatus, to: QueueStatus) -> Result<(), SyncError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(SyncError::InvalidTransition { id, from, to })
    }
}

/// Result of one apply attempt, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The remote accepted the write.
    Applied,
    /// The remote refused or could not be reached.
    Rejected {
        /// Classifier verdict for the error.
        verdict: Verdict,
        /// Diagnostic to store as `last_error`.
        message: String,
    },
}

/// The persisted state an attempt leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// New status.
    pub status: QueueStatus,
    /// New attempt count.
    pub attempt_count: u32,
    /// New `last_error`; `None` clears it.
    pub last_error: Option<String>,
    /// New backoff gate.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Exponential backoff between attempts of the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Backoff starting at `base`, doubling per attempt, capped at `max`.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// No delay at all; every retry is due on the next pass.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay after `attempts` failed attempts (`attempts >= 1`).
    #[must_use]
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

/// Decide the next state for an item that was just attempted.
///
/// Every attempt counts, whatever its outcome. A transient failure returns
/// the item to `pending` only while the new count is below `max_retries`;
/// with `max_retries = n` the item fails on the `n`th transient failure.
#[must_use]
pub fn resolve(
    item: &QueueItem,
    outcome: &AttemptOutcome,
    backoff: &Backoff,
    now: DateTime<Utc>,
) -> Resolution {
    let attempt_count = item.attempt_count.saturating_add(1);

    match outcome {
        AttemptOutcome::Applied => Resolution {
            status: QueueStatus::Synced,
            attempt_count,
            last_error: None,
            next_attempt_at: None,
        },
        AttemptOutcome::Rejected { verdict, message } => {
            let (status, next_attempt_at) = match verdict {
                Verdict::Conflict => (QueueStatus::Conflict, None),
                Verdict::Permanent => (QueueStatus::Failed, None),
                Verdict::Transient if attempt_count >= item.max_retries => {
                    (QueueStatus::Failed, None)
                },
                Verdict::Transient => {
                    let gate = chrono::Duration::from_std(backoff.delay(attempt_count))
                        .ok()
                        .and_then(|d| now.checked_add_signed(d))
                        .unwrap_or(now);
                    (QueueStatus::Pending, Some(gate))
                },
            };

            Resolution {
                status,
                attempt_count,
                last_error: Some(message.clone()),
                next_attempt_at,
            }
        },
    }
}
