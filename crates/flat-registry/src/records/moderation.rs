use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn, Instrument};

use super::domain::{Flat, FlatId, FlatStatus, TargetStatus, ValidationError};
use super::repository::{FlatRepository, StatusGuard, StatusWrite, StorageError};

/// Cancellation scope of one inbound request.
///
/// Clones share the cancel flag, so the transport layer can keep one handle
/// and pass another into the service.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::default(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Guard that cancels this context when dropped.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            ctx: self.clone(),
        }
    }

    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct CancelOnDrop {
    ctx: RequestContext,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::Cancelled => f.write_str("request cancelled"),
            Interruption::DeadlineExceeded => f.write_str("request deadline exceeded"),
        }
    }
}

/// Why a held moderation lock had to be rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompensationTrigger {
    #[error("status update failed: {0}")]
    UpdateFailed(StorageError),
    #[error("{0} before the status update was issued")]
    Interrupted(Interruption),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModerationError {
    #[error("flat {0} not found")]
    NotFound(FlatId),
    #[error("flat {0} is already on moderation")]
    AlreadyModerating(FlatId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(StorageError),
    #[error("{reason} while moderating flat {flat_id}")]
    Cancelled {
        flat_id: FlatId,
        reason: Interruption,
        cause: Option<StorageError>,
    },
    #[error("moderation of flat {flat_id} aborted, status must be checked: {reason}")]
    Aborted { flat_id: FlatId, reason: String },
    #[error("moderation lock on flat {flat_id} was overwritten, status is now '{current}'")]
    LockLost { flat_id: FlatId, current: FlatStatus },
    #[error(
        "flat {flat_id} may be stuck in moderation: {trigger}; rollback to '{rollback_target}' failed: {rollback}"
    )]
    CompensationFailure {
        flat_id: FlatId,
        rollback_target: FlatStatus,
        trigger: CompensationTrigger,
        rollback: StorageError,
    },
}

impl ModerationError {
    /// True when a flat may have been left in `moderating` and needs an operator.
    pub fn is_integrity_alarm(&self) -> bool {
        matches!(
            self,
            ModerationError::CompensationFailure { .. }
                | ModerationError::LockLost { .. }
                | ModerationError::Aborted { .. }
        )
    }
}

/// Lock held on a flat between the tentative `moderating` write and the
/// final status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModerationLock {
    flat_id: FlatId,
    rollback_target: FlatStatus,
}

/// Drives flat status transitions through the storage-level moderation lock.
#[derive(Clone)]
pub struct ModerationCoordinator {
    flats: Arc<dyn FlatRepository>,
}

impl ModerationCoordinator {
    pub fn new(flats: Arc<dyn FlatRepository>) -> Self {
        Self { flats }
    }

    /// Moves `flat_id` to `target`.
    ///
    /// Once the lock write is issued the protocol runs to completion on its
    /// own task, even if the caller's future is dropped, so every lock is
    /// either converted into the target status or rolled back.
    pub async fn transition(
        &self,
        ctx: &RequestContext,
        flat_id: FlatId,
        target: FlatStatus,
    ) -> Result<Flat, ModerationError> {
        let target = TargetStatus::new(target)?;

        if let Some(reason) = ctx.interruption() {
            return Err(ModerationError::Cancelled {
                flat_id,
                reason,
                cause: None,
            });
        }

        let flats = Arc::clone(&self.flats);
        let ctx = ctx.clone();
        let span = info_span!("flat_transition", flat_id = %flat_id, target = %target.status());
        let task = tokio::spawn(
            async move { run_transition(flats.as_ref(), &ctx, flat_id, target).await }
                .instrument(span),
        );

        match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    flat_id = %flat_id,
                    alert = "data_integrity",
                    error = %err,
                    "moderation task aborted, flat status must be checked"
                );
                Err(ModerationError::Aborted {
                    flat_id,
                    reason: err.to_string(),
                })
            }
        }
    }
}

async fn run_transition(
    flats: &dyn FlatRepository,
    ctx: &RequestContext,
    flat_id: FlatId,
    target: TargetStatus,
) -> Result<Flat, ModerationError> {
    let lock = acquire(flats, flat_id).await?;
    info!(previous = %lock.rollback_target, "moderation lock acquired");

    if let Some(reason) = ctx.interruption() {
        compensate(flats, lock, CompensationTrigger::Interrupted(reason)).await?;
        return Err(ModerationError::Cancelled {
            flat_id,
            reason,
            cause: None,
        });
    }

    let update = flats
        .write_status(
            flat_id,
            StatusGuard::Is(FlatStatus::Moderating),
            target.status(),
        )
        .await;

    match update {
        Ok(StatusWrite::Applied { flat, .. }) => {
            info!(status = %flat.status, "flat status updated");
            Ok(flat)
        }
        Ok(StatusWrite::Rejected { current }) => {
            error!(
                current = %current,
                alert = "data_integrity",
                "moderation lock was overwritten by another writer"
            );
            Err(ModerationError::LockLost { flat_id, current })
        }
        Err(update_err) => {
            warn!(error = %update_err, "status update failed, rolling back");
            compensate(
                flats,
                lock,
                CompensationTrigger::UpdateFailed(update_err.clone()),
            )
            .await?;

            if let Some(reason) = ctx.interruption() {
                return Err(ModerationError::Cancelled {
                    flat_id,
                    reason,
                    cause: Some(update_err),
                });
            }

            Err(match update_err {
                StorageError::FlatNotFound(id) => ModerationError::NotFound(id),
                other => ModerationError::Storage(other),
            })
        }
    }
}

/// Writes `moderating` only if the flat is not already in it, keeping the
/// prior status as the rollback target.
async fn acquire(
    flats: &dyn FlatRepository,
    flat_id: FlatId,
) -> Result<ModerationLock, ModerationError> {
    let write = flats
        .write_status(
            flat_id,
            StatusGuard::Not(FlatStatus::Moderating),
            FlatStatus::Moderating,
        )
        .await;

    match write {
        Ok(StatusWrite::Applied { previous, .. }) => Ok(ModerationLock {
            flat_id,
            rollback_target: previous,
        }),
        Ok(StatusWrite::Rejected { .. }) => {
            info!("flat is already on moderation");
            Err(ModerationError::AlreadyModerating(flat_id))
        }
        Err(StorageError::FlatNotFound(id)) => Err(ModerationError::NotFound(id)),
        Err(err) => {
            warn!(error = %err, "failed to acquire moderation lock");
            Err(ModerationError::Storage(err))
        }
    }
}

/// Restores the rollback target over `moderating`. Runs regardless of the
/// request context and is never retried.
async fn compensate(
    flats: &dyn FlatRepository,
    lock: ModerationLock,
    trigger: CompensationTrigger,
) -> Result<(), ModerationError> {
    let rollback = flats
        .write_status(
            lock.flat_id,
            StatusGuard::Is(FlatStatus::Moderating),
            lock.rollback_target,
        )
        .await;

    match rollback {
        Ok(StatusWrite::Applied { .. }) => {
            info!(restored = %lock.rollback_target, "moderation lock rolled back");
            Ok(())
        }
        Ok(StatusWrite::Rejected { current }) => {
            warn!(current = %current, "moderation lock already released by another writer");
            Ok(())
        }
        // Nothing is left to be stuck.
        Err(StorageError::FlatNotFound(_)) => Ok(()),
        Err(rollback) => {
            error!(
                alert = "data_integrity",
                rollback_target = %lock.rollback_target,
                trigger = %trigger,
                error = %rollback,
                "rollback failed, flat may be stuck in moderation"
            );
            Err(ModerationError::CompensationFailure {
                flat_id: lock.flat_id,
                rollback_target: lock.rollback_target,
                trigger,
                rollback,
            })
        }
    }
}
