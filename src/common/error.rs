use thiserror::Error;

use crate::common::config::TransactionId;

/// Taxonomy of the errors this crate's storage and concurrency core can
/// raise. Buffer-pool soft failures (all frames pinned) are represented as
/// `Option`/`bool` at the call site rather than here, matching the teacher's
/// existing API shape; this enum only covers the typed aborts the lock
/// manager raises and the fatal I/O condition the disk manager can hit.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("transaction {0} attempted to acquire a lock while in the shrinking phase")]
    LockOnShrinking(TransactionId),

    #[error("transaction {0} attempted to acquire a shared lock under read-uncommitted isolation")]
    LockSharedOnReadUncommitted(TransactionId),

    #[error("transaction {0} conflicts with an upgrade already in flight on this resource")]
    UpgradeConflict(TransactionId),

    #[error("transaction {0} was wounded while waiting and must abort (deadlock prevention)")]
    Deadlock(TransactionId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;
