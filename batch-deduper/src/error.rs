use batch_common::barrier::BarrierError;
use thiserror::Error;

/// Enumeration of fatal errors aborting a deduplication run.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("cannot establish a database connection: {0}")]
    Connectivity(sqlx::Error),
    #[error("failed to scan group keys: {0}")]
    Scan(sqlx::Error),
    #[error(transparent)]
    Barrier(#[from] BarrierError),
    #[error("all dedup workers exited before the key scan was drained")]
    WorkersExited,
}
