use batch_common::barrier::BarrierError;
use batch_common::schema::SchemaError;
use thiserror::Error;

/// Enumeration of fatal errors aborting an import run. Malformed lines and
/// failed statements are handled where they occur and never surface here.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("cannot establish a database connection: {0}")]
    Connectivity(sqlx::Error),
    #[error("failed to read input data: {0}")]
    Scan(std::io::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Barrier(#[from] BarrierError),
    #[error("all import workers exited before the input was drained")]
    WorkersExited,
}
