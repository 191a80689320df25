use sqlx::MySqlPool;
use thiserror::Error;
use tracing::error;

use crate::statement::Statement;

/// Enumeration of fatal transaction errors. A `Begin` or `Commit` failure
/// means the store itself is unusable; callers terminate the process rather
/// than continue with remaining jobs.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to begin transaction: {0}")]
    Begin(sqlx::Error),
    #[error("failed to commit transaction: {0}")]
    Commit(sqlx::Error),
}

/// Applies one statement per invocation as a single transaction.
///
/// A failed execute is logged and the transaction is still committed: a bad
/// row must not take down the run, and the surrounding pipeline carries on
/// with the next job. Only begin/commit failures surface as errors.
pub struct Sink {
    pool: MySqlPool,
}

impl Sink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn apply(&self, statement: &Statement) -> Result<(), SinkError> {
        let mut tx = self.pool.begin().await.map_err(SinkError::Begin)?;

        if let Err(error) = statement.as_query().execute(&mut *tx).await {
            error!(sql = %statement.sql, %error, "statement failed, continuing with next job");
            metrics::counter!("batch_statements_failed_total").increment(1);
        }

        tx.commit().await.map_err(SinkError::Commit)?;

        Ok(())
    }
}
