use std::sync::Arc;

use futures::TryStreamExt;
use sqlx::MySqlPool;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use batch_common::barrier::{CompletionBarrier, CompletionHandle};
use batch_common::sink::Sink;
use batch_common::statement::{SqlValue, Statement};

use crate::config::Config;
use crate::error::DedupError;

/// Groups of this size or smaller hold no duplicates and are not scanned.
const MIN_GROUP_SIZE: i64 = 1;

/// The column values uniquely identifying one physical row to remove.
/// Immutable once built; compared by full value equality so consecutive
/// identical tokens can be collapsed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DeleteToken {
    #[sqlx(rename = "primaryid")]
    pub primary_id: i64,
    #[sqlx(rename = "caseid")]
    pub case_id: i64,
    #[sqlx(rename = "caseversion")]
    pub case_version: i32,
    #[sqlx(rename = "effective_dt")]
    pub effective_date: String,
}

impl DeleteToken {
    /// Build the single-row delete for this token.
    pub fn delete_statement(&self, table: &str) -> Statement {
        Statement::new(
            format!(
                "DELETE FROM `{table}` WHERE primaryid = ? AND caseid = ? \
                 AND caseversion = ? AND effective_dt = ?"
            ),
            vec![
                SqlValue::Integer(self.primary_id),
                SqlValue::Integer(self.case_id),
                SqlValue::Integer(i64::from(self.case_version)),
                SqlValue::Text(self.effective_date.clone()),
            ],
        )
    }
}

/// Decide which rows of one group get deleted.
///
/// `rows` arrive in secondary order (effective date descending, then row id
/// descending), so the first row is the authoritative version and is always
/// retained. Every later row becomes a delete candidate unless its token
/// equals the immediately previously emitted one: consecutive identical
/// tokens collapse to a single delete.
///
/// The comparison window is deliberately only the previous emitted token. An
/// identical token reappearing non-adjacently is emitted again; with a strict
/// secondary order that cannot happen, but it is not enforced here.
pub fn plan_deletions(rows: Vec<DeleteToken>) -> Vec<DeleteToken> {
    let mut planned: Vec<DeleteToken> = Vec::new();
    for token in rows.into_iter().skip(1) {
        if planned.last() == Some(&token) {
            continue;
        }
        planned.push(token);
    }
    planned
}

/// Run the deduplication pipeline: scan group keys with more than one row,
/// fan them out to the worker pool, and funnel every planned delete through
/// the single dedicated writer so deletions are applied serially.
pub async fn run(config: &Config, pool: MySqlPool) -> Result<(), DedupError> {
    let (job_tx, job_rx) = mpsc::channel::<i64>(config.worker_count + 1);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (delete_tx, delete_rx) = mpsc::channel::<DeleteToken>(1);
    // One signal per worker plus one for the writer.
    let (barrier, done) = CompletionBarrier::new(config.worker_count + 1);

    tokio::spawn(delete_writer(
        Sink::new(pool.clone()),
        config.table_name.clone(),
        delete_rx,
        done.clone(),
    ));
    for id in 1..=config.worker_count {
        tokio::spawn(dedup_worker(
            id,
            pool.clone(),
            config.table_name.clone(),
            Arc::clone(&job_rx),
            delete_tx.clone(),
            done.clone(),
        ));
    }
    drop(delete_tx);
    drop(done);

    let scan = format!(
        "SELECT caseid FROM `{}` GROUP BY caseid HAVING COUNT(*) > ? ORDER BY caseid ASC",
        config.table_name
    );
    let mut keys = sqlx::query_scalar::<_, i64>(&scan)
        .bind(MIN_GROUP_SIZE)
        .fetch(&pool);

    let mut groups = 0u64;
    while let Some(case_id) = keys.try_next().await.map_err(DedupError::Scan)? {
        if job_tx.send(case_id).await.is_err() {
            return Err(DedupError::WorkersExited);
        }
        groups += 1;
    }
    drop(job_tx);

    barrier.wait().await?;
    info!(groups, "deduplication finished");

    Ok(())
}

/// One pool worker: fetch the rows of each claimed group in secondary order,
/// plan the deletions, and forward them to the writer. The delete queue is
/// bounded, so a slow writer backpressures the workers.
async fn dedup_worker(
    id: usize,
    pool: MySqlPool,
    table: String,
    jobs: Arc<Mutex<mpsc::Receiver<i64>>>,
    deletes: mpsc::Sender<DeleteToken>,
    done: CompletionHandle,
) {
    info!(worker = id, "worker started");

    loop {
        let case_id = { jobs.lock().await.recv().await };
        let Some(case_id) = case_id else {
            break;
        };

        debug!(worker = id, case_id, "processing group");
        metrics::counter!("dedup_groups_total").increment(1);

        let rows = match fetch_group(&pool, &table, case_id).await {
            Ok(rows) => rows,
            Err(error) => {
                error!(worker = id, case_id, %error, "failed to fetch group rows, aborting");
                std::process::exit(1);
            }
        };

        for token in plan_deletions(rows) {
            if deletes.send(token).await.is_err() {
                error!(worker = id, "delete writer is gone, aborting");
                std::process::exit(1);
            }
        }
    }

    drop(deletes);
    done.signal().await;
}

async fn fetch_group(
    pool: &MySqlPool,
    table: &str,
    case_id: i64,
) -> Result<Vec<DeleteToken>, sqlx::Error> {
    let sql = format!(
        "SELECT primaryid, caseid, caseversion, effective_dt FROM `{table}` \
         WHERE caseid = ? ORDER BY effective_dt DESC, primaryid DESC"
    );
    sqlx::query_as::<_, DeleteToken>(&sql)
        .bind(case_id)
        .fetch_all(pool)
        .await
}

/// The single dedicated writer. All delete tokens pass through here, so rows
/// are removed in exactly the order the workers emitted them.
async fn delete_writer(
    sink: Sink,
    table: String,
    mut deletes: mpsc::Receiver<DeleteToken>,
    done: CompletionHandle,
) {
    info!("delete writer started");

    while let Some(token) = deletes.recv().await {
        if let Err(error) = sink.apply(&token.delete_statement(&table)).await {
            error!(%error, "transaction failed, aborting");
            std::process::exit(1);
        }
        metrics::counter!("dedup_rows_deleted_total").increment(1);
    }

    done.signal().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(primary_id: i64, effective_date: &str) -> DeleteToken {
        DeleteToken {
            primary_id,
            case_id: 100,
            case_version: 1,
            effective_date: effective_date.to_owned(),
        }
    }

    #[test]
    fn test_winner_is_never_planned() {
        assert!(plan_deletions(vec![token(5, "20230103")]).is_empty());
        assert!(plan_deletions(Vec::new()).is_empty());
    }

    #[test]
    fn test_consecutive_identical_tokens_collapse() {
        let rows = vec![
            token(5, "20230103"),
            token(4, "20230102"),
            token(4, "20230102"),
            token(3, "20230101"),
        ];

        let planned = plan_deletions(rows);

        assert_eq!(planned, vec![token(4, "20230102"), token(3, "20230101")]);
    }

    #[test]
    fn test_non_adjacent_repeat_is_planned_again() {
        // The window is only the previous emitted token, so a repeat further
        // back is treated as a new candidate. Pinned down on purpose.
        let rows = vec![
            token(5, "20230103"),
            token(4, "20230102"),
            token(3, "20230101"),
            token(4, "20230102"),
        ];

        let planned = plan_deletions(rows);

        assert_eq!(
            planned,
            vec![
                token(4, "20230102"),
                token(3, "20230101"),
                token(4, "20230102"),
            ]
        );
    }

    #[test]
    fn test_all_duplicates_of_winner_are_planned_once() {
        let rows = vec![
            token(7, "20230104"),
            token(7, "20230104"),
            token(7, "20230104"),
        ];

        assert_eq!(plan_deletions(rows), vec![token(7, "20230104")]);
    }

    #[test]
    fn test_delete_statement_shape() {
        let statement = token(9, "20230105").delete_statement("demo");

        assert_eq!(
            statement.sql,
            "DELETE FROM `demo` WHERE primaryid = ? AND caseid = ? \
             AND caseversion = ? AND effective_dt = ?"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::Integer(9),
                SqlValue::Integer(100),
                SqlValue::Integer(1),
                SqlValue::Text("20230105".to_owned()),
            ]
        );
    }
}
