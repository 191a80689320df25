use std::sync::Arc;

use sqlx::MySqlPool;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use batch_common::barrier::{CompletionBarrier, CompletionHandle};
use batch_common::schema::TableSchema;
use batch_common::sink::Sink;

use crate::config::Config;
use crate::error::ImportError;

/// Fixed field separator of the input format, for the header and data lines.
pub const FIELD_SEPARATOR: char = '$';

/// Run the import pipeline: read the header to fix the active column list,
/// then stream data lines through a bounded queue into the worker pool.
///
/// Returns once the barrier confirms every worker has drained the queue and
/// finished its in-flight statement.
pub async fn run(config: &Config, pool: MySqlPool) -> Result<(), ImportError> {
    let mut schema = TableSchema::load(&pool, &config.table_name).await?;

    let file = File::open(&config.data_file)
        .await
        .map_err(ImportError::Scan)?;
    let mut lines = BufReader::new(file).lines();

    let Some(header) = lines.next_line().await.map_err(ImportError::Scan)? else {
        info!(file = %config.data_file, "input file is empty, nothing to import");
        return Ok(());
    };
    let header_tokens: Vec<&str> = header.split(FIELD_SEPARATOR).collect();
    schema.set_active_columns(&header_tokens)?;
    info!(
        table = %config.table_name,
        columns = schema.active_columns().len(),
        "active column list set from header"
    );
    let schema = Arc::new(schema);

    let (job_tx, job_rx) = mpsc::channel::<String>(config.worker_count + 1);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (barrier, done) = CompletionBarrier::new(config.worker_count);

    for id in 1..=config.worker_count {
        tokio::spawn(import_worker(
            id,
            Arc::clone(&schema),
            Arc::clone(&job_rx),
            Sink::new(pool.clone()),
            done.clone(),
        ));
    }
    drop(done);

    let mut sent = 0u64;
    while let Some(line) = lines.next_line().await.map_err(ImportError::Scan)? {
        if job_tx.send(line).await.is_err() {
            return Err(ImportError::WorkersExited);
        }
        sent += 1;
    }
    drop(job_tx);

    barrier.wait().await?;
    info!(rows = sent, "import finished");

    Ok(())
}

/// One pool worker: pull a raw line, generate the upsert, apply it through
/// this worker's sink. Terminates when the queue is closed and drained.
async fn import_worker(
    id: usize,
    schema: Arc<TableSchema>,
    jobs: Arc<Mutex<mpsc::Receiver<String>>>,
    sink: Sink,
    done: CompletionHandle,
) {
    info!(worker = id, "worker started");

    loop {
        // Lock the shared receiver for one hand-off only.
        let line = { jobs.lock().await.recv().await };
        let Some(line) = line else {
            break;
        };

        let tokens: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        let statement = match schema.upsert_statement(&tokens) {
            Ok(statement) => statement,
            Err(error) => {
                warn!(worker = id, %error, "skipping malformed line");
                metrics::counter!("import_lines_skipped_total").increment(1);
                continue;
            }
        };

        if let Err(error) = sink.apply(&statement).await {
            error!(worker = id, %error, "transaction failed, aborting");
            std::process::exit(1);
        }
        metrics::counter!("import_rows_total").increment(1);
    }

    done.signal().await;
}
