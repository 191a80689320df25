//! Bulk-import delimited flat files into a MySQL table as idempotent upserts.
use envconfig::Envconfig;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::Connection;

use batch_common::metrics::{serve, setup_metrics_router};
use batch_importer::config::Config;
use batch_importer::error::ImportError;
use batch_importer::worker;

#[tokio::main]
async fn main() -> Result<(), ImportError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await
        .map_err(ImportError::Connectivity)?;
    pool.acquire()
        .await
        .map_err(ImportError::Connectivity)?
        .ping()
        .await
        .map_err(ImportError::Connectivity)?;
    tracing::info!("database connected");

    let bind = config.bind();
    tokio::task::spawn(async move {
        let router = setup_metrics_router();
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    worker::run(&config, pool).await?;

    Ok(())
}
