//! Remove duplicate rows per logical group, keeping the most recent version.
use envconfig::Envconfig;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::Connection;

use batch_common::metrics::{serve, setup_metrics_router};
use batch_deduper::config::Config;
use batch_deduper::dedup;
use batch_deduper::error::DedupError;

#[tokio::main]
async fn main() -> Result<(), DedupError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await
        .map_err(DedupError::Connectivity)?;
    pool.acquire()
        .await
        .map_err(DedupError::Connectivity)?
        .ping()
        .await
        .map_err(DedupError::Connectivity)?;
    tracing::info!("database connected");

    let bind = config.bind();
    tokio::task::spawn(async move {
        let router = setup_metrics_router();
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    dedup::run(&config, pool).await?;

    Ok(())
}
