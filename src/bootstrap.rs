use std::{str::FromStr, sync::Arc, time::Duration};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use tracing::info;
use crate::{
    adapters::{NodeWalletSubmitter, SourceNodeClient},
    config::Config,
    error::AppResult,
    ledger::LedgerRepository,
    settlement::{FaultRecorder, PayoutTerms, ScanConfig, Scanner, SettlementEngine, TransactionFilter},
};

/// Wire the gateway components and restore the durable cursor
pub async fn initialize_scanner(config: &Config) -> AppResult<Scanner> {
    info!("Initializing gateway components ...");

    let pool = initialize_database(&config.database_url).await?;
    let ledger = Arc::new(LedgerRepository::new(pool));

    let source = Arc::new(SourceNodeClient::new(&config.source.node)?);
    info!("✅ Source node client ready: {} ({})", config.source.network, config.source.node);

    let submitter = Arc::new(NodeWalletSubmitter::new(&config.destination)?);
    info!(
        "✅ Destination submitter ready: {} ({})",
        config.destination.network, config.destination.node
    );

    let faults = Arc::new(FaultRecorder::new(ledger.clone(), config.source.decimals));
    let filter = TransactionFilter::new(&config.source, ledger.clone(), faults.clone());
    let engine = SettlementEngine::new(
        submitter,
        ledger.clone(),
        faults,
        PayoutTerms::from_config(config),
    );

    let cursor = ledger
        .seed_height(&config.source.network, config.source.start_height)
        .await?;
    info!("📍 {} cursor at height {}", config.source.network, cursor);
    info!(
        "📒 Ledger holds {} executed transfers and {} faults",
        ledger.count_executed().await?,
        ledger.count_errors().await?
    );

    Ok(Scanner::new(
        source,
        filter,
        engine,
        ledger,
        ScanConfig {
            chain: config.source.network.clone(),
            confirmations: config.source.confirmations,
            poll_interval: Duration::from_secs(config.destination.poll_interval_secs),
        },
        cursor,
    ))
}

pub async fn initialize_database(database_url: &str) -> AppResult<SqlitePool> {
    info!("📊 Opening ledger database...");

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // One writer; the scan loop is sequential
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
