mod error;
mod adapters;
mod ledger;
mod settlement;
mod bootstrap;
mod config;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing::info;

use crate::config::Config;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,gateway=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting settlement gateway");

    let config = Config::from_env()?;
    info!(
        "Bridging {} on {} to {} on {}",
        config.source.asset_id,
        config.source.network,
        config.destination.asset_id,
        config.destination.network
    );

    let scanner = bootstrap::initialize_scanner(&config).await?;
    scanner.run().await;

    Ok(())
}
