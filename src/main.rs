//! Council execution backend.
//!
//! Boots configuration, the venue exchange clients, persistence, and the
//! Trading Router, then idles processing whatever entry point (cron tick,
//! external API call, test harness) hands it a council decision.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use council_exec_backend::config::Config;
use council_exec_backend::events::EventBroadcaster;
use council_exec_backend::exchange::binance::BinanceClient;
use council_exec_backend::exchange::ExchangeClient;
use council_exec_backend::router::TradingRouter;
use council_exec_backend::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    info!(database_path = %config.database_path, "starting council execution backend");

    let store = Store::open(&config.database_path).context("opening store")?;
    store.migrate().await.context("running schema migration")?;

    let paper_client: Arc<dyn ExchangeClient> = Arc::new(
        BinanceClient::new(&config.binance_paper, config.requests_per_minute, config.orders_per_10_seconds, config.orders_per_day)
            .context("constructing paper exchange client")?,
    );
    let real_client: Arc<dyn ExchangeClient> = Arc::new(
        BinanceClient::new(&config.binance_real, config.requests_per_minute, config.orders_per_10_seconds, config.orders_per_day)
            .context("constructing real exchange client")?,
    );

    let events = Arc::new(EventBroadcaster::new(256));
    let _router = TradingRouter::new(store, events, paper_client, real_client);

    info!("council execution backend ready");

    // Decision ingestion (cron schedule, inbound API call, or message queue
    // consumer) is out of scope for this crate; it hands decisions to
    // `AgentAdapter::dispatch`, which calls into `_router` above.
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "council_exec_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
