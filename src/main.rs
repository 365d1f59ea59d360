use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use catalogproxy::adapters::{serve, HyperCatalogAdapter, ReqwestHttpClient};
use catalogproxy::config::{AppConfig, Opts};
use catalogproxy::domain::CatalogService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Opts::parse();
    let config = AppConfig::load(opts.config.as_deref())?.with_overrides(&opts);
    config.validate()?;

    // Every inbound request may open one socket per route.
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("Open file limit set to {}", limit),
        Err(e) => warn!("Could not raise open file limit: {}", e),
    }

    let relays = config.relay_routes()?;
    info!(
        strategy = %config.fetch.strategy,
        relays = relays.len(),
        mock_mode = config.mock_mode,
        catalog = %config.catalog_base_url,
        "Starting catalogproxy {}",
        env!("CATALOGPROXY_VERSION")
    );

    let http_client = Arc::new(ReqwestHttpClient::new()?);
    let service = CatalogService::new(http_client, relays, config.endpoints()?, config.fetch.clone())
        .with_mock_mode(config.mock_mode);
    let adapter = Arc::new(HyperCatalogAdapter::new(Arc::new(service)));

    let listener = TcpListener::bind(&opts.bind).await?;
    info!("Listening on: {}", listener.local_addr()?);

    tokio::select! {
        _ = serve(listener, adapter) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
