//! Worker entry point: loads configuration, opens shared resources, and
//! runs the RabbitMQ consumer loop until the process is signalled to stop.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use pagescan_worker::asn::{AsnResolver, MaxMindAsnResolver, NullAsnResolver};
use pagescan_worker::browser_profile::cleanup_stale_scan_profiles;
use pagescan_worker::config::Config;
use pagescan_worker::content_store::MongoRedisContentStore;
use pagescan_worker::emulation::EmulationRegistry;
use pagescan_worker::hasher::Hasher;
use pagescan_worker::scan_orchestrator::SharedResources;
use pagescan_worker::utils::constants::DEFAULT_HASHER_POOL_SIZE;
use pagescan_worker::consumer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("PAGESCAN_CONFIG").unwrap_or_else(|_| "config/worker.yaml".to_string());
    let config = Config::load(&config_path).with_context(|| format!("failed to load config from {config_path}"))?;

    match cleanup_stale_scan_profiles() {
        Ok(count) if count > 0 => tracing::info!(count, "removed stale scan profile directories at startup"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to clean stale scan profiles"),
    }

    let emulation = EmulationRegistry::load(&config.emulation.emulation_config)
        .with_context(|| format!("failed to load emulation devices from {}", config.emulation.emulation_config))?;

    let asn_resolver: Arc<dyn AsnResolver> = match MaxMindAsnResolver::open(&config.maxminddb.asn_database_path) {
        Ok(resolver) => resolver.shared(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to open ASN database; ASN lookups disabled");
            Arc::new(NullAsnResolver)
        }
    };

    let hasher = Hasher::spawn(DEFAULT_HASHER_POOL_SIZE);
    let content_store = Arc::new(
        MongoRedisContentStore::connect(&config)
            .await
            .context("failed to connect to mongodb/redis")?,
    );

    let shared = SharedResources {
        hasher,
        asn_resolver,
        emulation: Arc::new(emulation),
        content_store,
        browser: Arc::new(config.browser.clone()),
    };

    consumer::run(&config.rabbitmq, config.browser.max_tabs, shared).await
}
