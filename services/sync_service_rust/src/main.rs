use anyhow::{Context, Result};
use dotenv::dotenv;
use livesync_core::alerts::{CriticalAlertClient, CriticalAlertConfig};
use livesync_core::circuit_breaker::ApiCircuitBreakerConfig;
use livesync_core::clients::espn::{EspnClient, DEFAULT_ESPN_BASE_URL};
use livesync_core::db::{create_pool, DbPoolConfig, PgStorage, TracingStorage};
use livesync_core::matching::{load_registry, JsonFileRegistry, TeamRegistrySource};
use livesync_core::sync::Storage;
use livesync_core::{Collaborators, SyncConfig, SyncOrchestrator};
use std::sync::Arc;
use sync_service_rust::{ServiceConfig, SyncService};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting sync_service_rust...");

    // Any configuration problem stops the process before a single poll
    let sync_config = SyncConfig::from_env().context("Invalid engine configuration")?;
    let service_config = ServiceConfig::from_env().context("Invalid service configuration")?;

    let registry_source: Arc<dyn TeamRegistrySource> =
        Arc::new(JsonFileRegistry::new(service_config.team_registry_path.clone()));
    let registry = load_registry(registry_source.as_ref())
        .await
        .context("Failed to load team registry")?;
    info!("Team registry ready ({} teams)", registry.len());

    let espn_base_url =
        std::env::var("ESPN_BASE_URL").unwrap_or_else(|_| DEFAULT_ESPN_BASE_URL.to_string());
    let breaker = ApiCircuitBreakerConfig::from_env()?;
    let espn = Arc::new(EspnClient::with_config(
        service_config.sports.clone(),
        &espn_base_url,
        breaker,
    ));

    let storage: Arc<dyn Storage> = match &service_config.database_url {
        Some(url) => {
            let pool = create_pool(url, &DbPoolConfig::from_env()?).await?;
            let storage = PgStorage::new(pool);
            storage.ensure_schema().await?;
            Arc::new(storage)
        }
        None => {
            warn!("DATABASE_URL not set, running in dry-run mode (nothing is persisted)");
            Arc::new(TracingStorage)
        }
    };

    let alerting = Arc::new(CriticalAlertClient::new(CriticalAlertConfig::from_env()?));

    let collaborators = Collaborators {
        feed: espn.clone(),
        live: espn.clone(),
        market: espn,
        storage,
        alerting,
    };
    let orchestrator = Arc::new(SyncOrchestrator::new(&sync_config, registry, collaborators));

    let service = Arc::new(SyncService::new(service_config, orchestrator, registry_source));
    service.run().await
}
