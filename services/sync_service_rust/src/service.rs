//! Long-running loops around a `SyncOrchestrator`.
//!
//! - Tick loop: one sync pass per tick, then prune finished entities
//! - Feed loop: re-list the scoreboard to pick up new events
//! - Reload loop: SIGHUP re-reads the team registry without a restart

use crate::config::ServiceConfig;
use anyhow::Result;
use chrono::Utc;
use livesync_core::matching::{load_registry, TeamRegistrySource};
use livesync_core::{SyncOrchestrator, SyncRunReport};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct SyncService {
    config: ServiceConfig,
    orchestrator: Arc<SyncOrchestrator>,
    registry_source: Arc<dyn TeamRegistrySource>,
}

impl SyncService {
    pub fn new(
        config: ServiceConfig,
        orchestrator: Arc<SyncOrchestrator>,
        registry_source: Arc<dyn TeamRegistrySource>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            registry_source,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// One pass plus housekeeping
    pub async fn tick(&self) -> SyncRunReport {
        let now = Utc::now();
        let report = self.orchestrator.run_once(now).await;
        self.orchestrator
            .scheduler()
            .prune_finished(now, self.config.retention);
        report
    }

    /// Re-list the feed; failures are logged and retried next interval
    pub async fn refresh(&self) -> usize {
        match self.orchestrator.refresh_entities().await {
            Ok(added) => added,
            Err(e) => {
                warn!("Entity feed refresh failed: {}", e);
                0
            }
        }
    }

    /// Re-read the registry. A bad file keeps the current registry in place.
    pub async fn reload_registry(&self) -> bool {
        match load_registry(self.registry_source.as_ref()).await {
            Ok(registry) => {
                self.orchestrator.replace_registry(registry);
                true
            }
            Err(e) => {
                error!("Registry reload rejected, keeping current registry: {}", e);
                false
            }
        }
    }

    /// Run every loop until Ctrl-C
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            "Sync service started: sports={:?}, tick={:?}, feed refresh={:?}",
            self.config.sports, self.config.tick_interval, self.config.feed_refresh_interval
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // 1. Feed refresh
        let svc = self.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                svc.refresh().await;
                tokio::time::sleep(svc.config.feed_refresh_interval).await;
            }
        }));

        // 2. Sync ticks
        let svc = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(svc.config.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                svc.tick().await;
            }
        }));

        // 3. Registry reload
        #[cfg(unix)]
        {
            let svc = self.clone();
            tasks.push(tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                let mut hangup = match signal(SignalKind::hangup()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("Unable to listen for SIGHUP: {}", e);
                        return;
                    }
                };
                while hangup.recv().await.is_some() {
                    info!("SIGHUP received, reloading team registry");
                    svc.reload_registry().await;
                }
            }));
        }

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}
