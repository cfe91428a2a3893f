//! One sync pass: due entities -> rate-limited fetch -> match -> validate ->
//! persist or alert.
//!
//! Per-entity work fans out over a bounded stream (`buffer_unordered`). The
//! rate limiter is the real backpressure; the pool size only caps how many
//! pipelines wait on it at once. No entity failure aborts a run.

use super::report::{CriticalFailure, EntityOutcome, SyncRunReport};
use super::{Alerting, EntityFeed, LiveStateSource, MarketSource, Storage};
use crate::config::{OrchestratorConfig, SyncConfig};
use crate::error::SyncError;
use crate::matching::{EntityMatcher, MatchResult, TeamRegistry};
use crate::models::{MatchedEntity, TrackedEntity};
use crate::rate_limiter::RateLimiter;
use crate::scheduler::AdaptivePollScheduler;
use crate::validation::{critical_failures, is_displayable, MatchedEntityContext, OddsValidator};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything outside the process the orchestrator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn EntityFeed>,
    pub live: Arc<dyn LiveStateSource>,
    pub market: Arc<dyn MarketSource>,
    pub storage: Arc<dyn Storage>,
    pub alerting: Arc<dyn Alerting>,
}

pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    scheduler: Arc<AdaptivePollScheduler>,
    limiter: Arc<RateLimiter>,
    matcher: EntityMatcher,
    validator: OddsValidator,
    registry: RwLock<Arc<TeamRegistry>>,
    collaborators: Collaborators,
}

impl SyncOrchestrator {
    pub fn new(config: &SyncConfig, registry: TeamRegistry, collaborators: Collaborators) -> Self {
        Self {
            config: config.orchestrator.clone(),
            scheduler: Arc::new(AdaptivePollScheduler::new(config.scheduler.clone())),
            limiter: Arc::new(RateLimiter::new("upstream", &config.rate_limiter)),
            matcher: EntityMatcher::new(),
            validator: OddsValidator::new(config.validation.clone()),
            registry: RwLock::new(Arc::new(registry)),
            collaborators,
        }
    }

    pub fn scheduler(&self) -> &Arc<AdaptivePollScheduler> {
        &self.scheduler
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn registry(&self) -> Arc<TeamRegistry> {
        self.registry.read().clone()
    }

    /// Swap in a freshly loaded registry; runs already in progress keep the
    /// snapshot they started with
    pub fn replace_registry(&self, registry: TeamRegistry) {
        let teams = registry.len();
        *self.registry.write() = Arc::new(registry);
        info!("Team registry replaced ({} teams)", teams);
    }

    /// Pull the entity feed and start tracking anything new
    pub async fn refresh_entities(&self) -> Result<usize, SyncError> {
        let entities = self
            .with_timeout("feed", self.collaborators.feed.list_tracked_entities())
            .await?;
        let listed = entities.len();
        let added = self.scheduler.sync_entities(entities);
        if added > 0 {
            info!("Feed listed {} entities, {} newly tracked", listed, added);
        }
        Ok(added)
    }

    /// Poll every due entity once and report what happened
    pub async fn run_once(&self, now: DateTime<Utc>) -> SyncRunReport {
        let due = self.scheduler.tick(now);
        let mut report = SyncRunReport::new(now, due.len());

        if !due.is_empty() {
            self.scheduler
                .mark_in_flight(due.iter().map(|e| e.external_id.as_str()));
            let registry = self.registry();

            let outcomes: Vec<(String, EntityOutcome)> = stream::iter(due)
                .map(|entity| {
                    let registry = registry.clone();
                    async move {
                        let id = entity.external_id.clone();
                        let outcome = self.process(entity, now, &registry).await;
                        (id, outcome)
                    }
                })
                .buffer_unordered(self.config.worker_pool_size)
                .collect()
                .await;

            for (id, outcome) in outcomes {
                report.record(&id, outcome);
            }
        }

        report.finished_at = Utc::now();
        if report.processed() < report.due {
            warn!(
                "Sync run {}: {} due entities produced no outcome",
                report.run_id,
                report.due - report.processed()
            );
        }
        debug!(
            "Rate limiter '{}': {} granted, {:.1} available",
            self.limiter.name(),
            self.limiter.granted(),
            self.limiter.available()
        );
        if report.due > 0 {
            info!("Sync {}", report.summary());
        } else {
            debug!("Sync {}", report.summary());
        }

        if let Err(e) = self.collaborators.alerting.notify(&report).await {
            warn!("Run report delivery failed: {:#}", e);
        }
        report
    }

    async fn process(
        &self,
        entity: TrackedEntity,
        now: DateTime<Utc>,
        registry: &TeamRegistry,
    ) -> EntityOutcome {
        let id = entity.external_id.clone();

        // Live state
        let state = match self.limited(&id, self.collaborators.live.fetch(&entity)).await {
            Ok(state) => state,
            Err(e) => {
                let source = self.collaborators.live.source_name();
                if e.is_transient() {
                    warn!("{} fetch failed for {}: {}", source, id, e);
                } else {
                    error!("{} fetch failed for {}: {}", source, id, e);
                }
                self.scheduler.record_failure(&id, now);
                return EntityOutcome::Errored(e);
            }
        };

        let updated = self.scheduler.record_poll(&id, now, &state).unwrap_or_else(|| {
            let mut entity = entity;
            entity.apply(&state);
            entity.last_polled_at = Some(now);
            entity
        });

        if let Err(e) = self.collaborators.storage.upsert_entity_state(&updated).await {
            error!("Failed to store state for {}: {:#}", id, e);
            return EntityOutcome::Errored(SyncError::Storage(format!("{:#}", e)));
        }

        // Matching
        let side_a = self.matcher.resolve(&updated.side_a, registry);
        let side_b = self.matcher.resolve(&updated.side_b, registry);
        let (team_a, team_b) = match (&side_a.canonical_team, &side_b.canonical_team) {
            (Some(a), Some(b)) if a != b => (a.clone(), b.clone()),
            (Some(a), Some(_)) => {
                warn!(
                    "{}: both sides ('{}', '{}') resolved to {}",
                    id, updated.side_a, updated.side_b, a
                );
                return EntityOutcome::SkippedUnmatched { ambiguous: true };
            }
            _ => return Self::unmatched(&id, &side_a, &side_b),
        };

        let matched = MatchedEntity {
            entity: updated,
            team_a,
            team_b,
            side_a_record: state.side_a_record,
            side_b_record: state.side_b_record,
            neutral_site: state.neutral_site,
        };

        // Market
        let quote = match self
            .limited(&id, self.collaborators.market.fetch_quote(&matched))
            .await
        {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                debug!("No market open for {}", id);
                return EntityOutcome::Succeeded;
            }
            Err(e) => {
                warn!("Quote fetch failed for {}: {}", id, e);
                return EntityOutcome::Errored(e);
            }
        };

        let head_to_head = match self
            .with_timeout(
                &id,
                self.collaborators
                    .market
                    .head_to_head(&matched.team_a, &matched.team_b),
            )
            .await
        {
            Ok(h2h) => h2h,
            Err(e) => {
                debug!("No head-to-head for {}: {}", id, e);
                None
            }
        };

        // Validation
        let ctx = MatchedEntityContext::from_matched(&matched, head_to_head, now);
        let results = self.validator.validate(&quote, &ctx);

        if !is_displayable(&results) {
            let failure = CriticalFailure {
                entity_id: id.clone(),
                market_id: quote.market_id.clone(),
                team_a: matched.team_a.clone(),
                team_b: matched.team_b.clone(),
                side_a_probability: quote.side_a_probability,
                side_b_probability: quote.side_b_probability,
                failed_rules: critical_failures(&results).into_iter().cloned().collect(),
                detected_at: now,
            };
            error!("{}", failure.to_error());
            if let Err(e) = self.collaborators.alerting.critical_failure(&failure).await {
                warn!("Critical alert delivery failed for {}: {:#}", id, e);
            }
            return EntityOutcome::BlockedByValidation(failure);
        }

        match self
            .collaborators
            .storage
            .upsert_validated_quote(&matched, &quote, &results)
            .await
        {
            Ok(()) => EntityOutcome::Succeeded,
            Err(e) => {
                error!("Failed to store quote {}: {:#}", quote.market_id, e);
                EntityOutcome::Errored(SyncError::Storage(format!("{:#}", e)))
            }
        }
    }

    fn unmatched(id: &str, side_a: &MatchResult, side_b: &MatchResult) -> EntityOutcome {
        let ambiguous = side_a.is_ambiguous() || side_b.is_ambiguous();
        for err in [side_a.to_error(), side_b.to_error()].into_iter().flatten() {
            match err {
                SyncError::AmbiguousMatch { .. } => warn!("Skipping {}: {}", id, err),
                _ => debug!("Skipping {}: {}", id, err),
            }
        }
        EntityOutcome::SkippedUnmatched { ambiguous }
    }

    /// One upstream call: a token first, then the call under the fetch timeout
    async fn limited<T, F>(&self, entity_id: &str, call: F) -> Result<T, SyncError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.limiter.acquire(1).await?;
        self.with_timeout(entity_id, call).await
    }

    async fn with_timeout<T, F>(&self, entity_id: &str, call: F) -> Result<T, SyncError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout, call).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout {
                entity_id: entity_id.to_string(),
                after_ms: self.config.fetch_timeout.as_millis() as u64,
            }),
        }
    }
}
