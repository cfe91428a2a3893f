//! Collaborator traits and the orchestrator that drives them.
//!
//! The engine never talks to a network or database directly; everything
//! outside the process is reached through the traits below so that the
//! service can plug in ESPN, Postgres and webhooks while tests plug in
//! in-memory fakes.

pub mod orchestrator;
pub mod report;

pub use orchestrator::SyncOrchestrator;
pub use report::{CriticalFailure, EntityError, EntityOutcome, SyncRunReport};

use crate::models::{MatchedEntity, OddsQuote, RawEventState, TrackedEntity};
use crate::validation::{HeadToHead, ValidationResult};
use anyhow::Result;
use async_trait::async_trait;

/// Lists the entities inside the tracking window
#[async_trait]
pub trait EntityFeed: Send + Sync {
    async fn list_tracked_entities(&self) -> Result<Vec<TrackedEntity>>;
}

/// Current state of one live event
#[async_trait]
pub trait LiveStateSource: Send + Sync {
    async fn fetch(&self, entity: &TrackedEntity) -> Result<RawEventState>;

    fn source_name(&self) -> &str {
        "live"
    }
}

/// Market prices for a matched entity
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// `None` when no market is open for this entity
    async fn fetch_quote(&self, matched: &MatchedEntity) -> Result<Option<OddsQuote>>;

    /// Prior meetings of the two canonical teams, side A first
    async fn head_to_head(&self, _team_a: &str, _team_b: &str) -> Result<Option<HeadToHead>> {
        Ok(None)
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upsert_entity_state(&self, entity: &TrackedEntity) -> Result<()>;

    /// Only called for quotes that passed every Critical rule
    async fn upsert_validated_quote(
        &self,
        matched: &MatchedEntity,
        quote: &OddsQuote,
        results: &[ValidationResult],
    ) -> Result<()>;
}

#[async_trait]
pub trait Alerting: Send + Sync {
    /// Once per run
    async fn notify(&self, report: &SyncRunReport) -> Result<()>;

    /// Once per blocked quote, as soon as it is detected
    async fn critical_failure(&self, failure: &CriticalFailure) -> Result<()>;
}
