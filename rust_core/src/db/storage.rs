//! `Storage` implementations: Postgres, and a log-only fallback for dry runs.

use super::retry::{execute_with_retry, RetryPolicy};
use crate::models::{MatchedEntity, OddsQuote, TrackedEntity};
use crate::sync::Storage;
use crate::validation::ValidationResult;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info};

const CREATE_ENTITY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tracked_entities (
    external_id TEXT PRIMARY KEY,
    sport TEXT NOT NULL,
    side_a TEXT NOT NULL,
    side_b TEXT NOT NULL,
    lifecycle_state TEXT NOT NULL,
    period SMALLINT NOT NULL,
    clock_remaining_secs INTEGER NOT NULL,
    score_a INTEGER NOT NULL,
    score_b INTEGER NOT NULL,
    poll_interval_secs INTEGER NOT NULL,
    last_polled_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_QUOTE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS validated_quotes (
    market_id TEXT PRIMARY KEY,
    external_id TEXT NOT NULL,
    team_a TEXT NOT NULL,
    team_b TEXT NOT NULL,
    side_a_probability DOUBLE PRECISION NOT NULL,
    side_b_probability DOUBLE PRECISION NOT NULL,
    provider TEXT,
    observed_at TIMESTAMPTZ NOT NULL,
    validation JSONB NOT NULL,
    validated_at TIMESTAMPTZ NOT NULL
)
"#;

const UPSERT_ENTITY: &str = r#"
INSERT INTO tracked_entities (
    external_id, sport, side_a, side_b, lifecycle_state, period,
    clock_remaining_secs, score_a, score_b, poll_interval_secs, last_polled_at, updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
ON CONFLICT (external_id) DO UPDATE SET
    side_a = EXCLUDED.side_a,
    side_b = EXCLUDED.side_b,
    lifecycle_state = EXCLUDED.lifecycle_state,
    period = EXCLUDED.period,
    clock_remaining_secs = EXCLUDED.clock_remaining_secs,
    score_a = EXCLUDED.score_a,
    score_b = EXCLUDED.score_b,
    poll_interval_secs = EXCLUDED.poll_interval_secs,
    last_polled_at = EXCLUDED.last_polled_at,
    updated_at = NOW()
"#;

const UPSERT_QUOTE: &str = r#"
INSERT INTO validated_quotes (
    market_id, external_id, team_a, team_b, side_a_probability, side_b_probability,
    provider, observed_at, validation, validated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb, $10)
ON CONFLICT (market_id) DO UPDATE SET
    side_a_probability = EXCLUDED.side_a_probability,
    side_b_probability = EXCLUDED.side_b_probability,
    provider = EXCLUDED.provider,
    observed_at = EXCLUDED.observed_at,
    validation = EXCLUDED.validation,
    validated_at = EXCLUDED.validated_at
"#;

pub struct PgStorage {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for ddl in [CREATE_ENTITY_TABLE, CREATE_QUOTE_TABLE] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        info!("Storage schema ready");
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn upsert_entity_state(&self, entity: &TrackedEntity) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry("upsert entity state", self.retry, || async move {
            sqlx::query(UPSERT_ENTITY)
                .bind(&entity.external_id)
                .bind(entity.sport.as_str())
                .bind(&entity.side_a)
                .bind(&entity.side_b)
                .bind(entity.lifecycle_state.as_str())
                .bind(entity.period as i16)
                .bind(entity.clock_remaining_secs.min(i32::MAX as u32) as i32)
                .bind(entity.score_a as i32)
                .bind(entity.score_b as i32)
                .bind(entity.current_interval.as_secs().min(i32::MAX as u64) as i32)
                .bind(entity.last_polled_at)
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from)
        })
        .await?;
        debug!("Stored state for {}", entity.external_id);
        Ok(())
    }

    async fn upsert_validated_quote(
        &self,
        matched: &MatchedEntity,
        quote: &OddsQuote,
        results: &[ValidationResult],
    ) -> Result<()> {
        let pool = &self.pool;
        let validation = serde_json::to_string(results)?;
        let validation = validation.as_str();
        let validated_at = Utc::now();
        execute_with_retry("upsert validated quote", self.retry, || async move {
            sqlx::query(UPSERT_QUOTE)
                .bind(&quote.market_id)
                .bind(&matched.entity.external_id)
                .bind(&matched.team_a)
                .bind(&matched.team_b)
                .bind(quote.side_a_probability)
                .bind(quote.side_b_probability)
                .bind(quote.provider.as_deref())
                .bind(quote.observed_at)
                .bind(validation)
                .bind(validated_at)
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from)
        })
        .await?;
        debug!("Stored quote {}", quote.market_id);
        Ok(())
    }
}

/// Logs what would be written. Used when no database is configured.
#[derive(Debug, Default)]
pub struct TracingStorage;

#[async_trait]
impl Storage for TracingStorage {
    async fn upsert_entity_state(&self, entity: &TrackedEntity) -> Result<()> {
        debug!(
            "[dry-run] {} {} {}-{} {} P{}",
            entity.external_id,
            entity.lifecycle_state.as_str(),
            entity.score_a,
            entity.score_b,
            entity.side_a,
            entity.period
        );
        Ok(())
    }

    async fn upsert_validated_quote(
        &self,
        matched: &MatchedEntity,
        quote: &OddsQuote,
        results: &[ValidationResult],
    ) -> Result<()> {
        let warnings = results.iter().filter(|r| !r.passed).count();
        info!(
            "[dry-run] quote {} {} {:.3} / {} {:.3} ({} warning(s))",
            quote.market_id,
            matched.team_a,
            quote.side_a_probability,
            matched.team_b,
            quote.side_b_probability,
            warnings
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sport;

    #[tokio::test]
    async fn test_tracing_storage_accepts_everything() {
        let storage = TracingStorage;
        let entity = TrackedEntity::scheduled("401", Sport::NCAAF, "Boise State", "San Diego State");
        storage.upsert_entity_state(&entity).await.unwrap();

        let matched = MatchedEntity {
            entity,
            team_a: "Boise State".to_string(),
            team_b: "San Diego State".to_string(),
            side_a_record: None,
            side_b_record: None,
            neutral_site: false,
        };
        let quote = OddsQuote::new("espn:401:espn-bet", 0.6, 0.43, Utc::now());
        storage
            .upsert_validated_quote(&matched, &quote, &[])
            .await
            .unwrap();
    }
}
