//! Configuration constants and environment loading for the sync service
//!
//! Engine tuning (intervals, rate limits, validation thresholds) lives in
//! `livesync_core::config`; this module covers what only the process needs:
//! which sports to follow, where the registry lives, loop cadences and the
//! optional database.

use anyhow::{anyhow, Result};
use livesync_core::config::env_parse;
use livesync_core::models::Sport;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Sports followed when SPORTS is unset
pub const DEFAULT_SPORTS: &str = "nfl,ncaaf,nba,ncaab,nhl";

pub const DEFAULT_TEAM_REGISTRY_PATH: &str = "config/team_registry.json";

/// How often the scheduler is asked for due entities
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// How often the scoreboard feed is re-listed for new events
pub const DEFAULT_FEED_REFRESH_SECS: u64 = 300;

/// How long finished events are remembered (and refused re-tracking)
pub const DEFAULT_RETENTION_SECS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub sports: Vec<Sport>,
    pub team_registry_path: PathBuf,
    pub tick_interval: Duration,
    pub feed_refresh_interval: Duration,
    pub retention: Duration,
    pub database_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sports: parse_sports(DEFAULT_SPORTS).unwrap_or_default(),
            team_registry_path: PathBuf::from(DEFAULT_TEAM_REGISTRY_PATH),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            feed_refresh_interval: Duration::from_secs(DEFAULT_FEED_REFRESH_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            database_url: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let sports = parse_sports(&env::var("SPORTS").unwrap_or_else(|_| DEFAULT_SPORTS.to_string()))?;

        let team_registry_path = env::var("TEAM_REGISTRY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEAM_REGISTRY_PATH));

        let tick_interval =
            Duration::from_millis(env_parse("TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL_MS)?);
        let feed_refresh_interval =
            Duration::from_secs(env_parse("FEED_REFRESH_SECS", DEFAULT_FEED_REFRESH_SECS)?);
        let retention = Duration::from_secs(env_parse("RETENTION_SECS", DEFAULT_RETENTION_SECS)?);

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());

        let config = Self {
            sports,
            team_registry_path,
            tick_interval,
            feed_refresh_interval,
            retention,
            database_url,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("TICK_INTERVAL_MS must be > 0"));
        }
        if self.feed_refresh_interval.is_zero() {
            return Err(anyhow!("FEED_REFRESH_SECS must be > 0"));
        }
        Ok(())
    }
}

/// Parse a comma-separated sport list; unknown codes are rejected
pub fn parse_sports(raw: &str) -> Result<Vec<Sport>> {
    let mut sports = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let sport = Sport::parse(code).ok_or_else(|| anyhow!("unknown sport '{}' in SPORTS", code))?;
        if !sports.contains(&sport) {
            sports.push(sport);
        }
    }
    if sports.is_empty() {
        return Err(anyhow!("SPORTS must name at least one sport"));
    }
    Ok(sports)
}
