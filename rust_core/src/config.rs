//! Engine configuration: polling intervals, rate limiting, validation thresholds.
//!
//! Every option has a default and an environment override. Values are checked
//! eagerly by `validate()`; any problem is a `SyncError::Configuration`.

use crate::error::{Result, SyncError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default polling interval for events that have not started
pub const DEFAULT_SCHEDULED_INTERVAL_SECS: u64 = 60;
/// Default interval during halftime
pub const DEFAULT_HALFTIME_INTERVAL_SECS: u64 = 15;
/// Default interval for an in-progress event
pub const DEFAULT_LIVE_INTERVAL_SECS: u64 = 10;
/// Default interval for a close game in the final period
pub const DEFAULT_CLOSE_GAME_INTERVAL_SECS: u64 = 5;
/// Score margin at or below which a final-period game counts as close
pub const DEFAULT_CLOSE_GAME_MARGIN: u16 = 7;
/// Consecutive feed listings an active entity may be missing from before it
/// is dropped
pub const DEFAULT_FEED_MISS_LIMIT: u32 = 3;

pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 20;
pub const DEFAULT_RATE_LIMIT_REFILL_PER_SEC: f64 = 5.0;
pub const DEFAULT_RATE_LIMIT_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 32;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 4_000;

/// Read an env var and parse it; unparseable values are configuration errors
pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| SyncError::config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default_secs: u64) -> Result<Duration> {
    env_parse(key, default_secs).map(Duration::from_secs)
}

fn env_millis(key: &str, default_ms: u64) -> Result<Duration> {
    env_parse(key, default_ms).map(Duration::from_millis)
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub scheduled_interval: Duration,
    pub halftime_interval: Duration,
    pub live_interval: Duration,
    pub close_game_interval: Duration,
    pub close_game_margin: u16,
    pub feed_miss_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduled_interval: Duration::from_secs(DEFAULT_SCHEDULED_INTERVAL_SECS),
            halftime_interval: Duration::from_secs(DEFAULT_HALFTIME_INTERVAL_SECS),
            live_interval: Duration::from_secs(DEFAULT_LIVE_INTERVAL_SECS),
            close_game_interval: Duration::from_secs(DEFAULT_CLOSE_GAME_INTERVAL_SECS),
            close_game_margin: DEFAULT_CLOSE_GAME_MARGIN,
            feed_miss_limit: DEFAULT_FEED_MISS_LIMIT,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            scheduled_interval: env_secs(
                "SCHEDULED_INTERVAL_SECS",
                DEFAULT_SCHEDULED_INTERVAL_SECS,
            )?,
            halftime_interval: env_secs("HALFTIME_INTERVAL_SECS", DEFAULT_HALFTIME_INTERVAL_SECS)?,
            live_interval: env_secs("LIVE_INTERVAL_SECS", DEFAULT_LIVE_INTERVAL_SECS)?,
            close_game_interval: env_secs(
                "CLOSE_GAME_INTERVAL_SECS",
                DEFAULT_CLOSE_GAME_INTERVAL_SECS,
            )?,
            close_game_margin: env_parse("CLOSE_GAME_MARGIN", DEFAULT_CLOSE_GAME_MARGIN)?,
            feed_miss_limit: env_parse("FEED_MISS_LIMIT", DEFAULT_FEED_MISS_LIMIT)?,
        })
    }

    /// Intervals must be non-zero and must not grow as the game heats up
    pub fn validate(&self) -> Result<()> {
        let all = [
            ("scheduled", self.scheduled_interval),
            ("halftime", self.halftime_interval),
            ("live", self.live_interval),
            ("close_game", self.close_game_interval),
        ];
        for (name, interval) in all {
            if interval.is_zero() {
                return Err(SyncError::config(format!("{} interval must be > 0", name)));
            }
        }
        if self.feed_miss_limit == 0 {
            return Err(SyncError::config("feed miss limit must be > 0"));
        }
        if !(self.scheduled_interval > self.live_interval
            && self.live_interval > self.close_game_interval)
        {
            return Err(SyncError::config(format!(
                "intervals must strictly decrease scheduled > live > close_game ({:?} / {:?} / {:?})",
                self.scheduled_interval, self.live_interval, self.close_game_interval
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Rate limiter
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Bucket size; also the maximum burst
    pub capacity: u32,
    /// Tokens added per second
    pub refill_per_sec: f64,
    /// Longest a caller may wait in `acquire`
    pub acquire_timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RATE_LIMIT_CAPACITY,
            refill_per_sec: DEFAULT_RATE_LIMIT_REFILL_PER_SEC,
            acquire_timeout: Duration::from_millis(DEFAULT_RATE_LIMIT_TIMEOUT_MS),
        }
    }
}

impl RateLimiterConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            capacity: env_parse("RATE_LIMIT_CAPACITY", DEFAULT_RATE_LIMIT_CAPACITY)?,
            refill_per_sec: env_parse(
                "RATE_LIMIT_REFILL_PER_SEC",
                DEFAULT_RATE_LIMIT_REFILL_PER_SEC,
            )?,
            acquire_timeout: env_millis("RATE_LIMIT_TIMEOUT_MS", DEFAULT_RATE_LIMIT_TIMEOUT_MS)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SyncError::config("rate limiter capacity must be > 0"));
        }
        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(SyncError::config(format!(
                "rate limiter refill rate must be > 0 (got {})",
                self.refill_per_sec
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Validation thresholds
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    pub min_probability: f64,
    pub max_probability: f64,
    pub min_sum: f64,
    pub max_sum: f64,
    /// Home edge band for evenly matched sides, in probability points
    pub home_advantage_min: f64,
    pub home_advantage_max: f64,
    /// Win-percentage gap under which two records count as evenly matched
    pub even_record_tolerance: f64,
    pub freshness_window: Duration,
    pub historical_deviation_threshold: f64,
    pub min_history_games: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_probability: 0.01,
            max_probability: 0.99,
            min_sum: 0.95,
            max_sum: 1.05,
            home_advantage_min: 0.02,
            home_advantage_max: 0.15,
            even_record_tolerance: 0.10,
            freshness_window: Duration::from_secs(24 * 3600),
            historical_deviation_threshold: 0.20,
            min_history_games: 5,
        }
    }
}

impl ValidationConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            min_probability: env_parse("VALIDATION_MIN_PROBABILITY", d.min_probability)?,
            max_probability: env_parse("VALIDATION_MAX_PROBABILITY", d.max_probability)?,
            min_sum: env_parse("VALIDATION_MIN_SUM", d.min_sum)?,
            max_sum: env_parse("VALIDATION_MAX_SUM", d.max_sum)?,
            home_advantage_min: env_parse("VALIDATION_HOME_ADV_MIN", d.home_advantage_min)?,
            home_advantage_max: env_parse("VALIDATION_HOME_ADV_MAX", d.home_advantage_max)?,
            even_record_tolerance: env_parse(
                "VALIDATION_EVEN_RECORD_TOLERANCE",
                d.even_record_tolerance,
            )?,
            freshness_window: env_secs(
                "VALIDATION_FRESHNESS_WINDOW_SECS",
                d.freshness_window.as_secs(),
            )?,
            historical_deviation_threshold: env_parse(
                "VALIDATION_HISTORICAL_DEVIATION",
                d.historical_deviation_threshold,
            )?,
            min_history_games: env_parse("VALIDATION_MIN_HISTORY_GAMES", d.min_history_games)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !(in_unit(self.min_probability)
            && in_unit(self.max_probability)
            && self.min_probability < self.max_probability)
        {
            return Err(SyncError::config(format!(
                "probability range invalid: [{}, {}]",
                self.min_probability, self.max_probability
            )));
        }
        if !(self.min_sum.is_finite() && self.max_sum.is_finite() && self.min_sum < self.max_sum) {
            return Err(SyncError::config(format!(
                "sum bounds invalid: [{}, {}]",
                self.min_sum, self.max_sum
            )));
        }
        if !(in_unit(self.home_advantage_min)
            && in_unit(self.home_advantage_max)
            && self.home_advantage_min <= self.home_advantage_max)
        {
            return Err(SyncError::config(format!(
                "home advantage band invalid: [{}, {}]",
                self.home_advantage_min, self.home_advantage_max
            )));
        }
        if !in_unit(self.even_record_tolerance) || !in_unit(self.historical_deviation_threshold) {
            return Err(SyncError::config(
                "record tolerance and historical deviation must lie in [0, 1]",
            ));
        }
        if self.freshness_window.is_zero() {
            return Err(SyncError::config("freshness window must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Concurrent entity pipelines per run
    pub worker_pool_size: usize,
    /// Timeout applied to every upstream call
    pub fetch_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            worker_pool_size: env_parse("WORKER_POOL_SIZE", DEFAULT_WORKER_POOL_SIZE)?,
            fetch_timeout: env_millis("FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(SyncError::config("worker pool size must be > 0"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SyncError::config("fetch timeout must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncConfig {
    pub scheduler: SchedulerConfig,
    pub rate_limiter: RateLimiterConfig,
    pub validation: ValidationConfig,
    pub orchestrator: OrchestratorConfig,
}

impl SyncConfig {
    /// Load every section from the environment and validate it
    pub fn from_env() -> Result<Self> {
        let config = Self {
            scheduler: SchedulerConfig::from_env()?,
            rate_limiter: RateLimiterConfig::from_env()?,
            validation: ValidationConfig::from_env()?,
            orchestrator: OrchestratorConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.rate_limiter.validate()?;
        self.validation.validate()?;
        self.orchestrator.validate()
    }
}
