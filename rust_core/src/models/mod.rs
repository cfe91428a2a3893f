//! Entity model shared by the scheduler, matcher, validator and orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Sport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sport {
    NBA,
    NCAAB,
    NFL,
    NCAAF,
    NHL,
    MLB,
    MLS,
    #[serde(rename = "SOCCER")]
    Soccer,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::NBA => "NBA",
            Sport::NCAAB => "NCAAB",
            Sport::NFL => "NFL",
            Sport::NCAAF => "NCAAF",
            Sport::NHL => "NHL",
            Sport::MLB => "MLB",
            Sport::MLS => "MLS",
            Sport::Soccer => "SOCCER",
        }
    }

    /// Parse a sport code, case-insensitive
    pub fn parse(sport: &str) -> Option<Self> {
        match sport.to_lowercase().as_str() {
            "nfl" => Some(Sport::NFL),
            "ncaaf" => Some(Sport::NCAAF),
            "nba" => Some(Sport::NBA),
            "ncaab" => Some(Sport::NCAAB),
            "nhl" => Some(Sport::NHL),
            "mlb" => Some(Sport::MLB),
            "mls" => Some(Sport::MLS),
            "soccer" => Some(Sport::Soccer),
            _ => None,
        }
    }

    /// Number of regulation periods (quarters, halves, periods, innings)
    pub fn regulation_periods(&self) -> u8 {
        match self {
            Sport::NFL | Sport::NCAAF | Sport::NBA => 4,
            Sport::NCAAB | Sport::MLS | Sport::Soccer => 2,
            Sport::NHL => 3,
            Sport::MLB => 9,
        }
    }

    /// True when `period` is the last regulation period or any overtime
    pub fn is_final_period(&self, period: u8) -> bool {
        period >= self.regulation_periods()
    }

    /// ESPN `(sport, league)` path segments
    pub fn espn_path(&self) -> (&'static str, &'static str) {
        match self {
            Sport::NFL => ("football", "nfl"),
            Sport::NCAAF => ("football", "college-football"),
            Sport::NBA => ("basketball", "nba"),
            Sport::NCAAB => ("basketball", "mens-college-basketball"),
            Sport::NHL => ("hockey", "nhl"),
            Sport::MLB => ("baseball", "mlb"),
            Sport::MLS => ("soccer", "usa.1"),
            Sport::Soccer => ("soccer", "eng.1"),
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Scheduled,
    InProgress,
    Halftime,
    Final,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Final)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Scheduled => "scheduled",
            LifecycleState::InProgress => "in_progress",
            LifecycleState::Halftime => "halftime",
            LifecycleState::Final => "final",
        }
    }

    /// Map an ESPN `status.type.name` value
    pub fn from_espn_status(status: &str) -> Self {
        match status {
            "STATUS_HALFTIME" => LifecycleState::Halftime,
            "STATUS_FINAL" | "STATUS_FULL_TIME" | "STATUS_FINAL_OT" | "STATUS_CANCELED"
            | "STATUS_POSTPONED" | "STATUS_FORFEIT" => LifecycleState::Final,
            "STATUS_SCHEDULED" | "STATUS_DELAYED" => LifecycleState::Scheduled,
            s if s.starts_with("STATUS_IN_PROGRESS")
                || s == "STATUS_END_PERIOD"
                || s == "STATUS_FIRST_HALF"
                || s == "STATUS_SECOND_HALF"
                || s == "STATUS_OVERTIME" =>
            {
                LifecycleState::InProgress
            }
            _ => LifecycleState::Scheduled,
        }
    }
}

// ============================================================================
// Tracked entity
// ============================================================================

/// Win-loss record of one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
}

impl TeamRecord {
    pub fn new(wins: u32, losses: u32) -> Self {
        Self { wins, losses }
    }

    /// Parse "9-1" or "9-1-2" (trailing ties ignored)
    pub fn parse(summary: &str) -> Option<Self> {
        let mut parts = summary.trim().split('-');
        let wins = parts.next()?.trim().parse().ok()?;
        let losses = parts.next()?.trim().parse().ok()?;
        Some(Self { wins, losses })
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses
    }

    /// Win fraction; 0.5 with no games played
    pub fn win_pct(&self) -> f64 {
        if self.games() == 0 {
            return 0.5;
        }
        self.wins as f64 / self.games() as f64
    }
}

/// One live event under active monitoring. Side A is the home side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub external_id: String,
    pub sport: Sport,
    pub side_a: String,
    pub side_b: String,
    pub lifecycle_state: LifecycleState,
    pub period: u8,
    pub clock_remaining_secs: u32,
    pub score_a: u16,
    pub score_b: u16,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub current_interval: Duration,
}

impl TrackedEntity {
    /// New, never-polled entity in the `Scheduled` state
    pub fn scheduled(external_id: &str, sport: Sport, side_a: &str, side_b: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            sport,
            side_a: side_a.to_string(),
            side_b: side_b.to_string(),
            lifecycle_state: LifecycleState::Scheduled,
            period: 0,
            clock_remaining_secs: 0,
            score_a: 0,
            score_b: 0,
            last_polled_at: None,
            current_interval: Duration::ZERO,
        }
    }

    pub fn score_margin(&self) -> u16 {
        self.score_a.abs_diff(self.score_b)
    }

    /// Fold a freshly fetched state into this entity
    pub fn apply(&mut self, state: &RawEventState) {
        self.lifecycle_state = state.lifecycle_state;
        self.period = state.period;
        self.clock_remaining_secs = state.clock_remaining_secs;
        self.score_a = state.score_a;
        self.score_b = state.score_b;
        if !state.side_a.is_empty() {
            self.side_a = state.side_a.clone();
        }
        if !state.side_b.is_empty() {
            self.side_b = state.side_b.clone();
        }
    }
}

/// State returned by one fetch from the live-state source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventState {
    pub external_id: String,
    pub side_a: String,
    pub side_b: String,
    pub lifecycle_state: LifecycleState,
    pub period: u8,
    pub clock_remaining_secs: u32,
    pub score_a: u16,
    pub score_b: u16,
    pub side_a_record: Option<TeamRecord>,
    pub side_b_record: Option<TeamRecord>,
    /// Played at a neutral venue; side A is then not the home side
    #[serde(default)]
    pub neutral_site: bool,
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// Quotes
// ============================================================================

/// One market's price snapshot, as implied probabilities per side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub market_id: String,
    pub side_a_probability: f64,
    pub side_b_probability: f64,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl OddsQuote {
    pub fn new(market_id: &str, side_a: f64, side_b: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            market_id: market_id.to_string(),
            side_a_probability: side_a,
            side_b_probability: side_b,
            observed_at,
            provider: None,
        }
    }
}

/// American moneyline to implied probability (no vig removal)
pub fn moneyline_to_probability(moneyline: f64) -> Option<f64> {
    if moneyline >= 100.0 {
        Some(100.0 / (moneyline + 100.0))
    } else if moneyline <= -100.0 {
        Some(-moneyline / (-moneyline + 100.0))
    } else {
        None
    }
}

/// Entity after both sides resolved to canonical teams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEntity {
    pub entity: TrackedEntity,
    pub team_a: String,
    pub team_b: String,
    pub side_a_record: Option<TeamRecord>,
    pub side_b_record: Option<TeamRecord>,
    #[serde(default)]
    pub neutral_site: bool,
}
