//! Odds validation: sanity rules over a quote and what is known about the two
//! sides. Every applicable rule runs; a quote is blocked only by a failed
//! Critical rule.

pub mod rules;

use crate::config::ValidationConfig;
use crate::models::{MatchedEntity, OddsQuote, TeamRecord};
use chrono::{DateTime, Utc};
use rules::{default_rules, ValidationRule};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule_id: String,
    pub severity: Severity,
    pub passed: bool,
    pub message: String,
}

impl ValidationResult {
    pub fn pass(rule_id: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(rule_id: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            passed: false,
            message: message.into(),
        }
    }

    pub fn is_critical_failure(&self) -> bool {
        self.severity == Severity::Critical && !self.passed
    }
}

/// True when no Critical rule failed
pub fn is_displayable(results: &[ValidationResult]) -> bool {
    !results.iter().any(ValidationResult::is_critical_failure)
}

pub fn critical_failures(results: &[ValidationResult]) -> Vec<&ValidationResult> {
    results.iter().filter(|r| r.is_critical_failure()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeSide {
    SideA,
    SideB,
    Neutral,
}

/// Prior meetings between the two sides, from side A's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub games: u32,
    pub side_a_wins: u32,
}

impl HeadToHead {
    pub fn base_rate(&self) -> Option<f64> {
        if self.games == 0 {
            None
        } else {
            Some(self.side_a_wins.min(self.games) as f64 / self.games as f64)
        }
    }
}

/// Facts the rules check a quote against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedEntityContext {
    pub team_a: String,
    pub team_b: String,
    pub side_a_record: Option<TeamRecord>,
    pub side_b_record: Option<TeamRecord>,
    pub home_side: HomeSide,
    pub head_to_head: Option<HeadToHead>,
    pub evaluated_at: DateTime<Utc>,
}

impl MatchedEntityContext {
    pub fn new(team_a: &str, team_b: &str, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            side_a_record: None,
            side_b_record: None,
            home_side: HomeSide::SideA,
            head_to_head: None,
            evaluated_at,
        }
    }

    /// Side A of a tracked entity is the home side, unless the game is at a
    /// neutral site
    pub fn from_matched(
        matched: &MatchedEntity,
        head_to_head: Option<HeadToHead>,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        let home_side = if matched.neutral_site {
            HomeSide::Neutral
        } else {
            HomeSide::SideA
        };
        Self {
            side_a_record: matched.side_a_record,
            side_b_record: matched.side_b_record,
            home_side,
            head_to_head,
            ..Self::new(&matched.team_a, &matched.team_b, evaluated_at)
        }
    }

    pub fn with_records(mut self, side_a: TeamRecord, side_b: TeamRecord) -> Self {
        self.side_a_record = Some(side_a);
        self.side_b_record = Some(side_b);
        self
    }

    pub fn with_head_to_head(mut self, h2h: HeadToHead) -> Self {
        self.head_to_head = Some(h2h);
        self
    }

    pub fn with_home_side(mut self, home_side: HomeSide) -> Self {
        self.home_side = home_side;
        self
    }
}

/// Runs every rule against a quote. Synchronous, no I/O.
pub struct OddsValidator {
    config: ValidationConfig,
    rules: Vec<Box<dyn ValidationRule>>,
}

impl std::fmt::Debug for OddsValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OddsValidator")
            .field("config", &self.config)
            .field("rules", &self.rules.iter().map(|r| r.id()).collect::<Vec<_>>())
            .finish()
    }
}

impl OddsValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            rules: default_rules(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate(&self, quote: &OddsQuote, ctx: &MatchedEntityContext) -> Vec<ValidationResult> {
        let results: Vec<ValidationResult> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(quote, ctx, &self.config))
            .collect();

        for result in results.iter().filter(|r| !r.passed) {
            match result.severity {
                Severity::Critical => error!(
                    "Market {} failed {}: {}",
                    quote.market_id, result.rule_id, result.message
                ),
                Severity::Warning => warn!(
                    "Market {} warning {}: {}",
                    quote.market_id, result.rule_id, result.message
                ),
                Severity::Info => {}
            }
        }

        results
    }
}

impl Default for OddsValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-17T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn quote(a: f64, b: f64) -> OddsQuote {
        OddsQuote::new("mkt-1", a, b, now())
    }

    fn ctx() -> MatchedEntityContext {
        MatchedEntityContext::new("Boise State", "San Diego State", now())
    }

    fn result<'a>(results: &'a [ValidationResult], rule_id: &str) -> Option<&'a ValidationResult> {
        results.iter().find(|r| r.rule_id == rule_id)
    }

    #[test]
    fn test_better_record_priced_as_underdog_is_critical() {
        let validator = OddsValidator::default();
        let ctx = ctx().with_records(TeamRecord::new(9, 1), TeamRecord::new(3, 7));
        let results = validator.validate(&quote(0.35, 0.65), &ctx);

        let corr = result(&results, "record_correlation").unwrap();
        assert_eq!(corr.severity, Severity::Critical);
        assert!(!corr.passed);
        assert!(!is_displayable(&results));
        assert_eq!(critical_failures(&results).len(), 1);
    }

    #[test]
    fn test_reasonable_quote_has_no_critical_failure() {
        let validator = OddsValidator::default();
        let results = validator.validate(&quote(0.45, 0.55), &ctx());
        assert!(is_displayable(&results));
        assert!(critical_failures(&results).is_empty());
    }

    #[test]
    fn test_inapplicable_rules_are_omitted() {
        let results = OddsValidator::default().validate(&quote(0.45, 0.55), &ctx());
        let ids: Vec<&str> = results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["range", "sum", "freshness"]);
    }

    #[test]
    fn test_range_rule() {
        let results = OddsValidator::default().validate(&quote(0.995, 0.005), &ctx());
        assert!(result(&results, "range").unwrap().is_critical_failure());

        let results = OddsValidator::default().validate(&quote(f64::NAN, 0.5), &ctx());
        assert!(!is_displayable(&results));
    }

    #[test]
    fn test_sum_rule_severity_depends_on_direction() {
        let validator = OddsValidator::default();

        let low = validator.validate(&quote(0.40, 0.40), &ctx());
        assert!(result(&low, "sum").unwrap().is_critical_failure());

        let high = validator.validate(&quote(0.55, 0.55), &ctx());
        let sum = result(&high, "sum").unwrap();
        assert!(!sum.passed);
        assert_eq!(sum.severity, Severity::Warning);
        assert!(is_displayable(&high));
    }

    #[test]
    fn test_record_tie_skips_correlation() {
        let ctx = ctx().with_records(TeamRecord::new(5, 5), TeamRecord::new(4, 4));
        let results = OddsValidator::default().validate(&quote(0.30, 0.70), &ctx);
        assert!(result(&results, "record_correlation").is_none());
    }

    #[test]
    fn test_home_advantage_for_even_records() {
        let validator = OddsValidator::default();
        let even = ctx().with_records(TeamRecord::new(6, 4), TeamRecord::new(6, 4));

        let ok = validator.validate(&quote(0.54, 0.46), &even);
        assert!(result(&ok, "home_advantage").unwrap().passed);

        let flat = validator.validate(&quote(0.50, 0.50), &even);
        let home = result(&flat, "home_advantage").unwrap();
        assert!(!home.passed);
        assert_eq!(home.severity, Severity::Warning);
        assert!(is_displayable(&flat));

        let neutral = even.clone().with_home_side(HomeSide::Neutral);
        let results = validator.validate(&quote(0.50, 0.50), &neutral);
        assert!(result(&results, "home_advantage").is_none());
    }

    #[test]
    fn test_home_advantage_skipped_for_uneven_records() {
        let ctx = ctx().with_records(TeamRecord::new(9, 1), TeamRecord::new(3, 7));
        let results = OddsValidator::default().validate(&quote(0.70, 0.30), &ctx);
        assert!(result(&results, "home_advantage").is_none());
        assert!(result(&results, "record_correlation").unwrap().passed);
    }

    #[test]
    fn test_stale_quote_is_warning() {
        let mut stale = quote(0.45, 0.55);
        stale.observed_at = now() - Duration::hours(25);
        let results = OddsValidator::default().validate(&stale, &ctx());
        let fresh = result(&results, "freshness").unwrap();
        assert!(!fresh.passed);
        assert_eq!(fresh.severity, Severity::Warning);
        assert!(is_displayable(&results));
    }

    #[test]
    fn test_historical_deviation_needs_enough_games() {
        let validator = OddsValidator::default();

        let thin = ctx().with_head_to_head(HeadToHead { games: 3, side_a_wins: 3 });
        let results = validator.validate(&quote(0.30, 0.70), &thin);
        assert!(result(&results, "historical_deviation").is_none());

        let deep = ctx().with_head_to_head(HeadToHead { games: 10, side_a_wins: 8 });
        let results = validator.validate(&quote(0.30, 0.70), &deep);
        let hist = result(&results, "historical_deviation").unwrap();
        assert!(!hist.passed);
        assert_eq!(hist.severity, Severity::Warning);

        let results = validator.validate(&quote(0.70, 0.30), &deep);
        assert!(result(&results, "historical_deviation").unwrap().passed);
    }

    // Boundary cases below pair a bound with 0.0 so the computed sum or edge
    // is the bound itself, not a float that merely rounds near it.

    #[test]
    fn test_range_bounds_inclusive() {
        let validator = OddsValidator::default();
        let edge = validator.validate(&quote(0.01, 0.99), &ctx());
        assert!(result(&edge, "range").unwrap().passed);

        let below = validator.validate(&quote(0.0099, 0.99), &ctx());
        assert!(result(&below, "range").unwrap().is_critical_failure());
        let above = validator.validate(&quote(0.01, 0.9901), &ctx());
        assert!(result(&above, "range").unwrap().is_critical_failure());
    }

    #[test]
    fn test_sum_bounds_inclusive() {
        let validator = OddsValidator::default();
        for (a, b) in [(0.95, 0.0), (0.0, 0.95), (1.05, 0.0), (0.0, 1.05)] {
            let results = validator.validate(&quote(a, b), &ctx());
            assert!(result(&results, "sum").unwrap().passed, "sum of {} + {}", a, b);
        }

        let low = validator.validate(&quote(0.949, 0.0), &ctx());
        assert!(result(&low, "sum").unwrap().is_critical_failure());
        let high = validator.validate(&quote(1.051, 0.0), &ctx());
        let sum = result(&high, "sum").unwrap();
        assert!(!sum.passed);
        assert_eq!(sum.severity, Severity::Warning);
    }

    #[test]
    fn test_home_band_inclusive() {
        let validator = OddsValidator::default();
        let even = ctx().with_records(TeamRecord::new(6, 4), TeamRecord::new(6, 4));

        for home in [0.02, 0.15] {
            let results = validator.validate(&quote(home, 0.0), &even);
            assert!(result(&results, "home_advantage").unwrap().passed, "edge {}", home);
        }
        for home in [0.019, 0.151] {
            let results = validator.validate(&quote(home, 0.0), &even);
            assert!(!result(&results, "home_advantage").unwrap().passed, "edge {}", home);
        }

        let away_home = even.with_home_side(HomeSide::SideB);
        let results = validator.validate(&quote(0.0, 0.15), &away_home);
        assert!(result(&results, "home_advantage").unwrap().passed);
    }

    #[test]
    fn test_freshness_window_inclusive() {
        let validator = OddsValidator::default();
        let mut edge = quote(0.45, 0.55);
        edge.observed_at = now() - Duration::hours(24);
        let results = validator.validate(&edge, &ctx());
        assert!(result(&results, "freshness").unwrap().passed);

        edge.observed_at = now() - Duration::hours(24) - Duration::seconds(1);
        let results = validator.validate(&edge, &ctx());
        assert!(!result(&results, "freshness").unwrap().passed);
    }

    #[test]
    fn test_historical_deviation_boundaries() {
        let validator = OddsValidator::default();

        let four = ctx().with_head_to_head(HeadToHead { games: 4, side_a_wins: 0 });
        let results = validator.validate(&quote(0.2, 0.8), &four);
        assert!(result(&results, "historical_deviation").is_none());

        // Exactly the minimum number of games; base rate 0.0
        let five = ctx().with_head_to_head(HeadToHead { games: 5, side_a_wins: 0 });
        let results = validator.validate(&quote(0.2, 0.8), &five);
        assert!(result(&results, "historical_deviation").unwrap().passed);

        let results = validator.validate(&quote(0.21, 0.79), &five);
        assert!(!result(&results, "historical_deviation").unwrap().passed);
    }

    #[test]
    fn test_neutral_site_skips_home_advantage() {
        let entity = crate::models::TrackedEntity::scheduled(
            "401",
            crate::models::Sport::NCAAF,
            "Boise State",
            "San Diego State",
        );
        let mut matched = MatchedEntity {
            entity,
            team_a: "Boise State".to_string(),
            team_b: "San Diego State".to_string(),
            side_a_record: Some(TeamRecord::new(6, 4)),
            side_b_record: Some(TeamRecord::new(6, 4)),
            neutral_site: false,
        };
        let validator = OddsValidator::default();

        let home = MatchedEntityContext::from_matched(&matched, None, now());
        assert_eq!(home.home_side, HomeSide::SideA);
        let results = validator.validate(&quote(0.50, 0.50), &home);
        assert!(!result(&results, "home_advantage").unwrap().passed);

        matched.neutral_site = true;
        let neutral = MatchedEntityContext::from_matched(&matched, None, now());
        assert_eq!(neutral.home_side, HomeSide::Neutral);
        let results = validator.validate(&quote(0.50, 0.50), &neutral);
        assert!(result(&results, "home_advantage").is_none());
    }

    #[test]
    fn test_all_rules_evaluated_without_short_circuit() {
        let ctx = ctx()
            .with_records(TeamRecord::new(9, 1), TeamRecord::new(3, 7))
            .with_head_to_head(HeadToHead { games: 10, side_a_wins: 9 });
        let mut bad = quote(0.005, 0.30);
        bad.observed_at = now() - Duration::days(3);

        let results = OddsValidator::default().validate(&bad, &ctx);
        assert_eq!(results.len(), 5);
        assert_eq!(critical_failures(&results).len(), 3);
    }
}
