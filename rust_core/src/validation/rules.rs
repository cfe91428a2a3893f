//! Individual validation rules.
//!
//! Each rule returns `None` when it does not apply to the quote at hand, so
//! the validator output only lists rules that were actually checked.

use super::{HomeSide, MatchedEntityContext, Severity, ValidationResult};
use crate::config::ValidationConfig;
use crate::models::OddsQuote;

pub trait ValidationRule: Send + Sync {
    fn id(&self) -> &'static str;

    fn evaluate(
        &self,
        quote: &OddsQuote,
        ctx: &MatchedEntityContext,
        config: &ValidationConfig,
    ) -> Option<ValidationResult>;
}

/// Each side's probability inside the configured bounds
pub struct RangeRule;

impl ValidationRule for RangeRule {
    fn id(&self) -> &'static str {
        "range"
    }

    fn evaluate(
        &self,
        quote: &OddsQuote,
        _ctx: &MatchedEntityContext,
        config: &ValidationConfig,
    ) -> Option<ValidationResult> {
        let bounds = config.min_probability..=config.max_probability;
        let out_of_range: Vec<String> = [
            ("side_a", quote.side_a_probability),
            ("side_b", quote.side_b_probability),
        ]
        .iter()
        .filter(|(_, p)| !p.is_finite() || !bounds.contains(p))
        .map(|(side, p)| format!("{}={:.4}", side, p))
        .collect();

        Some(if out_of_range.is_empty() {
            ValidationResult::pass(self.id(), Severity::Critical, "both sides within range")
        } else {
            ValidationResult::fail(
                self.id(),
                Severity::Critical,
                format!(
                    "probability outside [{}, {}]: {}",
                    config.min_probability,
                    config.max_probability,
                    out_of_range.join(", ")
                ),
            )
        })
    }
}

/// Two-way probabilities sum to roughly one. A sum that is too low means a
/// side is missing or mispriced; a high sum is just a wide vig.
pub struct SumRule;

impl ValidationRule for SumRule {
    fn id(&self) -> &'static str {
        "sum"
    }

    fn evaluate(
        &self,
        quote: &OddsQuote,
        _ctx: &MatchedEntityContext,
        config: &ValidationConfig,
    ) -> Option<ValidationResult> {
        let sum = quote.side_a_probability + quote.side_b_probability;
        Some(if !sum.is_finite() || sum < config.min_sum {
            ValidationResult::fail(
                self.id(),
                Severity::Critical,
                format!("probability sum {:.4} below {}", sum, config.min_sum),
            )
        } else if sum > config.max_sum {
            ValidationResult::fail(
                self.id(),
                Severity::Warning,
                format!("probability sum {:.4} above {}", sum, config.max_sum),
            )
        } else {
            ValidationResult::pass(
                self.id(),
                Severity::Critical,
                format!("probability sum {:.4}", sum),
            )
        })
    }
}

/// The side with the better record must be the favourite
pub struct RecordCorrelationRule;

impl ValidationRule for RecordCorrelationRule {
    fn id(&self) -> &'static str {
        "record_correlation"
    }

    fn evaluate(
        &self,
        quote: &OddsQuote,
        ctx: &MatchedEntityContext,
        _config: &ValidationConfig,
    ) -> Option<ValidationResult> {
        let (rec_a, rec_b) = (ctx.side_a_record?, ctx.side_b_record?);
        let (pct_a, pct_b) = (rec_a.win_pct(), rec_b.win_pct());
        if (pct_a - pct_b).abs() < f64::EPSILON {
            return None;
        }

        let (better, better_prob, worse_prob) = if pct_a > pct_b {
            (&ctx.team_a, quote.side_a_probability, quote.side_b_probability)
        } else {
            (&ctx.team_b, quote.side_b_probability, quote.side_a_probability)
        };

        let message = format!(
            "{} {}-{} vs {} {}-{}: better record {} priced {:.1}% vs {:.1}%",
            ctx.team_a,
            rec_a.wins,
            rec_a.losses,
            ctx.team_b,
            rec_b.wins,
            rec_b.losses,
            better,
            better_prob * 100.0,
            worse_prob * 100.0
        );

        Some(if better_prob > worse_prob {
            ValidationResult::pass(self.id(), Severity::Critical, message)
        } else {
            ValidationResult::fail(self.id(), Severity::Critical, message)
        })
    }
}

/// Evenly matched sides: the home side should carry a modest edge
pub struct HomeAdvantageRule;

impl ValidationRule for HomeAdvantageRule {
    fn id(&self) -> &'static str {
        "home_advantage"
    }

    fn evaluate(
        &self,
        quote: &OddsQuote,
        ctx: &MatchedEntityContext,
        config: &ValidationConfig,
    ) -> Option<ValidationResult> {
        let (rec_a, rec_b) = (ctx.side_a_record?, ctx.side_b_record?);
        if (rec_a.win_pct() - rec_b.win_pct()).abs() > config.even_record_tolerance {
            return None;
        }

        let (home, home_prob, away_prob) = match ctx.home_side {
            HomeSide::SideA => (&ctx.team_a, quote.side_a_probability, quote.side_b_probability),
            HomeSide::SideB => (&ctx.team_b, quote.side_b_probability, quote.side_a_probability),
            HomeSide::Neutral => return None,
        };

        let edge = home_prob - away_prob;
        let in_band = (config.home_advantage_min..=config.home_advantage_max).contains(&edge);
        let message = format!(
            "home side {} edge {:+.3} (expected [{}, {}])",
            home, edge, config.home_advantage_min, config.home_advantage_max
        );

        Some(if in_band {
            ValidationResult::pass(self.id(), Severity::Warning, message)
        } else {
            ValidationResult::fail(self.id(), Severity::Warning, message)
        })
    }
}

/// Quote observed within the freshness window
pub struct FreshnessRule;

impl ValidationRule for FreshnessRule {
    fn id(&self) -> &'static str {
        "freshness"
    }

    fn evaluate(
        &self,
        quote: &OddsQuote,
        ctx: &MatchedEntityContext,
        config: &ValidationConfig,
    ) -> Option<ValidationResult> {
        let age = ctx.evaluated_at.signed_duration_since(quote.observed_at);
        let window = chrono::Duration::from_std(config.freshness_window)
            .unwrap_or_else(|_| chrono::Duration::days(365));

        Some(if age <= window {
            ValidationResult::pass(
                self.id(),
                Severity::Warning,
                format!("quote age {}s", age.num_seconds()),
            )
        } else {
            ValidationResult::fail(
                self.id(),
                Severity::Warning,
                format!(
                    "quote is {}s old (window {}s)",
                    age.num_seconds(),
                    config.freshness_window.as_secs()
                ),
            )
        })
    }
}

/// Side A's price close to its head-to-head win rate
pub struct HistoricalDeviationRule;

impl ValidationRule for HistoricalDeviationRule {
    fn id(&self) -> &'static str {
        "historical_deviation"
    }

    fn evaluate(
        &self,
        quote: &OddsQuote,
        ctx: &MatchedEntityContext,
        config: &ValidationConfig,
    ) -> Option<ValidationResult> {
        let h2h = ctx.head_to_head?;
        if h2h.games < config.min_history_games {
            return None;
        }
        let base_rate = h2h.base_rate()?;
        let deviation = (quote.side_a_probability - base_rate).abs();
        let message = format!(
            "{} priced {:.3} vs head-to-head rate {:.3} over {} games",
            ctx.team_a, quote.side_a_probability, base_rate, h2h.games
        );

        Some(if deviation <= config.historical_deviation_threshold {
            ValidationResult::pass(self.id(), Severity::Warning, message)
        } else {
            ValidationResult::fail(self.id(), Severity::Warning, message)
        })
    }
}

/// All built-in rules, in evaluation order
pub fn default_rules() -> Vec<Box<dyn ValidationRule>> {
    vec![
        Box::new(RangeRule),
        Box::new(SumRule),
        Box::new(RecordCorrelationRule),
        Box::new(HomeAdvantageRule),
        Box::new(FreshnessRule),
        Box::new(HistoricalDeviationRule),
    ]
}
