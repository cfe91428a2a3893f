use crate::error::SyncError;
use crate::validation::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A quote held back by at least one failed Critical rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalFailure {
    pub entity_id: String,
    pub market_id: String,
    pub team_a: String,
    pub team_b: String,
    pub side_a_probability: f64,
    pub side_b_probability: f64,
    /// Only the failed Critical results
    pub failed_rules: Vec<ValidationResult>,
    pub detected_at: DateTime<Utc>,
}

impl CriticalFailure {
    pub fn rule_ids(&self) -> Vec<String> {
        self.failed_rules.iter().map(|r| r.rule_id.clone()).collect()
    }

    pub fn to_error(&self) -> SyncError {
        SyncError::ValidationCriticalFailure {
            market_id: self.market_id.clone(),
            rules: self.rule_ids(),
        }
    }
}

/// How one entity's pass through the pipeline ended
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Succeeded,
    SkippedUnmatched { ambiguous: bool },
    BlockedByValidation(CriticalFailure),
    Errored(SyncError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityError {
    pub entity_id: String,
    pub message: String,
}

/// Summary of one `run_once`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunReport {
    pub run_id: Uuid,
    pub run_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub due: usize,
    pub succeeded: usize,
    pub skipped_unmatched: usize,
    /// Subset of `skipped_unmatched` caused by tied candidates
    pub ambiguous: usize,
    pub blocked_by_validation: usize,
    pub errored: usize,
    pub critical_failures: Vec<CriticalFailure>,
    pub errors: Vec<EntityError>,
}

impl SyncRunReport {
    pub fn new(run_at: DateTime<Utc>, due: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_at,
            finished_at: run_at,
            due,
            succeeded: 0,
            skipped_unmatched: 0,
            ambiguous: 0,
            blocked_by_validation: 0,
            errored: 0,
            critical_failures: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, entity_id: &str, outcome: EntityOutcome) {
        match outcome {
            EntityOutcome::Succeeded => self.succeeded += 1,
            EntityOutcome::SkippedUnmatched { ambiguous } => {
                self.skipped_unmatched += 1;
                if ambiguous {
                    self.ambiguous += 1;
                }
            }
            EntityOutcome::BlockedByValidation(failure) => {
                self.blocked_by_validation += 1;
                self.critical_failures.push(failure);
            }
            EntityOutcome::Errored(err) => {
                self.errored += 1;
                self.errors.push(EntityError {
                    entity_id: entity_id.to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped_unmatched + self.blocked_by_validation + self.errored
    }

    pub fn is_clean(&self) -> bool {
        self.errored == 0 && self.blocked_by_validation == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "run {} due={} processed={} ok={} unmatched={} (ambiguous={}) blocked={} errored={}",
            self.run_id,
            self.due,
            self.processed(),
            self.succeeded,
            self.skipped_unmatched,
            self.ambiguous,
            self.blocked_by_validation,
            self.errored
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Severity;

    #[test]
    fn test_outcomes_accumulate_independently() {
        let now = Utc::now();
        let mut report = SyncRunReport::new(now, 5);
        report.record("1", EntityOutcome::Succeeded);
        report.record("2", EntityOutcome::SkippedUnmatched { ambiguous: true });
        report.record("3", EntityOutcome::SkippedUnmatched { ambiguous: false });
        report.record(
            "4",
            EntityOutcome::Errored(SyncError::Timeout {
                entity_id: "4".to_string(),
                after_ms: 4000,
            }),
        );
        report.record(
            "5",
            EntityOutcome::BlockedByValidation(CriticalFailure {
                entity_id: "5".to_string(),
                market_id: "m5".to_string(),
                team_a: "A".to_string(),
                team_b: "B".to_string(),
                side_a_probability: 0.35,
                side_b_probability: 0.65,
                failed_rules: vec![ValidationResult::fail(
                    "record_correlation",
                    Severity::Critical,
                    "better record is the underdog",
                )],
                detected_at: now,
            }),
        );

        assert_eq!(report.processed(), 5);
        assert!(report
            .summary()
            .ends_with("due=5 processed=5 ok=1 unmatched=2 (ambiguous=1) blocked=1 errored=1"));
        assert_eq!(report.skipped_unmatched, 2);
        assert_eq!(report.ambiguous, 1);
        assert_eq!(report.errors[0].entity_id, "4");
        assert_eq!(report.critical_failures[0].rule_ids(), vec!["record_correlation"]);
        assert!(!report.is_clean());
        assert!(matches!(
            report.critical_failures[0].to_error(),
            SyncError::ValidationCriticalFailure { .. }
        ));
    }
}
