//! Operator alerting for blocked quotes and degraded sync runs.
//!
//! Alerts go to a Slack webhook, a custom JSON webhook and an append-only log
//! file. Each alert key is rate limited so a market that stays broken for an
//! hour produces one page, not one per poll.

use crate::config::env_parse;
use crate::error::Result;
use crate::sync::{Alerting, CriticalFailure, SyncRunReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriticalAlert {
    /// A quote failed a Critical rule and was not published
    ValidationCriticalFailure {
        failure: CriticalFailure,
        timestamp: DateTime<Utc>,
    },
    /// Every due entity in a run failed to fetch
    AllPollsFailed {
        run_id: String,
        due: usize,
        sample_error: String,
        timestamp: DateTime<Utc>,
    },
    /// Names matched several registry teams; the registry needs an alias
    AmbiguousMatches {
        run_id: String,
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CriticalAlert {
    /// Rate-limit key
    pub fn alert_key(&self) -> String {
        match self {
            CriticalAlert::ValidationCriticalFailure { failure, .. } => {
                format!("validation:{}", failure.market_id)
            }
            CriticalAlert::AllPollsFailed { .. } => "all_polls_failed".to_string(),
            CriticalAlert::AmbiguousMatches { .. } => "ambiguous_matches".to_string(),
        }
    }

    pub fn alert_type(&self) -> &'static str {
        match self {
            CriticalAlert::ValidationCriticalFailure { .. } => "validation_critical_failure",
            CriticalAlert::AllPollsFailed { .. } => "all_polls_failed",
            CriticalAlert::AmbiguousMatches { .. } => "ambiguous_matches",
        }
    }

    pub fn format_message(&self) -> String {
        match self {
            CriticalAlert::ValidationCriticalFailure { failure, timestamp } => {
                let rules: Vec<String> = failure
                    .failed_rules
                    .iter()
                    .map(|r| format!("{}: {}", r.rule_id, r.message))
                    .collect();
                format!(
                    "🚨 CRITICAL: market {} ({} vs {}) blocked at {}. Priced {:.1}% / {:.1}%. {}",
                    failure.market_id,
                    failure.team_a,
                    failure.team_b,
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    failure.side_a_probability * 100.0,
                    failure.side_b_probability * 100.0,
                    rules.join("; ")
                )
            }
            CriticalAlert::AllPollsFailed {
                run_id,
                due,
                sample_error,
                timestamp,
            } => format!(
                "🚨 CRITICAL: all {} polls failed in run {} at {}. First error: {}",
                due,
                run_id,
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                sample_error
            ),
            CriticalAlert::AmbiguousMatches {
                run_id,
                count,
                timestamp,
            } => format!(
                "⚠️ {} ambiguous team name(s) skipped in run {} at {}. Add aliases to the team registry.",
                count,
                run_id,
                timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }

    /// Alerts a degraded run should raise
    pub fn from_report(report: &SyncRunReport) -> Vec<CriticalAlert> {
        let mut alerts = Vec::new();
        if report.due > 0 && report.errored == report.due {
            alerts.push(CriticalAlert::AllPollsFailed {
                run_id: report.run_id.to_string(),
                due: report.due,
                sample_error: report
                    .errors
                    .first()
                    .map(|e| format!("{}: {}", e.entity_id, e.message))
                    .unwrap_or_default(),
                timestamp: report.finished_at,
            });
        }
        if report.ambiguous > 0 {
            alerts.push(CriticalAlert::AmbiguousMatches {
                run_id: report.run_id.to_string(),
                count: report.ambiguous,
                timestamp: report.finished_at,
            });
        }
        alerts
    }
}

#[derive(Clone, Debug)]
pub struct CriticalAlertConfig {
    pub enabled: bool,
    pub slack_webhook_url: Option<String>,
    pub custom_webhook_url: Option<String>,
    pub alert_log_path: PathBuf,
    /// Minimum seconds between alerts with the same key
    pub rate_limit_secs: u64,
}

impl Default for CriticalAlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slack_webhook_url: None,
            custom_webhook_url: None,
            alert_log_path: PathBuf::from("logs/critical_alerts.log"),
            rate_limit_secs: 300,
        }
    }
}

impl CriticalAlertConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            enabled: env_parse("CRITICAL_ALERTS_ENABLED", d.enabled)?,
            slack_webhook_url: std::env::var("SLACK_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            custom_webhook_url: std::env::var("CUSTOM_WEBHOOK_URL")
                .ok()
                .filter(|u| !u.is_empty()),
            alert_log_path: std::env::var("ALERT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.alert_log_path),
            rate_limit_secs: env_parse("ALERT_RATE_LIMIT_SECS", d.rate_limit_secs)?,
        })
    }
}

pub struct CriticalAlertClient {
    config: CriticalAlertConfig,
    http_client: reqwest::Client,
    host: String,
    last_alert_times: Arc<RwLock<FxHashMap<String, Instant>>>,
}

impl CriticalAlertClient {
    pub fn new(config: CriticalAlertConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());

        Self {
            config,
            http_client,
            host,
            last_alert_times: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Deliver an alert on every configured channel. Returns false when it was
    /// suppressed by the rate limit or disabled.
    pub async fn send_critical_alert(&self, alert: CriticalAlert) -> bool {
        if !self.config.enabled {
            info!("Critical alerts disabled, skipping: {}", alert.format_message());
            return false;
        }

        let key = alert.alert_key();
        if !self.should_send_alert(&key).await {
            info!("Rate limit: skipping alert '{}' (sent recently)", key);
            return false;
        }

        let message = format!("[{}] {}", self.host, alert.format_message());
        warn!("Sending critical alert: {}", message);

        if let Some(webhook_url) = &self.config.slack_webhook_url {
            if let Err(e) = self.send_slack_alert(webhook_url, &message).await {
                error!("Failed to send Slack alert: {}", e);
            }
        }

        if let Some(webhook_url) = &self.config.custom_webhook_url {
            if let Err(e) = self.send_webhook_alert(webhook_url, &alert).await {
                error!("Failed to send custom webhook alert: {}", e);
            }
        }

        if let Err(e) = self.log_to_file(&alert).await {
            error!("Failed to log alert to file: {}", e);
        }

        self.last_alert_times.write().await.insert(key, Instant::now());
        true
    }

    async fn should_send_alert(&self, key: &str) -> bool {
        let times = self.last_alert_times.read().await;
        match times.get(key) {
            Some(last) => last.elapsed().as_secs() >= self.config.rate_limit_secs,
            None => true,
        }
    }

    async fn send_slack_alert(&self, webhook_url: &str, message: &str) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "text": message,
            "username": "Livesync Alerts",
            "icon_emoji": ":rotating_light:"
        });

        let response = self
            .http_client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack webhook returned {}: {}", status, body);
        }
        Ok(())
    }

    async fn send_webhook_alert(&self, webhook_url: &str, alert: &CriticalAlert) -> anyhow::Result<()> {
        let response = self
            .http_client
            .post(webhook_url)
            .json(&serde_json::json!({ "host": self.host, "alert": alert }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Custom webhook returned {}: {}", status, body);
        }
        Ok(())
    }

    async fn log_to_file(&self, alert: &CriticalAlert) -> anyhow::Result<()> {
        if let Some(parent) = self.config.alert_log_path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.alert_log_path)
            .await?;

        let log_entry = format!(
            "{} | {} | {} | {}\n",
            Utc::now().to_rfc3339(),
            self.host,
            alert.alert_type(),
            serde_json::to_string(alert)?
        );

        file.write_all(log_entry.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl Alerting for CriticalAlertClient {
    async fn notify(&self, report: &SyncRunReport) -> anyhow::Result<()> {
        if report.due > 0 {
            info!(
                run_id = %report.run_id,
                due = report.due,
                succeeded = report.succeeded,
                skipped_unmatched = report.skipped_unmatched,
                blocked = report.blocked_by_validation,
                errored = report.errored,
                "Sync run complete"
            );
        }
        for alert in CriticalAlert::from_report(report) {
            self.send_critical_alert(alert).await;
        }
        Ok(())
    }

    async fn critical_failure(&self, failure: &CriticalFailure) -> anyhow::Result<()> {
        self.send_critical_alert(CriticalAlert::ValidationCriticalFailure {
            failure: failure.clone(),
            timestamp: failure.detected_at,
        })
        .await;
        Ok(())
    }
}
