use crate::circuit_breaker::{ApiCircuitBreaker, ApiCircuitBreakerConfig};
use crate::models::{
    moneyline_to_probability, LifecycleState, MatchedEntity, OddsQuote, RawEventState, Sport,
    TeamRecord, TrackedEntity,
};
use crate::sync::{EntityFeed, LiveStateSource, MarketSource};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_ESPN_BASE_URL: &str = "http://site.api.espn.com";

/// A summary payload is reused for this long, so the state fetch and the
/// quote fetch of one sync pass share a single HTTP request
const SUMMARY_CACHE_TTL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct EspnClient {
    client: Client,
    base_url: String,
    sports: Vec<Sport>,
    circuit_breaker: Arc<ApiCircuitBreaker>,
    summaries: Arc<Mutex<FxHashMap<String, (Instant, Value)>>>,
}

impl std::fmt::Debug for EspnClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EspnClient")
            .field("sports", &self.sports)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl EspnClient {
    pub fn with_config(sports: Vec<Sport>, base_url: &str, breaker: ApiCircuitBreakerConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            sports,
            circuit_breaker: Arc::new(ApiCircuitBreaker::new("espn", breaker)),
            summaries: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        self.circuit_breaker.call(self.fetch_json(url)).await
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("ESPN returned HTTP {} for {}", status, url));
        }
        Ok(resp.json::<Value>().await?)
    }

    /// Events on today's scoreboard for one sport
    pub async fn scoreboard(&self, sport: Sport) -> Result<Vec<TrackedEntity>> {
        let (sport_path, league) = sport.espn_path();
        let url = format!(
            "{}/apis/site/v2/sports/{}/{}/scoreboard",
            self.base_url, sport_path, league
        );
        let data = self.get_json(&url).await?;
        Ok(parse_scoreboard(sport, &data))
    }

    async fn summary(&self, sport: Sport, event_id: &str) -> Result<Value> {
        let cached = self
            .summaries
            .lock()
            .get(event_id)
            .filter(|(at, _)| at.elapsed() < SUMMARY_CACHE_TTL)
            .map(|(_, data)| data.clone());
        if let Some(data) = cached {
            return Ok(data);
        }

        let (sport_path, league) = sport.espn_path();
        let url = format!(
            "{}/apis/site/v2/sports/{}/{}/summary?event={}",
            self.base_url, sport_path, league, event_id
        );
        let data = self.get_json(&url).await?;

        {
            let mut summaries = self.summaries.lock();
            summaries.retain(|_, (at, _)| at.elapsed() < SUMMARY_CACHE_TTL);
            summaries.insert(event_id.to_string(), (Instant::now(), data.clone()));
        }
        Ok(data)
    }
}

#[async_trait]
impl EntityFeed for EspnClient {
    async fn list_tracked_entities(&self) -> Result<Vec<TrackedEntity>> {
        let mut entities = Vec::new();
        let mut last_error = None;
        for sport in &self.sports {
            match self.scoreboard(*sport).await {
                Ok(mut events) => entities.append(&mut events),
                Err(e) => {
                    warn!("ESPN scoreboard for {} failed: {:#}", sport.as_str(), e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if entities.is_empty() && !self.sports.is_empty() => Err(e),
            _ => Ok(entities),
        }
    }
}

#[async_trait]
impl LiveStateSource for EspnClient {
    async fn fetch(&self, entity: &TrackedEntity) -> Result<RawEventState> {
        let data = self.summary(entity.sport, &entity.external_id).await?;
        parse_event_state(&entity.external_id, &data, Utc::now())
    }

    fn source_name(&self) -> &str {
        "espn"
    }
}

#[async_trait]
impl MarketSource for EspnClient {
    async fn fetch_quote(&self, matched: &MatchedEntity) -> Result<Option<OddsQuote>> {
        let entity = &matched.entity;
        let data = self.summary(entity.sport, &entity.external_id).await?;
        let quote = parse_pickcenter(&entity.external_id, &data, Utc::now());
        if quote.is_none() {
            debug!("No ESPN moneyline for {}", entity.external_id);
        }
        Ok(quote)
    }
}

// ============================================================================
// Payload parsing
// ============================================================================

struct Competitor {
    name: String,
    score: u16,
    record: Option<TeamRecord>,
}

/// Home and away competitor of a `competitions[0]` object
fn parse_competitors(competition: &Value) -> (Option<Competitor>, Option<Competitor>) {
    let mut home = None;
    let mut away = None;
    for comp in competition["competitors"].as_array().into_iter().flatten() {
        let team = &comp["team"];
        let name = team["displayName"]
            .as_str()
            .or_else(|| team["name"].as_str())
            .unwrap_or_default()
            .to_string();
        let score = match &comp["score"] {
            Value::String(s) => s.parse::<u16>().unwrap_or(0),
            Value::Number(n) => n.as_u64().unwrap_or(0) as u16,
            _ => 0,
        };
        // Scoreboard uses `records`, summary header uses `record`
        let record = comp["records"]
            .as_array()
            .or_else(|| comp["record"].as_array())
            .and_then(|records| {
                records
                    .iter()
                    .find(|r| r["type"].as_str().map_or(true, |t| t == "total"))
                    .and_then(|r| r["summary"].as_str().or_else(|| r["displayValue"].as_str()))
            })
            .and_then(TeamRecord::parse);

        let parsed = Competitor { name, score, record };
        if comp["homeAway"].as_str() == Some("home") {
            home = Some(parsed);
        } else {
            away = Some(parsed);
        }
    }
    (home, away)
}

fn parse_status(status: &Value) -> (LifecycleState, u8, u32) {
    let lifecycle = LifecycleState::from_espn_status(
        status["type"]["name"].as_str().unwrap_or("STATUS_SCHEDULED"),
    );
    let period = status["period"].as_u64().unwrap_or(0).min(u8::MAX as u64) as u8;
    let clock = parse_clock(status["displayClock"].as_str().unwrap_or("0:00"));
    (lifecycle, period, clock)
}

/// Scoreboard events as entities to track. Home team is side A.
pub fn parse_scoreboard(sport: Sport, data: &Value) -> Vec<TrackedEntity> {
    let mut entities = Vec::new();
    for event in data["events"].as_array().into_iter().flatten() {
        let Some(id) = event["id"].as_str() else {
            continue;
        };
        let competition = &event["competitions"][0];
        let (Some(home), Some(away)) = parse_competitors(competition) else {
            debug!("Skipping ESPN event {} without two competitors", id);
            continue;
        };
        let status = if event["status"].is_object() {
            &event["status"]
        } else {
            &competition["status"]
        };
        let (lifecycle, period, clock) = parse_status(status);

        let mut entity = TrackedEntity::scheduled(id, sport, &home.name, &away.name);
        entity.lifecycle_state = lifecycle;
        entity.period = period;
        entity.clock_remaining_secs = clock;
        entity.score_a = home.score;
        entity.score_b = away.score;
        entities.push(entity);
    }
    entities
}

/// Live state from an event summary payload
pub fn parse_event_state(
    event_id: &str,
    data: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<RawEventState> {
    let competition = &data["header"]["competitions"][0];
    if !competition.is_object() {
        return Err(anyhow!("ESPN summary for {} has no competition", event_id));
    }
    let (Some(home), Some(away)) = parse_competitors(competition) else {
        return Err(anyhow!("ESPN summary for {} lacks home/away competitors", event_id));
    };
    let (lifecycle_state, period, clock_remaining_secs) = parse_status(&competition["status"]);

    Ok(RawEventState {
        external_id: event_id.to_string(),
        side_a: home.name,
        side_b: away.name,
        lifecycle_state,
        period,
        clock_remaining_secs,
        score_a: home.score,
        score_b: away.score,
        side_a_record: home.record,
        side_b_record: away.record,
        neutral_site: competition["neutralSite"].as_bool().unwrap_or(false),
        fetched_at,
    })
}

/// First pickcenter entry with both moneylines, as implied probabilities
pub fn parse_pickcenter(event_id: &str, data: &Value, observed_at: DateTime<Utc>) -> Option<OddsQuote> {
    data["pickcenter"].as_array()?.iter().find_map(|pick| {
        let home = moneyline_to_probability(pick["homeTeamOdds"]["moneyLine"].as_f64()?)?;
        let away = moneyline_to_probability(pick["awayTeamOdds"]["moneyLine"].as_f64()?)?;
        let provider = pick["provider"]["name"].as_str().map(|s| s.to_string());
        let slug = provider
            .as_deref()
            .unwrap_or("espn")
            .to_lowercase()
            .replace(' ', "-");
        let mut quote = OddsQuote::new(&format!("espn:{}:{}", event_id, slug), home, away, observed_at);
        quote.provider = provider;
        Some(quote)
    })
}

/// Parse clock string like "12:34" or "5:00" into seconds
fn parse_clock(clock: &str) -> u32 {
    let parts: Vec<&str> = clock.split(':').collect();
    match parts.len() {
        2 => {
            let mins = parts[0].parse::<u32>().unwrap_or(0);
            let secs = parts[1].parse::<f64>().unwrap_or(0.0) as u32;
            mins.saturating_mul(60).saturating_add(secs)
        }
        1 => parts[0].parse::<f64>().unwrap_or(0.0) as u32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_fixture() -> Value {
        json!({
            "header": {
                "competitions": [{
                    "status": {
                        "period": 4,
                        "displayClock": "2:41",
                        "type": { "name": "STATUS_IN_PROGRESS" }
                    },
                    "competitors": [
                        {
                            "homeAway": "home",
                            "score": "24",
                            "team": { "displayName": "Boise State Broncos" },
                            "record": [{ "type": "total", "summary": "9-1" }]
                        },
                        {
                            "homeAway": "away",
                            "score": "21",
                            "team": { "displayName": "San Diego State Aztecs" },
                            "record": [{ "type": "total", "summary": "3-7" }]
                        }
                    ]
                }]
            },
            "pickcenter": [
                { "provider": { "name": "Empty Book" }, "homeTeamOdds": {}, "awayTeamOdds": {} },
                {
                    "provider": { "name": "ESPN BET" },
                    "homeTeamOdds": { "moneyLine": -150 },
                    "awayTeamOdds": { "moneyLine": 130 }
                }
            ]
        })
    }

    #[test]
    fn test_client_reports_source_name() {
        let client = EspnClient::with_config(
            vec![Sport::NCAAF],
            "http://localhost:9/",
            ApiCircuitBreakerConfig::default(),
        );
        assert_eq!(LiveStateSource::source_name(&client), "espn");
        assert!(format!("{:?}", client).contains("NCAAF"));
    }

    #[test]
    fn test_parse_event_state() {
        let state = parse_event_state("401", &summary_fixture(), Utc::now()).unwrap();
        assert_eq!(state.side_a, "Boise State Broncos");
        assert_eq!(state.side_b, "San Diego State Aztecs");
        assert_eq!(state.lifecycle_state, LifecycleState::InProgress);
        assert_eq!(state.period, 4);
        assert_eq!(state.clock_remaining_secs, 161);
        assert_eq!((state.score_a, state.score_b), (24, 21));
        assert_eq!(state.side_a_record, Some(TeamRecord::new(9, 1)));
        assert_eq!(state.side_b_record, Some(TeamRecord::new(3, 7)));
        assert!(!state.neutral_site);
    }

    #[test]
    fn test_parse_event_state_neutral_site() {
        let mut data = summary_fixture();
        data["header"]["competitions"][0]["neutralSite"] = json!(true);
        let state = parse_event_state("401", &data, Utc::now()).unwrap();
        assert!(state.neutral_site);
    }

    #[test]
    fn test_parse_event_state_missing_competition() {
        assert!(parse_event_state("401", &json!({}), Utc::now()).is_err());
    }

    #[test]
    fn test_parse_pickcenter_skips_incomplete_lines() {
        let quote = parse_pickcenter("401", &summary_fixture(), Utc::now()).unwrap();
        assert_eq!(quote.market_id, "espn:401:espn-bet");
        assert_eq!(quote.provider.as_deref(), Some("ESPN BET"));
        assert!((quote.side_a_probability - 0.6).abs() < 1e-9);
        assert!((quote.side_b_probability - 100.0 / 230.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_pickcenter_absent() {
        assert!(parse_pickcenter("401", &json!({ "header": {} }), Utc::now()).is_none());
    }

    #[test]
    fn test_parse_scoreboard() {
        let data = json!({
            "events": [
                {
                    "id": "401",
                    "status": { "period": 0, "displayClock": "0:00", "type": { "name": "STATUS_SCHEDULED" } },
                    "competitions": [{
                        "competitors": [
                            { "homeAway": "away", "score": "0", "team": { "displayName": "Michigan State Spartans" } },
                            { "homeAway": "home", "score": "0", "team": { "displayName": "Michigan Wolverines" } }
                        ]
                    }]
                },
                { "id": "402", "competitions": [{ "competitors": [] }] }
            ]
        });
        let entities = parse_scoreboard(Sport::NCAAF, &data);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].side_a, "Michigan Wolverines");
        assert_eq!(entities[0].side_b, "Michigan State Spartans");
        assert_eq!(entities[0].lifecycle_state, LifecycleState::Scheduled);
        assert!(entities[0].last_polled_at.is_none());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("12:34"), 754);
        assert_eq!(parse_clock("5:00"), 300);
        assert_eq!(parse_clock("45.3"), 45);
        assert_eq!(parse_clock(""), 0);
        // Garbage from the feed must not overflow
        assert_eq!(parse_clock("4294967295:59"), u32::MAX);
        assert_eq!(parse_clock("99999999:00"), u32::MAX);
    }
}
