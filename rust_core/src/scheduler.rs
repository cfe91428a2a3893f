//! Adaptive polling: decides which tracked entities are due for a fetch.
//!
//! The polling interval follows the event's lifecycle. Scheduled events are
//! checked once a minute, live events every few seconds, and close games in
//! their final period fastest of all. Final events leave the active set.

use crate::config::SchedulerConfig;
use crate::models::{LifecycleState, RawEventState, TrackedEntity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Default)]
struct SchedulerState {
    active: FxHashMap<String, TrackedEntity>,
    in_flight: FxHashSet<String>,
    /// Entity id -> time it reached Final
    finished: FxHashMap<String, DateTime<Utc>>,
    /// Active entity id -> consecutive feed listings it was missing from
    feed_misses: FxHashMap<String, u32>,
}

pub struct AdaptivePollScheduler {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl AdaptivePollScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Interval for an entity in its current state. `None` for Final.
    pub fn interval_for(&self, entity: &TrackedEntity) -> Option<Duration> {
        match entity.lifecycle_state {
            LifecycleState::Final => None,
            LifecycleState::Scheduled => Some(self.config.scheduled_interval),
            LifecycleState::Halftime => Some(self.config.halftime_interval),
            LifecycleState::InProgress => {
                if entity.sport.is_final_period(entity.period)
                    && entity.score_margin() <= self.config.close_game_margin
                {
                    Some(self.config.close_game_interval)
                } else {
                    Some(self.config.live_interval)
                }
            }
        }
    }

    /// Start tracking an entity. Returns false if it is already tracked or has
    /// already finished.
    pub fn track(&self, mut entity: TrackedEntity) -> bool {
        let mut state = self.state.lock();
        if state.active.contains_key(&entity.external_id)
            || state.finished.contains_key(&entity.external_id)
        {
            return false;
        }
        if entity.lifecycle_state.is_terminal() {
            debug!("Not tracking {}: already final", entity.external_id);
            return false;
        }
        entity.current_interval = self
            .interval_for(&entity)
            .unwrap_or(self.config.scheduled_interval);
        debug!(
            "Tracking {} ({} vs {}) every {:?}",
            entity.external_id, entity.side_a, entity.side_b, entity.current_interval
        );
        state.active.insert(entity.external_id.clone(), entity);
        true
    }

    /// Reconcile with a fresh feed listing. New entities are tracked; active
    /// entities missing from `feed_miss_limit` listings in a row are dropped.
    /// Returns how many were added.
    pub fn sync_entities(&self, entities: Vec<TrackedEntity>) -> usize {
        let listed: FxHashSet<String> = entities.iter().map(|e| e.external_id.clone()).collect();
        let added = entities.into_iter().filter(|e| self.track(e.clone())).count();

        let mut state = self.state.lock();
        let state = &mut *state;
        state.feed_misses.retain(|id, _| !listed.contains(id));

        let mut retired = Vec::new();
        for id in state.active.keys().filter(|id| !listed.contains(*id)) {
            let misses = state.feed_misses.entry(id.clone()).or_insert(0);
            *misses += 1;
            if *misses >= self.config.feed_miss_limit {
                retired.push(id.clone());
            }
        }
        for id in &retired {
            state.active.remove(id);
            state.in_flight.remove(id);
            state.feed_misses.remove(id);
            info!("{} dropped from the feed, no longer polling", id);
        }
        added
    }

    /// Entities due for a poll at `now`, sorted by id. Never returns Final or
    /// in-flight entities.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<TrackedEntity> {
        let state = self.state.lock();
        let mut due: Vec<TrackedEntity> = state
            .active
            .values()
            .filter(|e| !e.lifecycle_state.is_terminal())
            .filter(|e| !state.in_flight.contains(&e.external_id))
            .filter(|e| is_due(e, now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        due
    }

    pub fn mark_in_flight<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut state = self.state.lock();
        for id in ids {
            if state.active.contains_key(id) {
                state.in_flight.insert(id.to_string());
            }
        }
    }

    /// Fold a successful fetch into the entity and recompute its interval.
    /// Returns the updated entity; a Final entity is moved out of the active set.
    pub fn record_poll(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
        new_state: &RawEventState,
    ) -> Option<TrackedEntity> {
        let mut state = self.state.lock();
        state.in_flight.remove(entity_id);

        let Some(entity) = state.active.get_mut(entity_id) else {
            warn!("record_poll for untracked entity {}", entity_id);
            return None;
        };

        entity.apply(new_state);
        entity.last_polled_at = Some(now);

        match self.interval_for(entity) {
            Some(interval) => {
                if interval != entity.current_interval {
                    info!(
                        "Poll interval for {} ({}) {:?} -> {:?}",
                        entity_id,
                        entity.lifecycle_state.as_str(),
                        entity.current_interval,
                        interval
                    );
                    entity.current_interval = interval;
                }
                Some(entity.clone())
            }
            None => {
                state.feed_misses.remove(entity_id);
                let finished = state.active.remove(entity_id)?;
                info!(
                    "{} is final ({} {} - {} {}), no longer polling",
                    entity_id, finished.side_a, finished.score_a, finished.side_b, finished.score_b
                );
                state.finished.insert(entity_id.to_string(), now);
                Some(finished)
            }
        }
    }

    /// A failed or timed-out poll: stamp the attempt and keep the interval
    pub fn record_failure(&self, entity_id: &str, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.in_flight.remove(entity_id);
        let scheduled_interval = self.config.scheduled_interval;
        if let Some(entity) = state.active.get_mut(entity_id) {
            entity.last_polled_at = Some(now);
            if entity.current_interval.is_zero() {
                entity.current_interval = scheduled_interval;
            }
        }
    }

    /// Forget finished entities older than `retention`; returns how many
    pub fn prune_finished(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        let mut state = self.state.lock();
        let before = state.finished.len();
        state.finished.retain(|_, finished_at| now.signed_duration_since(*finished_at) < retention);
        let pruned = before - state.finished.len();
        if pruned > 0 {
            debug!("Pruned {} finished entities", pruned);
        }
        pruned
    }

    pub fn get(&self, entity_id: &str) -> Option<TrackedEntity> {
        self.state.lock().active.get(entity_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn finished_count(&self) -> usize {
        self.state.lock().finished.len()
    }

    pub fn is_finished(&self, entity_id: &str) -> bool {
        self.state.lock().finished.contains_key(entity_id)
    }
}

fn is_due(entity: &TrackedEntity, now: DateTime<Utc>) -> bool {
    match entity.last_polled_at {
        None => true,
        Some(last) => match now.signed_duration_since(last).to_std() {
            Ok(elapsed) => elapsed >= entity.current_interval,
            // Clock went backwards relative to the last poll
            Err(_) => false,
        },
    }
}
