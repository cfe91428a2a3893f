//! Circuit breaker for upstream HTTP APIs.
//!
//! After `failure_threshold` consecutive failures the breaker opens and calls
//! fail immediately without touching the network. Once `recovery_timeout` has
//! passed one trial call is let through (half-open); `success_threshold` successes
//! close the circuit again, any failure re-opens it.

use crate::config::env_parse;
use crate::error::Result;
use anyhow::anyhow;
use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiCircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for ApiCircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl ApiCircuitBreakerConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", d.failure_threshold)?,
            recovery_timeout: Duration::from_secs(env_parse(
                "BREAKER_RECOVERY_SECS",
                d.recovery_timeout.as_secs(),
            )?),
            success_threshold: env_parse("BREAKER_SUCCESS_THRESHOLD", d.success_threshold)?,
        })
    }
}

#[derive(Debug)]
struct BreakerState {
    state: ApiCircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct ApiCircuitBreaker {
    name: String,
    config: ApiCircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl ApiCircuitBreaker {
    pub fn new(name: &str, config: ApiCircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerState {
                state: ApiCircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, ApiCircuitBreakerConfig::default())
    }

    /// Whether a call may go out now. Moves Open -> HalfOpen once the
    /// recovery timeout has passed.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ApiCircuitState::Closed | ApiCircuitState::HalfOpen => true,
            ApiCircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    inner.state = ApiCircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::info!("API circuit breaker '{}' half-open, probing", self.name);
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == ApiCircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes < self.config.success_threshold {
                return;
            }
            tracing::info!(
                "API circuit breaker '{}' closed after {} successful calls",
                self.name,
                inner.half_open_successes
            );
        }
        inner.state = ApiCircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        match inner.state {
            ApiCircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = ApiCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(
                    "API circuit breaker '{}' OPENED after {} consecutive failures",
                    self.name,
                    inner.consecutive_failures
                );
            }
            ApiCircuitState::HalfOpen => {
                inner.state = ApiCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("API circuit breaker '{}' re-OPENED during trial call", self.name);
            }
            _ => {}
        }
    }

    /// Run `call` through the breaker, recording its outcome
    pub async fn call<T, F>(&self, call: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if !self.is_available() {
            return Err(anyhow!("{} circuit breaker open", self.name));
        }
        let result = call.await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    pub fn state(&self) -> ApiCircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }
}
