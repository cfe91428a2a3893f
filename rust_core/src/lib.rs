//! Livesync Core - real-time synchronization of live sports events with
//! market odds.
//!
//! This crate provides:
//! - Token-bucket rate limiting for every upstream call
//! - Team-name resolution against a canonical registry
//! - Sanity rules that block implausible odds before they are published
//! - Adaptive polling driven by each event's lifecycle
//! - A sync orchestrator tying them together behind collaborator traits
//! - ESPN, Postgres and webhook implementations of those collaborators

pub mod config;
pub mod error;
pub mod models;

pub mod matching;
pub mod rate_limiter;
pub mod scheduler;
pub mod sync;
pub mod validation;

// Concrete collaborators
pub mod alerts;
pub mod circuit_breaker;
pub mod clients;
pub mod db;

pub use config::SyncConfig;
pub use error::{ErrorKind, Result, SyncError};
pub use matching::{EntityMatcher, MatchMethod, MatchResult, TeamRegistry};
pub use rate_limiter::RateLimiter;
pub use scheduler::AdaptivePollScheduler;
pub use sync::orchestrator::Collaborators;
pub use sync::{SyncOrchestrator, SyncRunReport};
pub use validation::{OddsValidator, Severity, ValidationResult};
