//! Error taxonomy for the sync engine.
//!
//! Per-entity errors are recorded in the run report and never abort a run.
//! Only `Configuration` is fatal, and only at startup.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Fetch for {entity_id} timed out after {after_ms}ms")]
    Timeout { entity_id: String, after_ms: u64 },

    #[error("Rate limit exceeded: waited {waited_ms}ms for {cost} token(s)")]
    RateLimitExceeded { cost: u32, waited_ms: u64 },

    #[error("Unresolved entity: {raw}")]
    UnresolvedEntity { raw: String },

    #[error("Ambiguous match for '{raw}': {candidates:?}")]
    AmbiguousMatch { raw: String, candidates: Vec<String> },

    #[error("Critical validation failure on market {market_id}: {rules:?}")]
    ValidationCriticalFailure { market_id: String, rules: Vec<String> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// How the orchestrator treats an error for scheduling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Poll counted as failed, interval unchanged
    Transient,
    /// Expected data-quality outcome, not an error of the run
    DataQuality,
    /// Needs operator attention
    Operator,
    Fatal,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout { .. } | Self::RateLimitExceeded { .. } => {
                ErrorKind::Transient
            }
            Self::UnresolvedEntity { .. } => ErrorKind::DataQuality,
            Self::AmbiguousMatch { .. } | Self::ValidationCriticalFailure { .. } => {
                ErrorKind::Operator
            }
            Self::Storage(_) => ErrorKind::Transient,
            Self::Configuration(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        Self::Network(format!("{:#}", e))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
