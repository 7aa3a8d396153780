//! Error taxonomy for the orchestrator.
//!
//! Every variant here maps to one of the categories in the error-handling
//! design: `ConfigError` is fatal only at startup, `StoreError` /
//! `ProviderError` / `DeadlineError` are recovered locally within a cycle,
//! `PolicyError` aborts only the offending decision, and `CancelledError`
//! is cooperative shutdown. Nothing here is allowed to cross a cycle
//! boundary uncaught.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization failure: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("source {source_name} returned no data: {reason}")]
    Empty { source_name: String, reason: String },

    #[error("source {source_name} request failed: {reason}")]
    Request { source_name: String, reason: String },

    #[error("source {source_name} rate limited")]
    RateLimited { source_name: String },
}

#[derive(Debug, Error)]
#[error("operation {operation} exceeded its {budget_ms}ms deadline")]
pub struct DeadlineError {
    pub operation: String,
    pub budget_ms: u64,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("duplicate goal id: {0}")]
    DuplicateGoalId(String),

    #[error("attempted to mutate a non-modifiable goal: {0}")]
    NonModifiableGoal(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct CancelledError;

/// Top-level error a cycle phase can surface; every variant is recovered
/// locally by the orchestrator except where phase 1-3 data gathering fails
/// outright, which aborts only the current cycle.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Deadline(#[from] DeadlineError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}

impl From<DeadlineError> for ProviderError {
    fn from(d: DeadlineError) -> Self {
        ProviderError::Request {
            source_name: d.operation,
            reason: format!("deadline exceeded ({}ms)", d.budget_ms),
        }
    }
}
