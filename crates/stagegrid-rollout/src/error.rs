//! Rollout error types.
//!
//! Pass-level failures (`ResolutionError`, `LookupError`, `QuotaError`)
//! abort the whole reconciliation pass and surface as [`RolloutError`].
//! `DispatchError` stays scoped to one unit and never aborts a pass.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for a reconciliation pass.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// A cluster selector could not be resolved against the registry.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("malformed selector `{selector}`: {reason}")]
    Malformed { selector: String, reason: String },

    #[error("cluster registry unavailable: {0}")]
    Registry(String),
}

/// The owned-unit query failed.
#[derive(Debug, Error)]
#[error("failed to list units owned by {owner}: {reason}")]
pub struct LookupError {
    pub owner: String,
    pub reason: String,
}

/// A quota field is neither a non-negative integer nor a valid percentage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field} `{value}`: {reason}")]
pub struct QuotaError {
    /// Name of the offending stage field.
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

/// The synchronize action failed for a single unit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("failed to start sync for {unit}: {reason}")]
    Spawn { unit: String, reason: String },

    #[error("sync for {unit} exited with {}: {stderr}", exit_label(.code))]
    Exit {
        unit: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("sync for {unit} did not finish within {after:?}")]
    Timeout { unit: String, after: Duration },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// Listing rollouts failed while correlating a unit event.
#[derive(Debug, Error)]
#[error("failed to list rollouts in namespace {namespace}: {reason}")]
pub struct CorrelationError {
    pub namespace: String,
    pub reason: String,
}

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("stage {stage}: {source}")]
    Resolution {
        stage: String,
        #[source]
        source: ResolutionError,
    },

    #[error("stage {stage}: {source}")]
    Lookup {
        stage: String,
        #[source]
        source: LookupError,
    },

    #[error("stage {stage}: {source}")]
    Quota {
        stage: String,
        #[source]
        source: QuotaError,
    },
}

impl RolloutError {
    /// Short machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            RolloutError::Resolution { .. } => "ResolutionError",
            RolloutError::Lookup { .. } => "LookupError",
            RolloutError::Quota { .. } => "QuotaError",
        }
    }

    /// The stage that was being evaluated when the pass aborted.
    pub fn stage(&self) -> &str {
        match self {
            RolloutError::Resolution { stage, .. }
            | RolloutError::Lookup { stage, .. }
            | RolloutError::Quota { stage, .. } => stage,
        }
    }
}
