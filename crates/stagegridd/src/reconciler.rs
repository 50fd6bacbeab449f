//! Runs one pass for a queued rollout and records the outcome.
//!
//! Pass errors are retried with exponential backoff tracked per rollout.
//! A successful pass clears the backoff and, for `RequeueAfter`, asks for
//! the rollout to be queued again after the controller's delay.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use stagegrid_rollout::{PassOutcome, PassReport, StageController};
use stagegrid_state::{RolloutKey, RolloutPhase, RolloutStatus, StateStore};

/// First retry delay after a failed pass.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bound on the retry delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Consecutive failure counts per rollout.
#[derive(Debug)]
pub struct ErrorBackoff {
    base: Duration,
    cap: Duration,
    failures: HashMap<RolloutKey, u32>,
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_CAP)
    }
}

impl ErrorBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: HashMap::new(),
        }
    }

    /// Count a failure and return `(consecutive failures, retry delay)`.
    pub fn record_failure(&mut self, key: &RolloutKey) -> (u32, Duration) {
        let count = self.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        let factor = 1u32.checked_shl(*count - 1).unwrap_or(u32::MAX);
        (*count, self.base.saturating_mul(factor).min(self.cap))
    }

    pub fn reset(&mut self, key: &RolloutKey) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &RolloutKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

/// Loads a rollout, runs the controller over it and persists the status.
pub struct Reconciler {
    store: StateStore,
    controller: StageController,
    backoff: ErrorBackoff,
}

impl Reconciler {
    pub fn new(store: StateStore, controller: StageController) -> Self {
        Self {
            store,
            controller,
            backoff: ErrorBackoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: ErrorBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Process `key`. Returns the delay after which it should run again, if any.
    pub async fn process(&mut self, key: &RolloutKey) -> Option<Duration> {
        let rollout = match self.store.get_rollout(key) {
            Ok(Some(rollout)) => rollout,
            Ok(None) => {
                debug!(rollout = %key, "rollout gone, skipping");
                self.backoff.reset(key);
                return None;
            }
            Err(e) => {
                let (_, delay) = self.backoff.record_failure(key);
                error!(rollout = %key, error = %e, ?delay, "failed to load rollout");
                return Some(delay);
            }
        };

        info!(rollout = %key, "reconciling rollout");
        match self.controller.reconcile(&rollout.spec).await {
            Ok(report) => {
                self.backoff.reset(key);
                self.record(key, status_from_report(&report));
                match report.outcome {
                    PassOutcome::RequeueAfter { delay, .. } => Some(delay),
                    _ => None,
                }
            }
            Err(e) => {
                let (count, delay) = self.backoff.record_failure(key);
                warn!(
                    rollout = %key,
                    stage = %e.stage(),
                    kind = e.kind(),
                    error = %e,
                    attempts = count,
                    ?delay,
                    "reconciliation pass failed"
                );
                self.record(
                    key,
                    RolloutStatus {
                        phase: RolloutPhase::Failed,
                        stage: Some(e.stage().to_string()),
                        message: format!("{} in stage {}", e.kind(), e.stage()),
                        last_error: Some(e.to_string()),
                        consecutive_errors: count,
                        updated_at: unix_now(),
                    },
                );
                Some(delay)
            }
        }
    }

    fn record(&self, key: &RolloutKey, status: RolloutStatus) {
        match self.store.put_rollout_status(key, &status) {
            Ok(true) => {}
            Ok(false) => debug!(rollout = %key, "rollout deleted during pass, status not recorded"),
            Err(e) => error!(rollout = %key, error = %e, "failed to record rollout status"),
        }
    }
}

/// Summarize a successful pass.
pub fn status_from_report(report: &PassReport) -> RolloutStatus {
    let (phase, stage, message) = match &report.outcome {
        PassOutcome::Complete => (
            RolloutPhase::Completed,
            None,
            format!("all {} stages complete", report.stages.len()),
        ),
        PassOutcome::RequeueAfter {
            stage,
            delay,
            candidates,
        } => (
            RolloutPhase::Requeued,
            Some(stage.clone()),
            format!(
                "{} deferred units, retrying in {}s",
                candidates.len(),
                delay.as_secs()
            ),
        ),
        PassOutcome::StageIncomplete { stage } => {
            let (done, target, in_flight) = report
                .last_stage()
                .map(|s| (s.done, s.quota.max_clusters, s.in_progress + s.dispatched.len()))
                .unwrap_or_default();
            let phase = if in_flight > 0 {
                RolloutPhase::Progressing
            } else {
                RolloutPhase::Waiting
            };
            (
                phase,
                Some(stage.clone()),
                format!("{done}/{target} units done, {in_flight} in flight"),
            )
        }
    };

    RolloutStatus {
        phase,
        stage,
        message,
        last_error: None,
        consecutive_errors: 0,
        updated_at: unix_now(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
