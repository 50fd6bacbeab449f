//! Stage controller: one reconciliation pass over a rollout.
//!
//! Nothing is carried between passes. Each pass re-derives every stage's
//! cluster sets and unit statuses from live state, walks the stages in
//! declared order and stops at the first one that is not complete:
//!
//! 1. Snapshot: resolve selectors, partition clusters, match units.
//! 2. Plan: classify units, compute quotas.
//! 3. Admit: dispatch syncs for up to `stage_max_unavailable` to-do units.
//! 4. Requeue: if the budget exceeds what the stage can act on and
//!    deferred units exist, stop and ask to be retried after a delay.
//! 5. Complete: stop while `done < stage_max_clusters`, else move on.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use stagegrid_state::{ClusterRecord, RolloutSpec, Stage};

use crate::classify::classify;
use crate::dispatch::{dispatch_batch, DispatchFailure, SyncDispatcher};
use crate::error::{ResolutionError, RolloutError, RolloutResult};
use crate::matcher::{partition_units, UnitLookup, UnitPartition};
use crate::partition::stage_set;
use crate::quota::{QuotaInputs, QuotaPlan, RoundingMode};
use crate::selector::{resolve_expr, ClusterRegistry};

/// Default delay before a requeued rollout is evaluated again.
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(60);

/// Tunables for the stage controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Delay returned with [`PassOutcome::RequeueAfter`].
    pub requeue_delay: Duration,
    /// Rounding applied to percentage quotas.
    pub rounding: RoundingMode,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            rounding: RoundingMode::Down,
        }
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every stage is complete; nothing further to schedule.
    Complete,
    /// `stage` is still converging; wait for the next status event.
    StageIncomplete { stage: String },
    /// Deferred clusters block `stage`; evaluate again after `delay`.
    RequeueAfter {
        stage: String,
        delay: Duration,
        /// Deferred units that would have been eligible.
        candidates: Vec<String>,
    },
}

/// Cluster and unit sets of one stage in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSnapshot {
    pub cluster_set: Vec<ClusterRecord>,
    pub requeue_set: Vec<ClusterRecord>,
    /// `cluster_set \ requeue_set`, sorted by name.
    pub stage_set: Vec<ClusterRecord>,
    pub units: UnitPartition,
}

/// What the controller saw and did in one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub cluster_units: usize,
    pub requeue_units: usize,
    pub stage_units: usize,
    pub done: usize,
    pub in_progress: usize,
    pub to_do: usize,
    pub quota: QuotaPlan,
    /// Units whose sync was requested this pass.
    pub dispatched: Vec<String>,
    pub failures: Vec<DispatchFailure>,
}

/// Result of a full pass: the outcome plus a report per evaluated stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub stages: Vec<StageReport>,
}

impl PassReport {
    /// Report of the last stage evaluated, if any.
    pub fn last_stage(&self) -> Option<&StageReport> {
        self.stages.last()
    }

    /// Total syncs requested across all stages.
    pub fn dispatched(&self) -> usize {
        self.stages.iter().map(|s| s.dispatched.len()).sum()
    }
}

/// Evaluates rollouts against live cluster and unit state.
#[derive(Clone)]
pub struct StageController {
    registry: Arc<dyn ClusterRegistry>,
    units: Arc<dyn UnitLookup>,
    dispatcher: Arc<dyn SyncDispatcher>,
    settings: ControllerSettings,
}

impl StageController {
    pub fn new(
        registry: Arc<dyn ClusterRegistry>,
        units: Arc<dyn UnitLookup>,
        dispatcher: Arc<dyn SyncDispatcher>,
    ) -> Self {
        Self {
            registry,
            units,
            dispatcher,
            settings: ControllerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Build the cluster and unit sets for `stage`.
    ///
    /// Fails if a selector cannot be resolved or owned units cannot be listed.
    pub fn snapshot(&self, spec: &RolloutSpec, stage: &Stage) -> RolloutResult<StageSnapshot> {
        let resolution = |source: ResolutionError| RolloutError::Resolution {
            stage: stage.name.clone(),
            source,
        };

        // Every cluster the stage targets, including the ones deferred below.
        let cluster_set = resolve_expr(self.registry.as_ref(), &stage.clusters).map_err(resolution)?;
        let requeue_set = match &stage.requeue {
            Some(expr) => resolve_expr(self.registry.as_ref(), expr).map_err(resolution)?,
            None => Vec::new(),
        };
        let stage_set = stage_set(&cluster_set, &requeue_set);
        for cluster in &stage_set {
            debug!(stage = %stage.name, cluster = %cluster.name, "stage cluster");
        }
        for cluster in &requeue_set {
            debug!(stage = %stage.name, cluster = %cluster.name, "requeue cluster");
        }

        let owned = self
            .units
            .list_owned(&spec.source_ref)
            .map_err(|source| RolloutError::Lookup {
                stage: stage.name.clone(),
                source,
            })?;
        let units = partition_units(&owned, &cluster_set, &requeue_set, &stage_set);

        Ok(StageSnapshot {
            cluster_set,
            requeue_set,
            stage_set,
            units,
        })
    }

    /// Run one pass over `spec`.
    pub async fn reconcile(&self, spec: &RolloutSpec) -> RolloutResult<PassReport> {
        let mut reports = Vec::with_capacity(spec.stages.len());

        for stage in &spec.stages {
            info!(stage = %stage.name, "stage started");

            let snapshot = self.snapshot(spec, stage)?;
            let units = &snapshot.units;
            let status = classify(&units.stage_units);
            for unit in &status.to_do {
                debug!(unit = %unit.name, health = ?unit.health, sync = ?unit.sync, "to-do unit");
            }
            for unit in &status.in_progress {
                debug!(unit = %unit.name, health = ?unit.health, sync = ?unit.sync, "in-progress unit");
            }

            let quota = QuotaPlan::compute(
                stage,
                QuotaInputs {
                    cluster_units: units.cluster_units.len(),
                    stage_units: units.stage_units.len(),
                    done: status.done.len(),
                    in_progress: status.in_progress.len(),
                },
                self.settings.rounding,
            )
            .map_err(|source| RolloutError::Quota {
                stage: stage.name.clone(),
                source,
            })?;

            debug!(
                stage = %stage.name,
                max_clusters = quota.max_clusters,
                max_unavailable = quota.max_unavailable,
                stage_max_clusters = quota.stage_max_clusters,
                stage_max_unavailable = quota.stage_max_unavailable,
                to_do = status.to_do.len(),
                in_progress = status.in_progress.len(),
                done = status.done.len(),
                stage_units = units.stage_units.len(),
                requeue_units = units.requeue_units.len(),
                "rollout plan"
            );

            let admitted = quota.admission_count(status.to_do.len());
            let batch = dispatch_batch(self.dispatcher.as_ref(), &status.to_do[..admitted]).await;

            let report = StageReport {
                stage: stage.name.clone(),
                cluster_units: units.cluster_units.len(),
                requeue_units: units.requeue_units.len(),
                stage_units: units.stage_units.len(),
                done: status.done.len(),
                in_progress: status.in_progress.len(),
                to_do: status.to_do.len(),
                quota,
                dispatched: batch.synced,
                failures: batch.failures,
            };

            // More budget than units the stage can act on: the rest sit on
            // deferred clusters.
            if quota.stage_max_clusters > status.to_do.len() as i64
                && !units.requeue_units.is_empty()
            {
                let wanted = (quota.max_clusters - units.stage_units.len() as i64).max(0) as usize;
                let candidates: Vec<String> = units
                    .requeue_units
                    .iter()
                    .take(wanted)
                    .map(|u| u.name.clone())
                    .collect();
                for name in &candidates {
                    info!(stage = %stage.name, unit = %name, "requeuing unit");
                }
                reports.push(report);
                return Ok(PassReport {
                    outcome: PassOutcome::RequeueAfter {
                        stage: stage.name.clone(),
                        delay: self.settings.requeue_delay,
                        candidates,
                    },
                    stages: reports,
                });
            }

            reports.push(report);
            if !quota.is_complete(status.done.len()) {
                info!(stage = %stage.name, "stage in progress");
                return Ok(PassReport {
                    outcome: PassOutcome::StageIncomplete {
                        stage: stage.name.clone(),
                    },
                    stages: reports,
                });
            }
            info!(stage = %stage.name, "stage complete");
        }

        info!("rollout complete");
        Ok(PassReport {
            outcome: PassOutcome::Complete,
            stages: reports,
        })
    }
}
