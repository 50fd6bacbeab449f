//! Status classification of a stage's units.
//!
//! Sync and health are independent axes, so the three buckets are
//! counters rather than a partition: a unit can be both done and in
//! progress (Synced but still Progressing).

use stagegrid_state::{HealthState, ManagedUnit, SyncState};

/// Stage units bucketed by status. Input order is preserved in each bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification<'a> {
    /// Not out of sync; counts against the stage's cluster quota.
    pub done: Vec<&'a ManagedUnit>,
    /// Health is Progressing; counts against the concurrency quota.
    pub in_progress: Vec<&'a ManagedUnit>,
    /// Out of sync; candidates for admission.
    pub to_do: Vec<&'a ManagedUnit>,
}

pub fn is_to_do(unit: &ManagedUnit) -> bool {
    unit.sync == SyncState::OutOfSync
}

pub fn is_done(unit: &ManagedUnit) -> bool {
    unit.sync != SyncState::OutOfSync
}

pub fn is_in_progress(unit: &ManagedUnit) -> bool {
    unit.health == HealthState::Progressing
}

/// Bucket `stage_units` into done, in-progress and to-do.
pub fn classify(stage_units: &[ManagedUnit]) -> Classification<'_> {
    Classification {
        done: stage_units.iter().filter(|u| is_done(u)).collect(),
        in_progress: stage_units.iter().filter(|u| is_in_progress(u)).collect(),
        to_do: stage_units.iter().filter(|u| is_to_do(u)).collect(),
    }
}
