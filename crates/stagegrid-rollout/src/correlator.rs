//! Event correlation: maps a changed unit to the rollout that owns it.
//!
//! A unit belongs to a rollout when one of its owner references equals the
//! rollout's `source_ref` (kind, group/version and name, all exact). Only
//! rollouts in the unit's own namespace are considered.

use tracing::{debug, warn};

use stagegrid_state::{ManagedUnit, Rollout, RolloutKey, StateStore};

use crate::error::CorrelationError;

/// Lists rollouts per namespace.
pub trait RolloutLister: Send + Sync {
    fn list_in_namespace(&self, namespace: &str) -> Result<Vec<Rollout>, CorrelationError>;
}

impl RolloutLister for StateStore {
    fn list_in_namespace(&self, namespace: &str) -> Result<Vec<Rollout>, CorrelationError> {
        self.list_rollouts_in_namespace(namespace)
            .map_err(|e| CorrelationError {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })
    }
}

/// First rollout in `rollouts` whose source matches an owner of `unit`.
pub fn owning_rollout<'a>(rollouts: &'a [Rollout], unit: &ManagedUnit) -> Option<&'a Rollout> {
    rollouts
        .iter()
        .find(|r| unit.owner_references.iter().any(|o| r.spec.source_ref.matches(o)))
}

/// Turns unit change events into reconciliation requests.
pub struct EventCorrelator<L> {
    lister: L,
}

impl<L: RolloutLister> EventCorrelator<L> {
    pub fn new(lister: L) -> Self {
        Self { lister }
    }

    /// Requests produced by a change to `unit`: zero or one rollout key.
    ///
    /// A listing failure is logged and the event dropped; the periodic
    /// resync picks the rollout up later.
    pub fn map(&self, unit: &ManagedUnit) -> Vec<RolloutKey> {
        let rollouts = match self.lister.list_in_namespace(&unit.namespace) {
            Ok(rollouts) => rollouts,
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "dropping unit event");
                return Vec::new();
            }
        };

        match owning_rollout(&rollouts, unit) {
            Some(rollout) => {
                let key = rollout.key();
                debug!(unit = %unit.name, rollout = %key, "unit event mapped to rollout");
                vec![key]
            }
            None => Vec::new(),
        }
    }
}
