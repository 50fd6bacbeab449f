//! Unit matching: which owned units target which cluster set.

use std::cmp::Ordering;
use std::collections::HashSet;

use stagegrid_state::{ClusterRecord, ManagedUnit, SourceRef, StateStore};

use crate::error::LookupError;

/// Source of the units owned by a rollout's `SourceRef`.
pub trait UnitLookup: Send + Sync {
    fn list_owned(&self, source: &SourceRef) -> Result<Vec<ManagedUnit>, LookupError>;
}

impl UnitLookup for StateStore {
    fn list_owned(&self, source: &SourceRef) -> Result<Vec<ManagedUnit>, LookupError> {
        self.list_units_owned_by(source).map_err(|e| LookupError {
            owner: format!("{}/{} {}", source.api_group, source.kind, source.name),
            reason: e.to_string(),
        })
    }
}

/// Comparator used for every ordered unit set: by target cluster, then unit name.
pub fn by_cluster_then_name(a: &ManagedUnit, b: &ManagedUnit) -> Ordering {
    a.cluster
        .cmp(&b.cluster)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.namespace.cmp(&b.namespace))
}

/// Units whose target cluster is in `clusters`, in deterministic order.
pub fn units_targeting(units: &[ManagedUnit], clusters: &[ClusterRecord]) -> Vec<ManagedUnit> {
    let names: HashSet<&str> = clusters.iter().map(|c| c.name.as_str()).collect();
    let mut matched: Vec<ManagedUnit> = units
        .iter()
        .filter(|u| names.contains(u.cluster.as_str()))
        .cloned()
        .collect();
    matched.sort_by(by_cluster_then_name);
    matched
}

/// Owned units split by the cluster set they target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitPartition {
    /// Units targeting any cluster selected by the stage, requeued ones included.
    pub cluster_units: Vec<ManagedUnit>,
    /// Units targeting a deferred cluster.
    pub requeue_units: Vec<ManagedUnit>,
    /// Units targeting a cluster the stage may act on now.
    pub stage_units: Vec<ManagedUnit>,
}

/// Match `owned` against the three cluster sets of a stage.
///
/// A unit targeting none of the sets is left out of all three.
pub fn partition_units(
    owned: &[ManagedUnit],
    clusters: &[ClusterRecord],
    requeue: &[ClusterRecord],
    stage: &[ClusterRecord],
) -> UnitPartition {
    UnitPartition {
        cluster_units: units_targeting(owned, clusters),
        requeue_units: units_targeting(owned, requeue),
        stage_units: units_targeting(owned, stage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::stage_set;
    use stagegrid_state::{HealthState, OwnerReference, SyncState};

    fn unit(name: &str, cluster: &str) -> ManagedUnit {
        ManagedUnit {
            name: name.to_string(),
            namespace: "argocd".to_string(),
            cluster: cluster.to_string(),
            owner_references: vec![],
            sync: SyncState::OutOfSync,
            health: HealthState::Healthy,
        }
    }

    fn clusters(names: &[&str]) -> Vec<ClusterRecord> {
        names.iter().map(|n| ClusterRecord::new(n)).collect()
    }

    fn names(units: &[ManagedUnit]) -> Vec<&str> {
        units.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn matches_by_exact_cluster_name() {
        let owned = vec![unit("web-a", "a"), unit("web-ab", "ab"), unit("web-b", "b")];
        let matched = units_targeting(&owned, &clusters(&["a", "b"]));
        assert_eq!(names(&matched), vec!["web-a", "web-b"]);
    }

    #[test]
    fn partitions_by_cluster_set() {
        let owned = vec![
            unit("web-c", "c"),
            unit("web-a", "a"),
            unit("web-b", "b"),
            unit("web-x", "x"),
        ];
        let all = clusters(&["a", "b", "c"]);
        let requeue = clusters(&["b"]);
        let stage = stage_set(&all, &requeue);

        let parts = partition_units(&owned, &all, &requeue, &stage);
        assert_eq!(names(&parts.cluster_units), vec!["web-a", "web-b", "web-c"]);
        assert_eq!(names(&parts.requeue_units), vec!["web-b"]);
        assert_eq!(names(&parts.stage_units), vec!["web-a", "web-c"]);
    }

    #[test]
    fn ordering_follows_cluster_then_name() {
        let owned = vec![unit("z", "a"), unit("b", "b"), unit("a", "b")];
        let matched = units_targeting(&owned, &clusters(&["a", "b"]));
        assert_eq!(names(&matched), vec!["z", "a", "b"]);
    }

    #[test]
    fn store_lookup_returns_owned_units() {
        let store = StateStore::open_in_memory().unwrap();
        let owner = OwnerReference {
            kind: "ApplicationSet".to_string(),
            api_version: "argoproj.io/v1alpha1".to_string(),
            name: "web".to_string(),
        };
        let mut owned = unit("web-a", "a");
        owned.owner_references.push(owner);
        store.put_unit(&owned).unwrap();
        store.put_unit(&unit("orphan", "a")).unwrap();

        let source = SourceRef {
            api_group: "argoproj.io/v1alpha1".to_string(),
            kind: "ApplicationSet".to_string(),
            name: "web".to_string(),
        };
        let found = store.list_owned(&source).unwrap();
        assert_eq!(names(&found), vec!["web-a"]);
    }
}
