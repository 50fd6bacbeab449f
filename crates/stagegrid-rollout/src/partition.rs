//! Set partitioning: the clusters a stage may act on this pass.

use std::cmp::Ordering;
use std::collections::HashSet;

use stagegrid_state::ClusterRecord;

/// Comparator used for every ordered cluster set: lexicographic by name.
pub fn by_cluster_name(a: &ClusterRecord, b: &ClusterRecord) -> Ordering {
    a.name.cmp(&b.name)
}

/// Compute `clusters \ requeue` by cluster name, sorted by name.
///
/// The result is disjoint from `requeue` and stable across passes for
/// unchanged input.
pub fn stage_set(clusters: &[ClusterRecord], requeue: &[ClusterRecord]) -> Vec<ClusterRecord> {
    let mut stage: Vec<ClusterRecord> = if requeue.is_empty() {
        clusters.to_vec()
    } else {
        let deferred: HashSet<&str> = requeue.iter().map(|c| c.name.as_str()).collect();
        clusters
            .iter()
            .filter(|c| !deferred.contains(c.name.as_str()))
            .cloned()
            .collect()
    };
    stage.sort_by(by_cluster_name);
    stage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters(names: &[&str]) -> Vec<ClusterRecord> {
        names.iter().map(|n| ClusterRecord::new(n)).collect()
    }

    fn names(set: &[ClusterRecord]) -> Vec<&str> {
        set.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn no_requeue_keeps_all_sorted() {
        let stage = stage_set(&clusters(&["c", "a", "b"]), &[]);
        assert_eq!(names(&stage), vec!["a", "b", "c"]);
    }

    #[test]
    fn requeued_clusters_are_removed() {
        // Two clusters in the region, one of them drained.
        let all = clusters(&["eu-west-1b", "eu-west-1a"]);
        let drained = clusters(&["eu-west-1a"]);
        let stage = stage_set(&all, &drained);
        assert_eq!(names(&stage), vec!["eu-west-1b"]);
    }

    #[test]
    fn subset_requeue_partitions_exactly() {
        let all = clusters(&["a", "b", "c", "d"]);
        let requeue = clusters(&["d", "b"]);
        let stage = stage_set(&all, &requeue);

        let stage_names: HashSet<&str> = names(&stage).into_iter().collect();
        let requeue_names: HashSet<&str> = names(&requeue).into_iter().collect();
        assert!(stage_names.is_disjoint(&requeue_names));

        let union: HashSet<&str> = stage_names.union(&requeue_names).copied().collect();
        let all_names: HashSet<&str> = names(&all).into_iter().collect();
        assert_eq!(union, all_names);
    }

    #[test]
    fn requeue_outside_target_is_ignored() {
        let stage = stage_set(&clusters(&["a", "b"]), &clusters(&["z"]));
        assert_eq!(names(&stage), vec!["a", "b"]);
    }

    #[test]
    fn ordering_is_deterministic() {
        let first = stage_set(&clusters(&["m", "b", "x", "a"]), &clusters(&["x"]));
        let second = stage_set(&clusters(&["x", "a", "m", "b"]), &clusters(&["x"]));
        assert_eq!(first, second);
    }
}
