//! Domain types for the Stagegrid state store.
//!
//! Clusters and managed units are reference data reported from outside;
//! rollouts are the objects the controller reconciles. All types are
//! serializable to/from JSON for storage in redb tables and for the API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

// ── Cluster ───────────────────────────────────────────────────────

/// A registered target cluster, matched against stage selectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterRecord {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ClusterRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
        }
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

// ── Managed unit ──────────────────────────────────────────────────

/// Whether a unit's live state matches its desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SyncState {
    Synced,
    OutOfSync,
    #[default]
    Unknown,
}

/// Operational health of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HealthState {
    Healthy,
    Progressing,
    Degraded,
    Missing,
    #[default]
    Unknown,
}

/// Owner identity carried by a managed unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OwnerReference {
    pub kind: String,
    /// Group and version of the owner, e.g. `argoproj.io/v1alpha1`.
    pub api_version: String,
    pub name: String,
}

/// A deployable artifact targeting exactly one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedUnit {
    pub name: String,
    pub namespace: String,
    /// Name of the cluster this unit deploys to.
    pub cluster: String,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub sync: SyncState,
    #[serde(default)]
    pub health: HealthState,
}

impl ManagedUnit {
    /// Whether any owner reference names `source`.
    pub fn is_owned_by(&self, source: &SourceRef) -> bool {
        self.owner_references.iter().any(|owner| source.matches(owner))
    }
}

// ── Rollout ───────────────────────────────────────────────────────

/// Identifies the owner whose units a rollout propagates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourceRef {
    /// Compared verbatim against `OwnerReference::api_version`.
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

impl SourceRef {
    /// Exact structural equality over kind, group/version and name.
    pub fn matches(&self, owner: &OwnerReference) -> bool {
        self.kind == owner.kind && self.name == owner.name && self.api_group == owner.api_version
    }
}

/// A quota field: an absolute count or a percentage string such as `"50%"`.
///
/// A percentage is one or more ASCII digits immediately followed by `%`;
/// signs and surrounding whitespace are rejected.
///
/// Values are kept as submitted and validated when resolved, so a
/// malformed field is reported together with the field it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum QuotaValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for QuotaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaValue::Int(n) => write!(f, "{n}"),
            QuotaValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for QuotaValue {
    fn from(n: i64) -> Self {
        QuotaValue::Int(n)
    }
}

impl From<&str> for QuotaValue {
    fn from(s: &str) -> Self {
        QuotaValue::Str(s.to_string())
    }
}

/// One step of a rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    /// Label selector for the clusters targeted by this stage.
    pub clusters: String,
    /// Label selector for clusters deferred during this pass.
    /// Absent means nothing is deferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requeue: Option<String>,
    pub max_clusters: QuotaValue,
    pub max_unavailable: QuotaValue,
}

/// Ordered stages plus the owner of the units being rolled out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolloutSpec {
    pub source_ref: SourceRef,
    pub stages: Vec<Stage>,
}

/// A rollout object as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rollout {
    pub namespace: String,
    pub name: String,
    pub spec: RolloutSpec,
}

impl Rollout {
    pub fn key(&self) -> RolloutKey {
        RolloutKey::new(&self.namespace, &self.name)
    }
}

/// Namespaced identity of a rollout; the unit of work for the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RolloutKey {
    pub namespace: String,
    pub name: String,
}

impl RolloutKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for RolloutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for RolloutKey {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(RolloutKey::new(ns, name))
            }
            _ => Err(StateError::InvalidKey(format!(
                "expected `namespace/name`, got `{s}`"
            ))),
        }
    }
}

// ── Rollout status ────────────────────────────────────────────────

/// Coarse state of a rollout after its most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    /// Units were admitted or are still converging in the current stage.
    Progressing,
    /// Stage incomplete and nothing could be admitted this pass.
    Waiting,
    /// Deferred clusters block the stage; a retry is scheduled.
    Requeued,
    /// Every stage reported complete.
    Completed,
    /// The pass aborted with an error.
    Failed,
}

/// Last recorded result of reconciling a rollout.
///
/// Observational only: planning never reads it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutStatus {
    pub phase: RolloutPhase,
    /// Stage the pass stopped at, if any.
    pub stage: Option<String>,
    pub message: String,
    pub last_error: Option<String>,
    /// Failed passes since the last successful one.
    pub consecutive_errors: u32,
    /// Unix timestamp (seconds) of the pass.
    pub updated_at: u64,
}

// ── Events ────────────────────────────────────────────────────────

/// What happened to a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Upserted,
    Deleted,
}

/// Change notification published by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Unit { kind: EventKind, unit: ManagedUnit },
    Rollout { kind: EventKind, key: RolloutKey },
}

// ── Table keys ────────────────────────────────────────────────────

impl ManagedUnit {
    /// Build the composite key for the units table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl RolloutKey {
    /// Build the composite key for the rollouts and status tables.
    pub fn table_key(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(kind: &str, api_version: &str, name: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.to_string(),
            api_version: api_version.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn source_ref_matches_exact_owner() {
        let source = SourceRef {
            api_group: "g/v1".to_string(),
            kind: "X".to_string(),
            name: "foo".to_string(),
        };
        assert!(source.matches(&owner("X", "g/v1", "foo")));
        assert!(!source.matches(&owner("X", "g/v2", "foo")));
        assert!(!source.matches(&owner("Y", "g/v1", "foo")));
        assert!(!source.matches(&owner("X", "g/v1", "bar")));
    }

    #[test]
    fn quota_value_accepts_int_or_string() {
        let n: QuotaValue = serde_json::from_str("3").unwrap();
        assert_eq!(n, QuotaValue::Int(3));
        let p: QuotaValue = serde_json::from_str("\"50%\"").unwrap();
        assert_eq!(p, QuotaValue::Str("50%".to_string()));
        assert_eq!(p.to_string(), "50%");
    }

    #[test]
    fn rollout_key_parses_namespace_and_name() {
        let key: RolloutKey = "argocd/web".parse().unwrap();
        assert_eq!(key, RolloutKey::new("argocd", "web"));
        assert_eq!(key.to_string(), "argocd/web");

        assert!("web".parse::<RolloutKey>().is_err());
        assert!("/web".parse::<RolloutKey>().is_err());
        assert!("a/b/c".parse::<RolloutKey>().is_err());
    }

    #[test]
    fn unit_states_default_to_unknown() {
        let json = r#"{"name":"web-eu","namespace":"argocd","cluster":"eu-1"}"#;
        let unit: ManagedUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit.sync, SyncState::Unknown);
        assert_eq!(unit.health, HealthState::Unknown);
        assert!(unit.owner_references.is_empty());
    }

    #[test]
    fn stage_requeue_is_optional() {
        let json = r#"{
            "name": "canary",
            "clusters": "tier=canary",
            "max_clusters": "100%",
            "max_unavailable": 1
        }"#;
        let stage: Stage = serde_json::from_str(json).unwrap();
        assert!(stage.requeue.is_none());
        assert_eq!(stage.max_unavailable, QuotaValue::Int(1));
    }
}
