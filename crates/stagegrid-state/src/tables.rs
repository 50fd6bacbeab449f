//! redb table definitions for the Stagegrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Namespaced records are keyed `{namespace}/{name}` so a namespace is a prefix scan.

use redb::TableDefinition;

/// Registered clusters keyed by `{name}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Managed units keyed by `{namespace}/{name}`.
pub const UNITS: TableDefinition<&str, &[u8]> = TableDefinition::new("units");

/// Rollout objects keyed by `{namespace}/{name}`.
pub const ROLLOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollouts");

/// Last observed pass result per rollout, keyed like `ROLLOUTS`.
pub const ROLLOUT_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollout_status");
