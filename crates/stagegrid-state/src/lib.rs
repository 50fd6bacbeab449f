//! stagegrid-state: fleet state for Stagegrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the cluster registry, the
//! managed units reported by each cluster, the rollout objects, and the
//! last recorded status of every rollout.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Namespaced keys (`{namespace}/{name}`) enable prefix scans per namespace.
//!
//! Every unit or rollout write is also published as a [`StoreEvent`] on a
//! broadcast channel so the controller can react to changes instead of
//! polling. Delivery is best-effort: slow subscribers may lag and miss
//! events, which the controller's periodic resync covers.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
