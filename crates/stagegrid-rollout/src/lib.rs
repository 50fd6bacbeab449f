//! Stagegrid progressive rollouts: stage planning, quotas, sync dispatch.
//!
//! A rollout is an ordered list of stages. Each stage targets a set of
//! clusters by label selector, optionally defers some of them, and bounds
//! both how many units may be updated in total and how many may be in
//! flight at once. A reconciliation pass walks the stages in order and
//! stops at the first one that has not converged.
//!
//! # Components
//!
//! - **`selector`**: Label selectors and the cluster registry seam
//! - **`partition`**: Stage set = targeted clusters minus deferred clusters
//! - **`matcher`**: Units owned by a rollout, grouped by cluster set
//! - **`classify`**: Done / in-progress / to-do buckets
//! - **`quota`**: Absolute-or-percentage budgets
//! - **`dispatch`**: External sync action (`argocd app sync` by default)
//! - **`controller`**: The per-pass stage walk
//! - **`correlator`**: Maps unit change events to owning rollouts

pub mod classify;
pub mod controller;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod matcher;
pub mod partition;
pub mod quota;
pub mod selector;

pub use controller::{
    ControllerSettings, PassOutcome, PassReport, StageController, StageReport, StageSnapshot,
};
pub use correlator::{EventCorrelator, RolloutLister};
pub use dispatch::{CommandDispatcher, NoopDispatcher, SyncDispatcher};
pub use error::{
    CorrelationError, DispatchError, LookupError, QuotaError, ResolutionError, RolloutError,
    RolloutResult,
};
pub use matcher::UnitLookup;
pub use quota::{QuotaPlan, RoundingMode};
pub use selector::{ClusterRegistry, Selector};
