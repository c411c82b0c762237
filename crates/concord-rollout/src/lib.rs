//! Concord Rollout
//!
//! Staged canary rollout between the legacy and new processing paths.
//!
//! Provides:
//! - Five fixed stages from 0% to 100% of callers on the new path
//! - Deterministic, monotone cohort assignment by caller id
//! - Audited stage changes with a hash-chained history
//! - In-memory and file-backed state stores

pub mod cohort;
pub mod controller;
pub mod stage;
pub mod store;

pub use cohort::{assign_cohort, bucket, stable_hash, CohortCache};
pub use controller::RolloutController;
pub use stage::{
    HistoryEntry, RolloutState, Stage, StageChange, Transition, TransitionKind, STAGE_PERCENTAGES,
};
pub use store::{FileRolloutStore, MemoryRolloutStore, RolloutStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::controller::RolloutController;
    pub use crate::stage::{RolloutState, Stage, Transition};
    pub use crate::store::{FileRolloutStore, RolloutStore};
}
