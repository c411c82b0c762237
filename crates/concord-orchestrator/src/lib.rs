//! Concord Orchestrator
//!
//! Ties the engine registry, execution strategies and canary rollout
//! together behind one caller-facing entry point.
//!
//! - [`Orchestrator::process`]: cohort lookup, profile choice, strategy run
//! - [`AdminApi`]: rollout status, stage changes, history and cohort metrics
//! - [`OrchestratorConfig`]: YAML configuration for profiles and rollout

pub mod admin;
pub mod config;
pub mod orchestrator;
pub mod profile;

pub use admin::{AdminApi, CohortReport, RolloutStatus};
pub use config::{OrchestratorConfig, ProfileConfig, RolloutConfig};
pub use orchestrator::Orchestrator;
pub use profile::{CohortProfile, ProfileSet};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::admin::AdminApi;
    pub use crate::config::OrchestratorConfig;
    pub use crate::orchestrator::Orchestrator;
}
