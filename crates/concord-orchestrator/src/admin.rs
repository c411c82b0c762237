//! Operator control surface for the canary rollout

use concord_core::Result;
use concord_rollout::{HistoryEntry, RolloutController, RolloutState, Stage, Transition};
use concord_telemetry::CohortMetrics;
use serde::Serialize;
use std::sync::Arc;

/// Rollout status as reported to operators
#[derive(Debug, Clone, Serialize)]
pub struct RolloutStatus {
    pub state: RolloutState,

    /// Next stage's percentage, `None` at full rollout
    pub next_percentage: Option<u8>,

    /// Whether the audit history verifies
    pub history_intact: bool,
}

/// Configured versus observed cohort split
#[derive(Debug, Clone, Serialize)]
pub struct CohortReport {
    pub stage: Stage,
    pub stage_version: u64,

    /// Percentage the current stage routes to the new cohort
    pub configured_percentage: u8,

    /// New-cohort share among assignments made at the current stage
    pub observed_percentage: f64,

    /// Assignments counted at the current stage
    pub observed_assignments: u64,

    pub metrics: CohortMetrics,
}

/// Admin operations; every stage change is attributed to an actor
#[derive(Clone)]
pub struct AdminApi {
    rollout: Arc<RolloutController>,
}

impl AdminApi {
    pub fn new(rollout: Arc<RolloutController>) -> Self {
        Self { rollout }
    }

    pub async fn get_status(&self) -> RolloutStatus {
        let state = self.rollout.state();
        RolloutStatus {
            next_percentage: state.stage.next().map(|s| s.percentage()),
            history_intact: self.rollout.verify_history().await,
            state: (*state).clone(),
        }
    }

    pub async fn advance(&self, actor: &str, notes: Option<String>) -> Result<Transition> {
        self.rollout.advance(actor, notes).await
    }

    pub async fn rollback(&self, actor: &str, target: u8, notes: Option<String>) -> Result<Transition> {
        self.rollout.rollback(actor, target, notes).await
    }

    pub async fn set_stage(&self, actor: &str, target: u8, notes: Option<String>) -> Result<Transition> {
        self.rollout.set_stage(actor, target, notes).await
    }

    /// Most recent stage changes, newest first
    pub async fn get_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.rollout.history(limit).await
    }

    pub fn get_cohort_metrics(&self) -> CohortReport {
        let state = self.rollout.state();
        let metrics = self.rollout.metrics();

        // Window counts belong to an older version until the first
        // assignment under the current stage
        let (observed_percentage, observed_assignments) =
            if metrics.current_stage.stage_version == state.version {
                let window = &metrics.current_stage;
                (window.new_percentage(), window.legacy + window.new)
            } else {
                (0.0, 0)
            };

        CohortReport {
            stage: state.stage,
            stage_version: state.version,
            configured_percentage: state.rollout_percentage,
            observed_percentage,
            observed_assignments,
            metrics,
        }
    }
}
