//! Canary rollout controller

use crate::cohort::CohortCache;
use crate::stage::{HistoryEntry, RolloutState, Stage, StageChange, Transition, TransitionKind};
use crate::store::{MemoryRolloutStore, RolloutStore};
use concord_core::{Cohort, Error, Result};
use concord_telemetry::{AuditTrail, CohortMetrics, MetricsCollector};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns the rollout state and assigns callers to cohorts.
///
/// Stage changes are serialized by one async lock and are persisted before
/// they become visible. Readers get an `Arc` snapshot, so the percentage
/// and the version they see always belong together.
pub struct RolloutController {
    state: RwLock<Arc<RolloutState>>,
    trail: Mutex<AuditTrail>,
    store: Arc<dyn RolloutStore>,
    cache: CohortCache,
    metrics: MetricsCollector,
}

impl RolloutController {
    /// Load state and history from `store`
    pub async fn load(
        store: Arc<dyn RolloutStore>,
        cache: CohortCache,
        metrics: MetricsCollector,
    ) -> Result<Self> {
        let history = store.load_history().await?;
        let trail = AuditTrail::from_events(history)
            .map_err(|e| Error::persistence(format!("rollout history rejected: {}", e)))?;

        let mut state = store.load_state().await?.unwrap_or_else(RolloutState::initial);

        // History may be one commit ahead of the state file
        if let Some(last) = trail.events().last().and_then(HistoryEntry::from_event) {
            if last.version > state.version {
                warn!(
                    "Rollout state at version {} behind history at {}; restoring from history",
                    state.version, last.version
                );
                state = RolloutState {
                    stage: last.to_stage,
                    rollout_percentage: last.to_percentage,
                    version: last.version,
                    updated_at: last.timestamp,
                    updated_by: last.actor,
                    notes: last.notes,
                };
            }
        }

        info!(
            "Rollout controller loaded at stage {} (version {}, {} history events)",
            state.stage,
            state.version,
            trail.len()
        );

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            trail: Mutex::new(trail),
            store,
            cache,
            metrics,
        })
    }

    /// Controller backed by a fresh in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::load(
            Arc::new(MemoryRolloutStore::new()),
            CohortCache::default(),
            MetricsCollector::new(),
        )
        .await
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<RolloutState> {
        Arc::clone(&self.state.read())
    }

    /// Cohort for a caller under the current stage
    pub fn assign(&self, caller_id: &str) -> Cohort {
        let state = self.state();
        let cohort = self
            .cache
            .get_or_assign(caller_id, state.version, state.rollout_percentage);
        self.metrics.record_assignment(cohort, state.version);
        cohort
    }

    /// Move one stage forward
    pub async fn advance(&self, actor: &str, notes: Option<String>) -> Result<Transition> {
        self.transition(TransitionKind::Advance, actor, notes, |current| {
            current
                .next()
                .ok_or(Error::AlreadyAtMaxStage(current.index()))
        })
        .await
    }

    /// Move back to `target`, which must not be above the current stage
    pub async fn rollback(&self, actor: &str, target: u8, notes: Option<String>) -> Result<Transition> {
        self.transition(TransitionKind::Rollback, actor, notes, |current| {
            Stage::new(target)
                .filter(|stage| *stage <= current)
                .ok_or(Error::InvalidStageTarget {
                    target,
                    current: current.index(),
                })
        })
        .await
    }

    /// Jump to any valid stage
    pub async fn set_stage(&self, actor: &str, target: u8, notes: Option<String>) -> Result<Transition> {
        self.transition(TransitionKind::SetStage, actor, notes, |current| {
            Stage::new(target).ok_or(Error::InvalidStageTarget {
                target,
                current: current.index(),
            })
        })
        .await
    }

    /// Most recent stage changes, newest first
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.trail
            .lock()
            .await
            .recent(limit)
            .filter_map(HistoryEntry::from_event)
            .collect()
    }

    /// Whether the in-memory audit chain is intact
    pub async fn verify_history(&self) -> bool {
        self.trail.lock().await.verify()
    }

    pub fn metrics(&self) -> CohortMetrics {
        self.metrics.snapshot()
    }

    pub fn metrics_collector(&self) -> &MetricsCollector {
        &self.metrics
    }

    async fn transition<F>(
        &self,
        kind: TransitionKind,
        actor: &str,
        notes: Option<String>,
        target: F,
    ) -> Result<Transition>
    where
        F: FnOnce(Stage) -> Result<Stage>,
    {
        let mut trail = self.trail.lock().await;
        let current = self.state();

        let target = match target(current.stage) {
            Ok(stage) => stage,
            Err(e) => {
                warn!("Rejected rollout {} by '{}': {}", kind.as_str(), actor, e);
                return Err(e);
            }
        };

        if target == current.stage {
            return Ok(Transition {
                state: (*current).clone(),
                previous_stage: current.stage,
                changed: false,
                timestamp: chrono::Utc::now(),
                record_id: None,
            });
        }

        let next = current.moved_to(target, actor, notes);
        let change = StageChange::between(kind, &current, &next);
        let event = trail.link(change.to_event(&next));

        self.store.commit(&next, &event).await?;

        let record_id = event.id.clone();
        trail
            .append_linked(event)
            .map_err(|e| Error::internal(e.to_string()))?;
        *self.state.write() = Arc::new(next.clone());

        metrics::counter!("concord_rollout_transitions_total", "kind" => kind.as_str())
            .increment(1);
        info!(
            "Rollout {} by '{}': stage {} -> {} (version {})",
            kind.as_str(),
            actor,
            current.stage,
            next.stage,
            next.version
        );

        Ok(Transition {
            timestamp: next.updated_at,
            state: next,
            previous_stage: current.stage,
            changed: true,
            record_id: Some(record_id),
        })
    }
}
