//! Caller-facing request processing

use crate::admin::AdminApi;
use crate::config::OrchestratorConfig;
use crate::profile::ProfileSet;
use concord_core::{CallerContext, Cohort, MergedResult, Result, StrategyKind};
use concord_engines::{EngineRegistry, YamlConfigSource};
use concord_rollout::{CohortCache, FileRolloutStore, MemoryRolloutStore, RolloutController, RolloutStore};
use concord_telemetry::MetricsCollector;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Routes each request to the legacy or new profile and runs it
pub struct Orchestrator {
    registry: Arc<EngineRegistry>,
    rollout: Arc<RolloutController>,
    profiles: ProfileSet,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<EngineRegistry>,
        rollout: Arc<RolloutController>,
        profiles: ProfileSet,
    ) -> Self {
        Self {
            registry,
            rollout,
            profiles,
        }
    }

    /// Build from configuration around an existing registry.
    ///
    /// Adapters are registered by the caller; the rollout store is opened
    /// here.
    pub async fn from_config(
        config: &OrchestratorConfig,
        registry: Arc<EngineRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(path) = &config.engines_config {
            registry.reload(&YamlConfigSource::new(path.clone())).await?;
        }

        let store: Arc<dyn RolloutStore> = match &config.rollout.persistence_dir {
            Some(dir) => Arc::new(FileRolloutStore::open(dir.clone()).await?),
            None => {
                warn!("No rollout persistence directory configured; stage changes are not durable");
                Arc::new(MemoryRolloutStore::new())
            }
        };

        let rollout = RolloutController::load(
            store,
            CohortCache::new(config.rollout.cohort_cache_size),
            MetricsCollector::new(),
        )
        .await?;

        let profiles = ProfileSet::from_config(config)?;
        info!(
            "Orchestrator ready with {} registered engines",
            registry.count()
        );

        Ok(Self::new(registry, Arc::new(rollout), profiles))
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn rollout(&self) -> &Arc<RolloutController> {
        &self.rollout
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Operator surface over the rollout
    pub fn admin(&self) -> AdminApi {
        AdminApi::new(Arc::clone(&self.rollout))
    }

    /// Process `text` for an optional caller.
    ///
    /// With a caller id the rollout cohort picks the profile; anonymous
    /// requests use the legacy profile.
    pub async fn process(
        &self,
        text: &str,
        caller_id: Option<&str>,
        explicit_strategy: Option<StrategyKind>,
    ) -> Result<MergedResult> {
        let caller = match caller_id {
            Some(id) => CallerContext::for_caller(id),
            None => CallerContext::new(),
        };
        self.process_with(text, caller, explicit_strategy).await
    }

    /// Process with a prepared caller context (e.g. one carrying a
    /// cancellation token)
    pub async fn process_with(
        &self,
        text: &str,
        mut caller: CallerContext,
        explicit_strategy: Option<StrategyKind>,
    ) -> Result<MergedResult> {
        let started = Instant::now();

        if let Some(id) = caller.caller_id.as_deref() {
            caller.cohort = Some(self.rollout.assign(id));
        }
        let cohort = caller.cohort.unwrap_or(Cohort::Legacy);
        let profile = self.profiles.get(cohort);

        let snapshot = profile.view(&self.registry.snapshot().await)?;
        let strategy = profile.strategy(explicit_strategy);
        debug!(
            "Processing {} chars for cohort {} with {} strategy over {} engines",
            text.len(),
            cohort.as_str(),
            strategy.kind(),
            snapshot.len()
        );

        let metrics = self.rollout.metrics_collector();
        match strategy.process(text, &snapshot, &caller).await {
            Ok(result) => {
                metrics.record_request(
                    cohort,
                    started.elapsed().as_micros() as u64,
                    result.len(),
                );
                metrics.record_engine_failures(result.failed_engines().len() as u64);
                Ok(result)
            }
            Err(e) => {
                warn!("Request failed for cohort {}: {}", cohort.as_str(), e);
                metrics.record_error(cohort);
                Err(e)
            }
        }
    }
}
