//! Per-cohort processing profiles
//!
//! Each cohort resolves to a pre-built profile holding its strategy
//! factory, engine restriction and optional settings override, so the
//! request path only picks one and runs it.

use crate::config::{OrchestratorConfig, ProfileConfig};
use concord_core::{Cohort, Result, StrategyKind};
use concord_engines::{EngineSnapshot, ExecutionStrategy, GlobalSettings, StrategyFactory};
use std::sync::Arc;
use tracing::info;

/// Runtime state for one cohort
#[derive(Debug, Clone)]
pub struct CohortProfile {
    cohort: Cohort,
    default_strategy: StrategyKind,
    engines: Vec<String>,
    settings: Option<GlobalSettings>,
    factory: StrategyFactory,
}

impl CohortProfile {
    pub fn new(cohort: Cohort, config: &ProfileConfig) -> Result<Self> {
        config.validate(cohort.as_str())?;

        let factory = match &config.single_engine {
            Some(id) => StrategyFactory::new().with_single_engine(id.clone()),
            None => StrategyFactory::new(),
        };

        info!(
            "Profile '{}': strategy {}, {} engines{}",
            cohort.as_str(),
            config.strategy,
            if config.engines.is_empty() {
                "all".to_string()
            } else {
                config.engines.len().to_string()
            },
            if config.settings.is_some() {
                ", custom settings"
            } else {
                ""
            }
        );

        Ok(Self {
            cohort,
            default_strategy: config.strategy,
            engines: config.engines.clone(),
            settings: config.settings.clone(),
            factory,
        })
    }

    pub fn cohort(&self) -> Cohort {
        self.cohort
    }

    pub fn default_strategy(&self) -> StrategyKind {
        self.default_strategy
    }

    /// Engines this profile is limited to (empty = all enabled)
    pub fn engines(&self) -> &[String] {
        &self.engines
    }

    /// Strategy for a request, honoring an explicit choice
    pub fn strategy(&self, explicit: Option<StrategyKind>) -> Arc<dyn ExecutionStrategy> {
        self.factory
            .create(explicit.unwrap_or(self.default_strategy))
    }

    /// Narrow a registry snapshot to this profile's view
    pub fn view(&self, snapshot: &EngineSnapshot) -> Result<EngineSnapshot> {
        let restricted = snapshot.restrict_to(&self.engines);
        match &self.settings {
            Some(settings) => restricted.with_settings(settings.clone()),
            None => Ok(restricted),
        }
    }
}

/// Legacy and new profiles
#[derive(Debug, Clone)]
pub struct ProfileSet {
    legacy: CohortProfile,
    new: CohortProfile,
}

impl ProfileSet {
    pub fn new(legacy: CohortProfile, new: CohortProfile) -> Self {
        Self { legacy, new }
    }

    /// Build both profiles from configuration
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        Ok(Self {
            legacy: CohortProfile::new(Cohort::Legacy, &config.legacy)?,
            new: CohortProfile::new(Cohort::New, &config.new)?,
        })
    }

    pub fn get(&self, cohort: Cohort) -> &CohortProfile {
        match cohort {
            Cohort::Legacy => &self.legacy,
            Cohort::New => &self.new,
        }
    }
}
