//! Orchestrator configuration

use concord_core::{Cohort, Error, Result, StrategyKind};
use concord_engines::GlobalSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Engines file loaded into the registry
    #[serde(default)]
    pub engines_config: Option<PathBuf>,

    /// Profile for callers outside the canary, and for anonymous callers
    #[serde(default = "ProfileConfig::legacy")]
    pub legacy: ProfileConfig,

    /// Profile for callers in the canary
    #[serde(default = "ProfileConfig::new_path")]
    pub new: ProfileConfig,

    /// Rollout settings
    #[serde(default)]
    pub rollout: RolloutConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            engines_config: None,
            legacy: ProfileConfig::legacy(),
            new: ProfileConfig::new_path(),
            rollout: RolloutConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid orchestrator config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {:?}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.legacy.validate("legacy")?;
        self.new.validate("new")?;
        if self.rollout.cohort_cache_size == 0 {
            return Err(Error::config("rollout.cohort_cache_size must be at least 1"));
        }
        Ok(())
    }

    /// Profile configuration for a cohort
    pub fn profile(&self, cohort: Cohort) -> &ProfileConfig {
        match cohort {
            Cohort::Legacy => &self.legacy,
            Cohort::New => &self.new,
        }
    }
}

/// How one cohort's requests are processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Strategy used when the caller doesn't name one
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,

    /// Engines this profile may use (empty = all enabled)
    #[serde(default)]
    pub engines: Vec<String>,

    /// Engine pinned for the single strategy
    #[serde(default)]
    pub single_engine: Option<String>,

    /// Global settings replacing the registry's for this profile
    #[serde(default)]
    pub settings: Option<GlobalSettings>,
}

impl ProfileConfig {
    /// Legacy path default: one engine
    pub fn legacy() -> Self {
        Self::with_strategy(StrategyKind::Single)
    }

    /// New path default: adaptive
    pub fn new_path() -> Self {
        Self::with_strategy(StrategyKind::Adaptive)
    }

    pub fn with_strategy(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            engines: Vec::new(),
            single_engine: None,
            settings: None,
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if let Some(settings) = &self.settings {
            settings
                .validate()
                .map_err(|e| Error::config(format!("profile '{}': {}", name, e)))?;
        }
        if let Some(engine) = &self.single_engine {
            if !self.engines.is_empty() && !self.engines.contains(engine) {
                return Err(Error::config(format!(
                    "profile '{}': single_engine '{}' not in its engine list",
                    name, engine
                )));
            }
        }
        Ok(())
    }
}

/// Rollout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Directory for rollout state and history; in-memory when unset
    #[serde(default)]
    pub persistence_dir: Option<PathBuf>,

    /// Maximum cached cohort assignments
    #[serde(default = "default_cohort_cache_size")]
    pub cohort_cache_size: usize,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            persistence_dir: None,
            cohort_cache_size: default_cohort_cache_size(),
        }
    }
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Parallel
}

fn default_cohort_cache_size() -> usize {
    100_000
}
