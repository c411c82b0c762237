//! Engine and global configuration, validation and configuration sources

use async_trait::async_trait;
use concord_core::{Error, Result, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Upper bound for an engine's voting weight
pub const MAX_ENGINE_WEIGHT: f64 = 10.0;

/// Per-engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whether the engine takes part in runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Voting weight (0.0-10.0)
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Minimum span confidence this engine is trusted at
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Maximum spans kept from one invocation
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Per-engine timeout override
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Free-form engine-specific settings
    #[serde(default)]
    pub custom_settings: HashMap<String, serde_json::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: default_weight(),
            confidence_threshold: default_confidence_threshold(),
            max_results: default_max_results(),
            timeout_ms: None,
            custom_settings: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Set the voting weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the confidence threshold
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the timeout override
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Mark as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validate value ranges
    pub fn validate(&self, engine_id: &str) -> Result<()> {
        if !self.weight.is_finite() || !(0.0..=MAX_ENGINE_WEIGHT).contains(&self.weight) {
            return Err(Error::config(format!(
                "engine '{}': weight {} outside [0, {}]",
                engine_id, self.weight, MAX_ENGINE_WEIGHT
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::config(format!(
                "engine '{}': confidence_threshold {} outside [0, 1]",
                engine_id, self.confidence_threshold
            )));
        }
        if self.max_results == 0 {
            return Err(Error::config(format!(
                "engine '{}': max_results must be at least 1",
                engine_id
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::config(format!(
                "engine '{}': timeout_ms must be positive",
                engine_id
            )));
        }
        Ok(())
    }
}

/// Thresholds used by the adaptive strategy selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    /// Texts shorter than this (in chars) run on a single engine
    #[serde(default = "default_short_text_max")]
    pub short_text_max: usize,

    /// Texts longer than this (in chars) run the ensemble
    #[serde(default = "default_long_text_min")]
    pub long_text_min: usize,

    /// Complexity at or above which medium texts run sequentially
    #[serde(default = "default_moderate_complexity")]
    pub moderate_complexity: f64,

    /// Complexity at or above which texts run the ensemble
    #[serde(default = "default_high_complexity")]
    pub high_complexity: f64,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            short_text_max: default_short_text_max(),
            long_text_min: default_long_text_min(),
            moderate_complexity: default_moderate_complexity(),
            high_complexity: default_high_complexity(),
        }
    }
}

impl AdaptiveThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.short_text_max > self.long_text_min {
            return Err(Error::config(format!(
                "adaptive: short_text_max {} exceeds long_text_min {}",
                self.short_text_max, self.long_text_min
            )));
        }
        for (name, value) in [
            ("moderate_complexity", self.moderate_complexity),
            ("high_complexity", self.high_complexity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::config(format!(
                    "adaptive: {} {} outside [0, 1]",
                    name, value
                )));
            }
        }
        if self.moderate_complexity > self.high_complexity {
            return Err(Error::config(
                "adaptive: moderate_complexity exceeds high_complexity",
            ));
        }
        Ok(())
    }
}

/// Settings shared by all engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Minimum weighted agreement for an ensemble group to survive
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Minimum normalized similarity for two spans to be grouped
    #[serde(default = "default_similarity_cutoff")]
    pub similarity_cutoff: f64,

    /// Confidence boost factor applied at full agreement
    #[serde(default = "default_agreement_boost")]
    pub agreement_boost: f64,

    /// Maximum engines invoked concurrently
    #[serde(default = "default_max_parallel_engines")]
    pub max_parallel_engines: usize,

    /// Default per-engine timeout
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,

    /// Strategy used when callers don't ask for one
    #[serde(default = "default_strategy")]
    pub default_strategy: StrategyKind,

    /// Engine used by the single strategy when no id is given
    #[serde(default)]
    pub default_engine: Option<String>,

    /// Engine order for the sequential strategy
    #[serde(default)]
    pub pipeline_order: Vec<String>,

    /// Adaptive selector thresholds
    #[serde(default)]
    pub adaptive: AdaptiveThresholds,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            consensus_threshold: default_consensus_threshold(),
            similarity_cutoff: default_similarity_cutoff(),
            agreement_boost: default_agreement_boost(),
            max_parallel_engines: default_max_parallel_engines(),
            engine_timeout_ms: default_engine_timeout_ms(),
            default_strategy: default_strategy(),
            default_engine: None,
            pipeline_order: Vec::new(),
            adaptive: AdaptiveThresholds::default(),
        }
    }
}

impl GlobalSettings {
    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.consensus_threshold) {
            return Err(Error::InvalidConsensusThreshold(self.consensus_threshold));
        }
        if !(self.similarity_cutoff > 0.0 && self.similarity_cutoff <= 1.0) {
            return Err(Error::config(format!(
                "similarity_cutoff {} outside (0, 1]",
                self.similarity_cutoff
            )));
        }
        if !self.agreement_boost.is_finite() || self.agreement_boost < 0.0 {
            return Err(Error::config(format!(
                "agreement_boost {} must be non-negative",
                self.agreement_boost
            )));
        }
        if self.max_parallel_engines == 0 {
            return Err(Error::config("max_parallel_engines must be at least 1"));
        }
        if self.engine_timeout_ms == 0 {
            return Err(Error::config("engine_timeout_ms must be positive"));
        }
        self.adaptive.validate()
    }
}

/// Immutable configuration layer shared by in-flight requests.
///
/// Updates build a new layer and swap it in; a request keeps the layer it
/// started with.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayer {
    engines: HashMap<String, EngineConfig>,
    settings: GlobalSettings,
    version: u64,
}

impl ConfigLayer {
    /// Build and validate a layer
    pub fn new(engines: HashMap<String, EngineConfig>, settings: GlobalSettings) -> Result<Self> {
        settings.validate()?;
        for (id, config) in &engines {
            config.validate(id)?;
        }
        Ok(Self {
            engines,
            settings,
            version: 0,
        })
    }

    /// Config for an engine; unknown engines get defaults
    pub fn engine_config(&self, engine_id: &str) -> EngineConfig {
        self.engines.get(engine_id).cloned().unwrap_or_default()
    }

    /// Voting weight for an engine; unknown engines weigh 1.0
    pub fn weight(&self, engine_id: &str) -> f64 {
        self.engines
            .get(engine_id)
            .map(|c| c.weight)
            .unwrap_or_else(default_weight)
    }

    /// Confidence threshold for an engine
    pub fn confidence_threshold(&self, engine_id: &str) -> f64 {
        self.engines
            .get(engine_id)
            .map(|c| c.confidence_threshold)
            .unwrap_or_else(default_confidence_threshold)
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn engines(&self) -> &HashMap<String, EngineConfig> {
        &self.engines
    }

    /// Monotonic layer version, bumped on every swap
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Copy with one engine's config replaced
    pub(crate) fn with_engine(&self, engine_id: &str, config: EngineConfig) -> Result<Self> {
        config.validate(engine_id)?;
        let mut next = self.clone();
        next.engines.insert(engine_id.to_string(), config);
        next.version = self.version + 1;
        Ok(next)
    }

    /// Copy with different global settings, same version
    pub fn with_settings(&self, settings: GlobalSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            engines: self.engines.clone(),
            settings,
            version: self.version,
        })
    }
}

/// Where engine and global configuration comes from
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Per-engine configuration
    async fn load_configs(&self) -> Result<HashMap<String, EngineConfig>>;

    /// Global settings
    async fn load_global_settings(&self) -> Result<GlobalSettings>;
}

/// In-memory configuration source
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    configs: HashMap<String, EngineConfig>,
    settings: GlobalSettings,
}

impl StaticConfigSource {
    pub fn new(configs: HashMap<String, EngineConfig>, settings: GlobalSettings) -> Self {
        Self { configs, settings }
    }

    /// Add an engine config
    pub fn with_engine(mut self, engine_id: impl Into<String>, config: EngineConfig) -> Self {
        self.configs.insert(engine_id.into(), config);
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load_configs(&self) -> Result<HashMap<String, EngineConfig>> {
        Ok(self.configs.clone())
    }

    async fn load_global_settings(&self) -> Result<GlobalSettings> {
        Ok(self.settings.clone())
    }
}

/// On-disk layout of an engines configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesFile {
    /// Engine configurations by id
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl EnginesFile {
    /// Parse and validate from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid engines config: {}", e)))?;
        file.settings.validate()?;
        for (id, config) in &file.engines {
            config.validate(id)?;
        }
        Ok(file)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "failed to read engines config {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }
}

/// YAML file configuration source; the file is re-read on every load
#[derive(Debug, Clone)]
pub struct YamlConfigSource {
    path: PathBuf,
}

impl YamlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<EnginesFile> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config(format!("failed to read engines config {:?}: {}", self.path, e))
        })?;
        EnginesFile::from_yaml(&content)
    }
}

#[async_trait]
impl ConfigSource for YamlConfigSource {
    async fn load_configs(&self) -> Result<HashMap<String, EngineConfig>> {
        Ok(self.read().await?.engines)
    }

    async fn load_global_settings(&self) -> Result<GlobalSettings> {
        Ok(self.read().await?.settings)
    }
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_max_results() -> usize {
    100
}

fn default_consensus_threshold() -> f64 {
    0.6
}

fn default_similarity_cutoff() -> f64 {
    0.85
}

fn default_agreement_boost() -> f64 {
    0.2
}

fn default_max_parallel_engines() -> usize {
    10
}

fn default_engine_timeout_ms() -> u64 {
    5_000
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Adaptive
}

fn default_short_text_max() -> usize {
    500
}

fn default_long_text_min() -> usize {
    2_000
}

fn default_moderate_complexity() -> f64 {
    0.4
}

fn default_high_complexity() -> f64 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engines_file_yaml() {
        let yaml = r#"
engines:
  spacy:
    weight: 1.0
  natasha:
    weight: 1.2
    confidence_threshold: 0.4
    custom_settings:
      model: ru_core
  gliner:
    enabled: false
    timeout_ms: 250

settings:
  consensus_threshold: 0.65
  max_parallel_engines: 4
  default_strategy: ensemble
  pipeline_order: [natasha, spacy]
  adaptive:
    short_text_max: 300
"#;

        let file = EnginesFile::from_yaml(yaml).unwrap();

        assert_eq!(file.engines.len(), 3);
        assert_eq!(file.engines["natasha"].weight, 1.2);
        assert_eq!(file.engines["natasha"].custom_settings["model"], "ru_core");
        assert!(!file.engines["gliner"].enabled);
        assert_eq!(file.engines["gliner"].timeout_ms, Some(250));
        assert_eq!(file.settings.consensus_threshold, 0.65);
        assert_eq!(file.settings.default_strategy, StrategyKind::Ensemble);
        assert_eq!(file.settings.adaptive.short_text_max, 300);
        assert_eq!(file.settings.adaptive.long_text_min, 2_000);
    }

    #[test]
    fn test_invalid_consensus_threshold_rejected_at_load() {
        let yaml = "settings:\n  consensus_threshold: 1.5\n";
        let err = EnginesFile::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidConsensusThreshold(t) if t == 1.5));
    }

    #[test]
    fn test_engine_weight_bounds() {
        assert!(EngineConfig::default().with_weight(10.0).validate("a").is_ok());
        assert!(EngineConfig::default().with_weight(10.5).validate("a").is_err());
        assert!(EngineConfig::default().with_weight(-0.1).validate("a").is_err());
        assert!(EngineConfig::default().with_weight(f64::NAN).validate("a").is_err());
    }

    #[test]
    fn test_unknown_engine_defaults() {
        let layer = ConfigLayer::new(HashMap::new(), GlobalSettings::default()).unwrap();
        assert_eq!(layer.weight("unregistered"), 1.0);
        assert_eq!(layer.confidence_threshold("unregistered"), 0.5);
        assert!(layer.engine_config("unregistered").enabled);
    }

    #[test]
    fn test_adaptive_thresholds_validation() {
        let mut settings = GlobalSettings::default();
        settings.adaptive.short_text_max = 5_000;
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn test_yaml_source_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engines.yaml");
        std::fs::write(&path, "engines:\n  spacy:\n    weight: 1.0\n").unwrap();

        let source = YamlConfigSource::new(&path);
        assert_eq!(source.load_configs().await.unwrap()["spacy"].weight, 1.0);

        std::fs::write(&path, "engines:\n  spacy:\n    weight: 2.5\n").unwrap();
        assert_eq!(source.load_configs().await.unwrap()["spacy"].weight, 2.5);
    }
}
