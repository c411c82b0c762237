//! Concord Engines
//!
//! Runs independent text-analysis engines against the same input and
//! reconciles their outputs.
//!
//! - [`EngineAdapter`]: the one contract every engine implements
//! - [`EngineRegistry`]: adapters, availability and an atomically swapped
//!   configuration layer
//! - Execution strategies (single, parallel, sequential, ensemble, adaptive)
//!   behind [`ExecutionStrategy`] and built by [`StrategyFactory`]
//! - [`ConsensusVoter`]: weighted voting over near-duplicate spans
//! - Reference engines: [`GazetteerEngine`] and [`PatternEngine`]

pub mod config;
pub mod consensus;
pub mod engine;
pub mod gazetteer;
pub mod merge;
pub mod patterns;
pub mod registry;
pub mod selector;
pub mod strategy;

pub use config::{
    AdaptiveThresholds, ConfigLayer, ConfigSource, EngineConfig, EnginesFile, GlobalSettings,
    StaticConfigSource, YamlConfigSource,
};
pub use consensus::{ConsensusConfig, ConsensusVoter};
pub use engine::{EngineAdapter, EngineError, ExtractionContext};
pub use gazetteer::GazetteerEngine;
pub use merge::merge_dedup;
pub use patterns::{PatternEngine, PatternRule};
pub use registry::{EnabledEngine, EngineRegistry, EngineSnapshot};
pub use selector::{structural_complexity, AdaptiveSelector, TextProfile};
pub use strategy::{
    AdaptiveStrategy, EnsembleStrategy, ExecutionStrategy, ParallelStrategy, SequentialStrategy,
    SingleStrategy, StrategyFactory,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, GlobalSettings};
    pub use crate::engine::{EngineAdapter, EngineError, ExtractionContext};
    pub use crate::registry::{EngineRegistry, EngineSnapshot};
    pub use crate::strategy::{ExecutionStrategy, StrategyFactory};
}
