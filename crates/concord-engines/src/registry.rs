//! Engine registry: adapter instances, availability and the config layer

use crate::config::{ConfigLayer, ConfigSource, EngineConfig, GlobalSettings};
use crate::engine::EngineAdapter;
use concord_core::Result;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A registered adapter and its runtime availability
struct RegisteredEngine {
    id: String,
    adapter: Arc<dyn EngineAdapter>,
    /// Outcome of `initialize()`, computed once
    init: OnceCell<std::result::Result<(), String>>,
    /// Result of the last health probe
    healthy: AtomicBool,
}

impl RegisteredEngine {
    fn new(id: String, adapter: Arc<dyn EngineAdapter>) -> Self {
        Self {
            id,
            adapter,
            init: OnceCell::new(),
            healthy: AtomicBool::new(true),
        }
    }

    async fn ensure_initialized(&self) -> bool {
        let outcome = self
            .init
            .get_or_init(|| async {
                match self.adapter.initialize().await {
                    Ok(()) => {
                        info!("Engine '{}' initialized", self.id);
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Engine '{}' failed to initialize: {}", self.id, e);
                        Err(e.to_string())
                    }
                }
            })
            .await;
        outcome.is_ok()
    }

    fn is_available(&self) -> bool {
        matches!(self.init.get(), Some(Ok(()))) && self.healthy.load(Ordering::Relaxed)
    }
}

/// An engine that can take part in a run, with its config at snapshot time
#[derive(Clone)]
pub struct EnabledEngine {
    pub id: String,
    pub adapter: Arc<dyn EngineAdapter>,
    pub config: EngineConfig,
}

impl std::fmt::Debug for EnabledEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnabledEngine")
            .field("id", &self.id)
            .field("adapter", &self.adapter.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Everything a single request needs, captured once at request start
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    engines: Vec<EnabledEngine>,
    config: Arc<ConfigLayer>,
}

impl EngineSnapshot {
    pub fn new(engines: Vec<EnabledEngine>, config: Arc<ConfigLayer>) -> Self {
        Self { engines, config }
    }

    /// Enabled engines in registration order
    pub fn engines(&self) -> &[EnabledEngine] {
        &self.engines
    }

    pub fn config(&self) -> &ConfigLayer {
        &self.config
    }

    pub fn settings(&self) -> &GlobalSettings {
        self.config.settings()
    }

    /// Look up an enabled engine
    pub fn get(&self, engine_id: &str) -> Option<&EnabledEngine> {
        self.engines.iter().find(|e| e.id == engine_id)
    }

    /// Configured default engine if enabled, otherwise the first enabled one
    pub fn default_engine(&self) -> Option<&EnabledEngine> {
        self.settings()
            .default_engine
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.engines.first())
    }

    /// Keep only the listed engines (empty list keeps all)
    pub fn restrict_to(&self, engine_ids: &[String]) -> Self {
        if engine_ids.is_empty() {
            return self.clone();
        }
        Self {
            engines: self
                .engines
                .iter()
                .filter(|e| engine_ids.contains(&e.id))
                .cloned()
                .collect(),
            config: Arc::clone(&self.config),
        }
    }

    /// Same engines under different global settings
    pub fn with_settings(&self, settings: GlobalSettings) -> Result<Self> {
        Ok(Self {
            engines: self.engines.clone(),
            config: Arc::new(self.config.with_settings(settings)?),
        })
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Registry of analysis engines.
///
/// Adapter instances and configuration are held separately: configuration
/// is an immutable [`ConfigLayer`] swapped atomically, so weight or threshold
/// changes never restart adapters and never leak into in-flight requests.
pub struct EngineRegistry {
    engines: RwLock<Vec<Arc<RegisteredEngine>>>,
    config: RwLock<Arc<ConfigLayer>>,
    config_version: AtomicU64,
}

impl EngineRegistry {
    /// Create an empty registry with the given global settings
    pub fn new(settings: GlobalSettings) -> Result<Self> {
        let layer = ConfigLayer::new(HashMap::new(), settings)?;
        Ok(Self {
            engines: RwLock::new(Vec::new()),
            config: RwLock::new(Arc::new(layer)),
            config_version: AtomicU64::new(0),
        })
    }

    /// Create a registry whose configuration comes from a source
    pub async fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let settings = source.load_global_settings().await?;
        let configs = source.load_configs().await?;
        let registry = Self::new(settings.clone())?;
        registry.update_configs(configs, settings)?;
        Ok(registry)
    }

    /// Register an adapter; replaces any adapter already registered under `id`
    pub fn register(
        &self,
        id: impl Into<String>,
        adapter: Arc<dyn EngineAdapter>,
        config: EngineConfig,
    ) -> Result<()> {
        let id = id.into();
        self.swap_config(|layer| layer.with_engine(&id, config))?;

        let mut engines = self.engines.write();
        let entry = Arc::new(RegisteredEngine::new(id.clone(), adapter));
        match engines.iter().position(|e| e.id == id) {
            Some(pos) => {
                debug!("Replacing engine '{}'", id);
                engines[pos] = entry;
            }
            None => engines.push(entry),
        }
        Ok(())
    }

    /// Register an adapter keeping whatever config the layer already has for it
    pub fn register_adapter(&self, id: impl Into<String>, adapter: Arc<dyn EngineAdapter>) -> Result<()> {
        let id = id.into();
        let config = self.config().engine_config(&id);
        self.register(id, adapter, config)
    }

    /// Remove an engine; in-flight requests keep their snapshot
    pub fn unregister(&self, id: &str) -> bool {
        let mut engines = self.engines.write();
        let before = engines.len();
        engines.retain(|e| e.id != id);
        before != engines.len()
    }

    /// Initialize all pending adapters concurrently.
    ///
    /// Returns each engine's availability; failures are logged and the
    /// engine is excluded from runs, the registry itself never fails.
    pub async fn initialize(&self) -> HashMap<String, bool> {
        let engines = self.engines.read().clone();
        let outcomes = join_all(engines.iter().map(|e| e.ensure_initialized())).await;

        let available = outcomes.iter().filter(|ok| **ok).count();
        info!("Initialized {}/{} engines", available, engines.len());

        engines
            .iter()
            .zip(outcomes)
            .map(|(e, ok)| (e.id.clone(), ok))
            .collect()
    }

    /// Enabled, initialized and healthy engines with their current config
    pub async fn get_enabled(&self) -> Vec<EnabledEngine> {
        self.initialize_pending().await;
        let layer = self.config();
        self.enabled_from(&layer)
    }

    /// Probe every initialized engine and record the outcome
    pub async fn health_check(&self) -> HashMap<String, bool> {
        self.initialize_pending().await;
        let engines = self.engines.read().clone();

        let probes = engines.iter().map(|e| async move {
            let healthy = match e.init.get() {
                Some(Ok(())) => e.adapter.is_healthy().await,
                _ => false,
            };
            let was = e.healthy.swap(healthy, Ordering::Relaxed);
            if was != healthy {
                if healthy {
                    info!("Engine '{}' is healthy again", e.id);
                } else {
                    warn!("Engine '{}' failed its health check", e.id);
                }
            }
            (e.id.clone(), healthy)
        });

        join_all(probes).await.into_iter().collect()
    }

    /// Capture engines and configuration for one request
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.initialize_pending().await;
        let layer = self.config();
        let engines = self.enabled_from(&layer);
        EngineSnapshot::new(engines, layer)
    }

    /// Current configuration layer
    pub fn config(&self) -> Arc<ConfigLayer> {
        Arc::clone(&self.config.read())
    }

    /// Replace all engine configs and global settings
    pub fn update_configs(
        &self,
        configs: HashMap<String, EngineConfig>,
        settings: GlobalSettings,
    ) -> Result<()> {
        self.swap_config(|_| ConfigLayer::new(configs, settings))
    }

    /// Replace one engine's config
    pub fn update_engine_config(&self, id: &str, config: EngineConfig) -> Result<()> {
        self.swap_config(|layer| layer.with_engine(id, config))
    }

    /// Re-read configuration from a source without touching adapters
    pub async fn reload(&self, source: &dyn ConfigSource) -> Result<()> {
        let settings = source.load_global_settings().await?;
        let configs = source.load_configs().await?;
        self.update_configs(configs, settings)?;
        info!("Engine configuration reloaded (version {})", self.config().version());
        Ok(())
    }

    /// Registered engine ids in registration order
    pub fn engine_ids(&self) -> Vec<String> {
        self.engines.read().iter().map(|e| e.id.clone()).collect()
    }

    /// Number of registered engines
    pub fn count(&self) -> usize {
        self.engines.read().len()
    }

    async fn initialize_pending(&self) {
        let pending: Vec<_> = self
            .engines
            .read()
            .iter()
            .filter(|e| !e.init.initialized())
            .cloned()
            .collect();
        if !pending.is_empty() {
            join_all(pending.iter().map(|e| e.ensure_initialized())).await;
        }
    }

    fn enabled_from(&self, layer: &ConfigLayer) -> Vec<EnabledEngine> {
        self.engines
            .read()
            .iter()
            .filter(|e| e.is_available())
            .filter_map(|e| {
                let config = layer.engine_config(&e.id);
                config.enabled.then(|| EnabledEngine {
                    id: e.id.clone(),
                    adapter: Arc::clone(&e.adapter),
                    config,
                })
            })
            .collect()
    }

    fn swap_config<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(&ConfigLayer) -> Result<ConfigLayer>,
    {
        let mut guard = self.config.write();
        let next = build(&guard)?;
        let version = self.config_version.fetch_add(1, Ordering::SeqCst) + 1;
        *guard = Arc::new(next.with_version(version));
        Ok(())
    }
}
