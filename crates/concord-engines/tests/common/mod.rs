//! Mock engines for testing
//!
//! Configurable implementations of the EngineAdapter trait for testing
//! strategies, voting and failure isolation.

#![allow(dead_code)]

use async_trait::async_trait;
use concord_core::Span;
use concord_engines::{
    EngineAdapter, EngineConfig, EngineError, EngineRegistry, ExtractionContext, GlobalSettings,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A mock engine returning fixed spans
pub struct MockEngine {
    name: String,
    spans: Vec<(String, String, f64)>,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
    last_prior_count: AtomicUsize,
    concurrency: Option<Arc<ConcurrencyProbe>>,
}

impl MockEngine {
    /// Create a mock engine with no spans
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spans: Vec::new(),
            simulated_latency: None,
            call_count: AtomicU32::new(0),
            last_prior_count: AtomicUsize::new(0),
            concurrency: None,
        }
    }

    /// Add a span this engine will return
    pub fn with_span(mut self, content: &str, span_type: &str, confidence: f64) -> Self {
        self.spans
            .push((content.to_string(), span_type.to_string(), confidence));
        self
    }

    /// Set simulated latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    /// Track concurrent calls
    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.concurrency = Some(probe);
        self
    }

    /// Number of times extract was called
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Number of prior spans seen on the last call
    pub fn last_prior_count(&self) -> usize {
        self.last_prior_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        _text: &str,
        ctx: &ExtractionContext<'_>,
    ) -> Result<Vec<Span>, EngineError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.last_prior_count
            .store(ctx.prior_spans.len(), Ordering::Relaxed);

        let _guard = self.concurrency.as_ref().map(|p| p.enter());
        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        Ok(self
            .spans
            .iter()
            .map(|(content, span_type, confidence)| {
                Span::new(content.as_str(), span_type.as_str(), *confidence, &self.name)
            })
            .collect())
    }
}

/// An engine that always fails
pub struct FailingEngine {
    name: String,
    error: EngineError,
}

impl FailingEngine {
    /// Fails with a recoverable execution error
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            error: EngineError::Execution("Simulated engine failure".to_string()),
        }
    }

    /// Fails with an error that stops sequential chains
    pub fn fatal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            error: EngineError::Fatal("Simulated fatal failure".to_string()),
        }
    }
}

#[async_trait]
impl EngineAdapter for FailingEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        _text: &str,
        _ctx: &ExtractionContext<'_>,
    ) -> Result<Vec<Span>, EngineError> {
        Err(self.error.clone())
    }
}

/// An engine that panics inside extract
pub struct PanickingEngine;

#[async_trait]
impl EngineAdapter for PanickingEngine {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn extract(
        &self,
        _text: &str,
        _ctx: &ExtractionContext<'_>,
    ) -> Result<Vec<Span>, EngineError> {
        panic!("engine bug");
    }
}

/// Records the highest number of overlapping calls
#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

pub struct ProbeGuard<'a>(&'a ConcurrencyProbe);

impl ConcurrencyProbe {
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Box an engine as a shared adapter
pub fn shared<E: EngineAdapter + 'static>(engine: E) -> Arc<dyn EngineAdapter> {
    Arc::new(engine)
}

/// Share an engine the test keeps a handle to
pub fn erased<E: EngineAdapter + 'static>(engine: &Arc<E>) -> Arc<dyn EngineAdapter> {
    engine.clone()
}

/// Registry with the given engines registered in order
pub fn registry(
    settings: GlobalSettings,
    engines: Vec<(&str, Arc<dyn EngineAdapter>, EngineConfig)>,
) -> EngineRegistry {
    let registry = EngineRegistry::new(settings).unwrap();
    for (id, adapter, config) in engines {
        registry.register(id, adapter, config).unwrap();
    }
    registry
}

/// Engine config with a voting weight
pub fn weighted(weight: f64) -> EngineConfig {
    EngineConfig::default().with_weight(weight)
}
