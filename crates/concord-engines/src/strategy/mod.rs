//! Execution strategies
//!
//! Every strategy turns one text and one [`EngineSnapshot`] into a
//! [`MergedResult`]:
//! - [`SingleStrategy`]: one engine
//! - [`ParallelStrategy`]: all engines concurrently, merged by dedup
//! - [`SequentialStrategy`]: engines chained, each sees earlier spans
//! - [`EnsembleStrategy`]: parallel fan-out plus consensus voting
//! - [`AdaptiveStrategy`]: picks one of the above per input
//!
//! Engine calls are isolated: a timeout, error or panic in one engine turns
//! into an empty, error-flagged [`EngineResult`] and never fails the run.

mod adaptive;
mod ensemble;
mod parallel;
mod sequential;
mod single;

pub use adaptive::AdaptiveStrategy;
pub use ensemble::EnsembleStrategy;
pub use parallel::ParallelStrategy;
pub use sequential::SequentialStrategy;
pub use single::SingleStrategy;

use crate::config::GlobalSettings;
use crate::engine::ExtractionContext;
use crate::registry::{EnabledEngine, EngineSnapshot};
use async_trait::async_trait;
use concord_core::{
    CallerContext, EngineFailure, EngineResult, EngineRunSummary, Error, MergedResult,
    MergedSpan, Result, StrategyKind,
};
use futures::future::join_all;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Common interface of all execution strategies
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Run the engines in `snapshot` over `text`
    async fn process(
        &self,
        text: &str,
        snapshot: &EngineSnapshot,
        caller: &CallerContext,
    ) -> Result<MergedResult>;

    /// Expected wall-clock cost for a text of `text_len` chars
    fn estimated_cost(&self, text_len: usize, snapshot: &EngineSnapshot) -> Duration;
}

/// Builds strategies by kind
#[derive(Debug, Clone, Default)]
pub struct StrategyFactory {
    single_engine: Option<String>,
}

impl StrategyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the engine used by the single strategy
    pub fn with_single_engine(mut self, engine_id: impl Into<String>) -> Self {
        self.single_engine = Some(engine_id.into());
        self
    }

    pub fn single_engine(&self) -> Option<&str> {
        self.single_engine.as_deref()
    }

    /// Create a strategy of the given kind
    pub fn create(&self, kind: StrategyKind) -> Arc<dyn ExecutionStrategy> {
        match kind {
            StrategyKind::Single => match &self.single_engine {
                Some(id) => Arc::new(SingleStrategy::with_engine(id.clone())),
                None => Arc::new(SingleStrategy::new()),
            },
            StrategyKind::Parallel => Arc::new(ParallelStrategy),
            StrategyKind::Sequential => Arc::new(SequentialStrategy),
            StrategyKind::Ensemble => Arc::new(EnsembleStrategy),
            StrategyKind::Adaptive => Arc::new(AdaptiveStrategy::new(self.clone())),
        }
    }
}

/// Invoke one engine with its timeout, catching errors and panics
pub async fn invoke_engine(
    engine: &EnabledEngine,
    text: &str,
    ctx: &ExtractionContext<'_>,
    default_timeout_ms: u64,
) -> EngineResult {
    let timeout_ms = engine.config.timeout_ms.unwrap_or(default_timeout_ms);
    let start = Instant::now();

    let call = AssertUnwindSafe(engine.adapter.extract(text, ctx)).catch_unwind();
    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), call).await;
    let elapsed = start.elapsed();

    metrics::counter!("concord_engine_calls_total", "engine" => engine.id.clone()).increment(1);
    metrics::histogram!("concord_engine_latency_us", "engine" => engine.id.clone())
        .record(elapsed.as_micros() as f64);

    let failure = match outcome {
        Ok(Ok(Ok(mut spans))) => {
            spans.truncate(engine.config.max_results);
            for span in &mut spans {
                if span.source_engine != engine.id {
                    span.source_engine = engine.id.clone();
                }
            }
            debug!(
                engine = %engine.id,
                spans = spans.len(),
                elapsed_us = elapsed.as_micros() as u64,
                "Engine call complete"
            );
            return EngineResult::success(&engine.id, spans, elapsed);
        }
        Ok(Ok(Err(e))) => {
            warn!("Engine '{}' failed: {}", engine.id, e);
            e.into_failure()
        }
        Ok(Err(_)) => {
            warn!("Engine '{}' panicked during extraction", engine.id);
            EngineFailure::Execution("engine panicked".to_string())
        }
        Err(_) => {
            warn!("Engine '{}' timed out after {}ms", engine.id, timeout_ms);
            EngineFailure::Timeout { timeout_ms }
        }
    };

    metrics::counter!(
        "concord_engine_failures_total",
        "engine" => engine.id.clone(),
        "kind" => failure.kind()
    )
    .increment(1);

    EngineResult::failed(&engine.id, failure, elapsed)
}

/// Invoke engines concurrently, at most `max_parallel_engines` at a time.
///
/// Futures are polled in place rather than spawned, so dropping the returned
/// future cancels every in-flight call. Results keep engine order.
pub async fn fan_out(
    engines: &[EnabledEngine],
    text: &str,
    caller: &CallerContext,
    settings: &GlobalSettings,
) -> Vec<EngineResult> {
    let permits = Semaphore::new(settings.max_parallel_engines);
    let timeout_ms = settings.engine_timeout_ms;

    let calls = engines.iter().map(|engine| {
        let permits = &permits;
        async move {
            let _permit = permits.acquire().await;
            let ctx = ExtractionContext::new(caller);
            invoke_engine(engine, text, &ctx, timeout_ms).await
        }
    });

    join_all(calls).await
}

/// Run `work` unless the caller cancels first
pub(crate) async fn with_cancellation<T, F>(caller: &CallerContext, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match &caller.cancellation {
        Some(token) => {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Request cancelled; discarding partial results");
                    Err(Error::Cancelled)
                }
                out = work => out,
            }
        }
        None => work.await,
    }
}

/// Assemble the final result of a run
pub(crate) fn finish(
    kind: StrategyKind,
    spans: Vec<MergedSpan>,
    results: &[EngineResult],
    caller: &CallerContext,
    started: Instant,
) -> MergedResult {
    let mut merged = MergedResult::empty(kind);
    merged.spans = spans;
    merged.cohort = caller.cohort;
    merged.engines = results.iter().map(EngineRunSummary::from).collect();

    for result in results {
        if let Some(failure) = &result.error {
            merged.warn(format!("engine '{}' {}", result.engine_id, failure));
        }
    }
    if !results.is_empty() && results.iter().all(EngineResult::is_error) {
        merged.warn(format!(
            "all {} engines failed; result is empty",
            results.len()
        ));
    }

    merged.total_latency_us = started.elapsed().as_micros() as u64;
    metrics::histogram!("concord_strategy_latency_us", "strategy" => kind.as_str())
        .record(merged.total_latency_us as f64);

    merged
}

/// Expected latency of one engine, capped by its timeout
pub(crate) fn engine_cost(engine: &EnabledEngine, text_len: usize, settings: &GlobalSettings) -> Duration {
    let timeout = Duration::from_millis(engine.config.timeout_ms.unwrap_or(settings.engine_timeout_ms));
    engine.adapter.estimated_latency(text_len).min(timeout)
}

/// Cost of a bounded fan-out: the slowest engine once per wave of permits
pub(crate) fn fan_out_cost(snapshot: &EngineSnapshot, text_len: usize) -> Duration {
    let settings = snapshot.settings();
    let slowest = snapshot
        .engines()
        .iter()
        .map(|e| engine_cost(e, text_len, settings))
        .max()
        .unwrap_or_default();
    let waves = snapshot.len().div_ceil(settings.max_parallel_engines.max(1));
    slowest * waves as u32
}

fn ensure_engines(snapshot: &EngineSnapshot) -> Result<()> {
    if snapshot.is_empty() {
        Err(Error::NoEngineAvailable)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLayer, EngineConfig};
    use crate::engine::{EngineAdapter, EngineError};
    use concord_core::Span;
    use std::collections::HashMap;

    struct Fixed(Vec<Span>);

    #[async_trait]
    impl EngineAdapter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn extract(
            &self,
            _text: &str,
            _ctx: &ExtractionContext<'_>,
        ) -> std::result::Result<Vec<Span>, EngineError> {
            Ok(self.0.clone())
        }
    }

    fn enabled(id: &str, spans: Vec<Span>, config: EngineConfig) -> EnabledEngine {
        EnabledEngine {
            id: id.to_string(),
            adapter: Arc::new(Fixed(spans)),
            config,
        }
    }

    #[tokio::test]
    async fn test_invoke_truncates_and_stamps_source() {
        let mut config = EngineConfig::default();
        config.max_results = 1;
        let engine = enabled(
            "registered-id",
            vec![
                Span::new("a", "org", 0.9, "internal-name"),
                Span::new("b", "org", 0.8, "internal-name"),
            ],
            config,
        );
        let caller = CallerContext::new();

        let result = invoke_engine(&engine, "text", &ExtractionContext::new(&caller), 100).await;

        assert!(!result.is_error());
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.spans[0].source_engine, "registered-id");
    }

    #[test]
    fn test_factory_kinds() {
        let factory = StrategyFactory::new().with_single_engine("spacy");
        for kind in [
            StrategyKind::Single,
            StrategyKind::Parallel,
            StrategyKind::Sequential,
            StrategyKind::Ensemble,
            StrategyKind::Adaptive,
        ] {
            assert_eq!(factory.create(kind).kind(), kind);
        }
        assert_eq!(factory.single_engine(), Some("spacy"));
    }

    #[test]
    fn test_fan_out_cost_counts_waves() {
        let mut settings = GlobalSettings::default();
        settings.max_parallel_engines = 2;
        let engines: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| enabled(id, vec![], EngineConfig::default()))
            .collect();
        let layer = ConfigLayer::new(HashMap::new(), settings).unwrap();
        let snapshot = EngineSnapshot::new(engines.clone(), Arc::new(layer));

        let one_wave = engines[0].adapter.estimated_latency(100);
        assert_eq!(fan_out_cost(&snapshot, 100), one_wave * 2);
    }

    #[test]
    fn test_finish_flags_total_failure() {
        let results = vec![EngineResult::failed(
            "a",
            EngineFailure::Timeout { timeout_ms: 5 },
            Duration::from_millis(5),
        )];

        let merged = finish(
            StrategyKind::Parallel,
            Vec::new(),
            &results,
            &CallerContext::new(),
            Instant::now(),
        );

        assert!(merged.is_empty());
        assert_eq!(merged.warnings.len(), 2);
        assert!(merged.warnings[1].starts_with("all 1 engines failed"));
    }
}
