use super::{engine_cost, ensure_engines, finish, invoke_engine, with_cancellation, ExecutionStrategy};
use crate::engine::ExtractionContext;
use crate::merge::merge_dedup;
use crate::registry::{EnabledEngine, EngineSnapshot};
use async_trait::async_trait;
use concord_core::{CallerContext, MergedResult, MergedSpan, Result, StrategyKind};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Chains engines one at a time, feeding each the spans merged so far
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

impl SequentialStrategy {
    /// Engines in chain order.
    ///
    /// A non-empty `pipeline_order` lists the chain explicitly; listed ids
    /// that are not enabled are skipped. Otherwise registration order.
    pub fn chain(snapshot: &EngineSnapshot) -> Vec<&EnabledEngine> {
        let order = &snapshot.settings().pipeline_order;
        if order.is_empty() {
            return snapshot.engines().iter().collect();
        }
        order
            .iter()
            .filter_map(|id| {
                let engine = snapshot.get(id);
                if engine.is_none() {
                    debug!("Pipeline engine '{}' not enabled, skipping", id);
                }
                engine
            })
            .collect()
    }
}

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn process(
        &self,
        text: &str,
        snapshot: &EngineSnapshot,
        caller: &CallerContext,
    ) -> Result<MergedResult> {
        with_cancellation(caller, async {
            let started = Instant::now();
            ensure_engines(snapshot)?;

            let timeout_ms = snapshot.settings().engine_timeout_ms;
            let mut results = Vec::new();
            let mut spans: Vec<MergedSpan> = Vec::new();
            let mut aborted_at = None;

            for engine in Self::chain(snapshot) {
                let ctx = ExtractionContext::with_prior(caller, &spans);
                let result = invoke_engine(engine, text, &ctx, timeout_ms).await;
                let fatal = result.error.as_ref().is_some_and(|e| e.is_fatal());

                results.push(result);
                spans = merge_dedup(&results, snapshot.config());

                if fatal {
                    warn!("Sequential chain aborted at engine '{}'", engine.id);
                    aborted_at = Some(engine.id.clone());
                    break;
                }
            }

            let mut merged = finish(StrategyKind::Sequential, spans, &results, caller, started);
            if let Some(id) = aborted_at {
                merged.warn(format!(
                    "chain aborted at engine '{}'; partial results kept",
                    id
                ));
            }
            Ok(merged)
        })
        .await
    }

    fn estimated_cost(&self, text_len: usize, snapshot: &EngineSnapshot) -> Duration {
        Self::chain(snapshot)
            .into_iter()
            .map(|engine| engine_cost(engine, text_len, snapshot.settings()))
            .sum()
    }
}
