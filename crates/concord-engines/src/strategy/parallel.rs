use super::{ensure_engines, fan_out, fan_out_cost, finish, with_cancellation, ExecutionStrategy};
use crate::merge::merge_dedup;
use crate::registry::EngineSnapshot;
use async_trait::async_trait;
use concord_core::{CallerContext, MergedResult, Result, StrategyKind};
use std::time::{Duration, Instant};

/// Runs every enabled engine concurrently and merges by dedup
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
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

            let results = fan_out(snapshot.engines(), text, caller, snapshot.settings()).await;
            let spans = merge_dedup(&results, snapshot.config());

            Ok(finish(StrategyKind::Parallel, spans, &results, caller, started))
        })
        .await
    }

    fn estimated_cost(&self, text_len: usize, snapshot: &EngineSnapshot) -> Duration {
        fan_out_cost(snapshot, text_len)
    }
}
