use super::{ensure_engines, fan_out, fan_out_cost, finish, with_cancellation, ExecutionStrategy};
use crate::consensus::ConsensusVoter;
use crate::registry::EngineSnapshot;
use async_trait::async_trait;
use concord_core::{CallerContext, EngineResult, MergedResult, Result, StrategyKind};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Parallel fan-out followed by weighted consensus voting
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleStrategy;

#[async_trait]
impl ExecutionStrategy for EnsembleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ensemble
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
            let by_engine: HashMap<String, EngineResult> = results
                .iter()
                .map(|r| (r.engine_id.clone(), r.clone()))
                .collect();

            let voter = ConsensusVoter::from_settings(snapshot.settings());
            let spans = voter.vote(&by_engine, snapshot.config());

            Ok(finish(StrategyKind::Ensemble, spans, &results, caller, started))
        })
        .await
    }

    fn estimated_cost(&self, text_len: usize, snapshot: &EngineSnapshot) -> Duration {
        fan_out_cost(snapshot, text_len)
    }
}
