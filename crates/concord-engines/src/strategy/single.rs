use super::{engine_cost, finish, invoke_engine, with_cancellation, ExecutionStrategy};
use crate::engine::ExtractionContext;
use crate::merge::merge_dedup;
use crate::registry::{EnabledEngine, EngineSnapshot};
use async_trait::async_trait;
use concord_core::{CallerContext, Error, MergedResult, Result, StrategyKind};
use std::time::{Duration, Instant};

/// Runs exactly one engine
#[derive(Debug, Clone, Default)]
pub struct SingleStrategy {
    engine_id: Option<String>,
}

impl SingleStrategy {
    /// Use the snapshot's default engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific engine; the run fails if it is not available
    pub fn with_engine(engine_id: impl Into<String>) -> Self {
        Self {
            engine_id: Some(engine_id.into()),
        }
    }

    fn resolve<'a>(&self, snapshot: &'a EngineSnapshot) -> Result<&'a EnabledEngine> {
        match &self.engine_id {
            Some(id) => snapshot.get(id).ok_or_else(|| Error::engine_unavailable(id)),
            None => snapshot.default_engine().ok_or(Error::NoEngineAvailable),
        }
    }
}

#[async_trait]
impl ExecutionStrategy for SingleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Single
    }

    async fn process(
        &self,
        text: &str,
        snapshot: &EngineSnapshot,
        caller: &CallerContext,
    ) -> Result<MergedResult> {
        with_cancellation(caller, async {
            let started = Instant::now();
            let engine = self.resolve(snapshot)?;

            let ctx = ExtractionContext::new(caller);
            let result =
                invoke_engine(engine, text, &ctx, snapshot.settings().engine_timeout_ms).await;
            let results = [result];
            let spans = merge_dedup(&results, snapshot.config());

            Ok(finish(StrategyKind::Single, spans, &results, caller, started))
        })
        .await
    }

    fn estimated_cost(&self, text_len: usize, snapshot: &EngineSnapshot) -> Duration {
        self.resolve(snapshot)
            .map(|engine| engine_cost(engine, text_len, snapshot.settings()))
            .unwrap_or_default()
    }
}
