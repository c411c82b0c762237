use super::{with_cancellation, ExecutionStrategy, StrategyFactory};
use crate::registry::EngineSnapshot;
use crate::selector::AdaptiveSelector;
use async_trait::async_trait;
use concord_core::{CallerContext, MergedResult, Result, StrategyKind};
use std::time::Duration;
use tracing::debug;

/// Chooses a strategy per input and delegates to it.
///
/// Thresholds come from the snapshot's settings, so a config swap changes
/// selection for new requests only.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveStrategy {
    factory: StrategyFactory,
}

impl AdaptiveStrategy {
    pub fn new(factory: StrategyFactory) -> Self {
        Self { factory }
    }

    fn selector(snapshot: &EngineSnapshot) -> AdaptiveSelector {
        AdaptiveSelector::new(snapshot.settings().adaptive.clone())
    }
}

#[async_trait]
impl ExecutionStrategy for AdaptiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Adaptive
    }

    async fn process(
        &self,
        text: &str,
        snapshot: &EngineSnapshot,
        caller: &CallerContext,
    ) -> Result<MergedResult> {
        with_cancellation(caller, async {
            let (kind, profile) = Self::selector(snapshot).select_for(text);
            debug!(
                strategy = %kind,
                length = profile.length,
                complexity = profile.complexity,
                "Adaptive selection"
            );
            metrics::counter!("concord_adaptive_selections_total", "strategy" => kind.as_str())
                .increment(1);

            self.factory.create(kind).process(text, snapshot, caller).await
        })
        .await
    }

    fn estimated_cost(&self, text_len: usize, snapshot: &EngineSnapshot) -> Duration {
        let kind = Self::selector(snapshot).select(text_len, 0.0);
        self.factory.create(kind).estimated_cost(text_len, snapshot)
    }
}
