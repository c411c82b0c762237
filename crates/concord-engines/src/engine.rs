//! Engine adapter trait and common types

use async_trait::async_trait;
use concord_core::{CallerContext, EngineFailure, MergedSpan, Span};
use std::time::Duration;

/// Fixed per-call overhead assumed by the default latency estimate
const BASE_LATENCY_US: u64 = 2_000;

/// Per-character cost assumed by the default latency estimate
const PER_CHAR_LATENCY_NS: u64 = 5_000;

/// Failure reported by an engine adapter
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Setup failed; the engine is excluded from the registry
    #[error("initialization failed: {0}")]
    Init(String),

    /// A single extraction failed; other engines are unaffected
    #[error("extraction failed: {0}")]
    Execution(String),

    /// The engine is in a state where chained engines should not run after it
    #[error("fatal engine failure: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Whether a sequential chain must stop after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Convert into the failure recorded on an engine result
    pub fn into_failure(self) -> EngineFailure {
        match self {
            Self::Init(msg) => EngineFailure::Unavailable(msg),
            Self::Execution(msg) => EngineFailure::Execution(msg),
            Self::Fatal(msg) => EngineFailure::Fatal(msg),
        }
    }
}

/// Per-call context handed to an engine alongside the text
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    /// Caller on whose behalf the engine runs
    pub caller: &'a CallerContext,

    /// Spans merged so far by earlier engines in a sequential chain
    pub prior_spans: &'a [MergedSpan],
}

impl<'a> ExtractionContext<'a> {
    /// Context without enrichment
    pub fn new(caller: &'a CallerContext) -> Self {
        Self {
            caller,
            prior_spans: &[],
        }
    }

    /// Context carrying the partial merge of earlier engines
    pub fn with_prior(caller: &'a CallerContext, prior_spans: &'a [MergedSpan]) -> Self {
        Self {
            caller,
            prior_spans,
        }
    }

    /// Whether an earlier engine already produced equivalent content
    pub fn already_found(&self, normalized: &str) -> bool {
        self.prior_spans
            .iter()
            .any(|m| concord_core::text::normalize_content(&m.span.content) == normalized)
    }
}

/// Trait for all analysis engines.
///
/// Implementations wrap one concrete engine; the orchestration core never
/// sees engine-specific types.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Engine name, used in logs
    fn name(&self) -> &str;

    /// One-time setup (model loading, warm-up)
    async fn initialize(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Liveness probe
    async fn is_healthy(&self) -> bool {
        true
    }

    /// Extract spans from the given text
    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext<'_>,
    ) -> Result<Vec<Span>, EngineError>;

    /// Expected latency for a text of the given length
    fn estimated_latency(&self, text_len: usize) -> Duration {
        Duration::from_micros(BASE_LATENCY_US)
            + Duration::from_nanos(PER_CHAR_LATENCY_NS.saturating_mul(text_len as u64))
    }
}

/// Surrounding text for a match, widened by `radius` bytes on each side and
/// snapped to char boundaries
pub fn context_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut from = start.saturating_sub(radius);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = end.saturating_add(radius).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim()
}
