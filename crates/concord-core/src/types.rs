//! Core types for Concord

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Category of an extracted span.
///
/// The set is open: engines may emit categories Concord has no variant for,
/// which are kept as lower-cased [`SpanType::Custom`] values so that
/// comparisons stay case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpanType {
    Person,
    Organization,
    Location,
    Date,
    Money,
    Email,
    Custom(String),
}

impl SpanType {
    /// Canonical lower-case name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Date => "date",
            Self::Money => "money",
            Self::Email => "email",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for SpanType {
    fn from(value: &str) -> Self {
        let lowered = value.trim().to_lowercase();
        match lowered.as_str() {
            "person" | "per" => Self::Person,
            "organization" | "organisation" | "org" => Self::Organization,
            "location" | "loc" | "gpe" => Self::Location,
            "date" => Self::Date,
            "money" => Self::Money,
            "email" => Self::Email,
            _ => Self::Custom(lowered),
        }
    }
}

impl From<String> for SpanType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<SpanType> for String {
    fn from(value: SpanType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SpanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extracted unit of interest, produced by a single engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Extracted text
    pub content: String,

    /// Category of the span
    #[serde(rename = "type")]
    pub span_type: SpanType,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    /// Id of the engine that produced this span
    pub source_engine: String,

    /// Surrounding text, if the engine reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_context: Option<String>,
}

impl Span {
    /// Create a new span; confidence is clamped into [0, 1]
    pub fn new(
        content: impl Into<String>,
        span_type: impl Into<SpanType>,
        confidence: f64,
        source_engine: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            span_type: span_type.into(),
            confidence: clamp_unit(confidence),
            source_engine: source_engine.into(),
            source_context: None,
        }
    }

    /// Attach surrounding context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.source_context = Some(context.into());
        self
    }
}

/// Why an engine contributed no spans to a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineFailure {
    /// The engine exceeded its time budget
    Timeout { timeout_ms: u64 },

    /// The engine reported a recoverable failure
    Execution(String),

    /// The engine reported a failure that should stop a sequential chain
    Fatal(String),

    /// The engine was skipped because it is not available
    Unavailable(String),
}

impl EngineFailure {
    /// Short label used in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Execution(_) => "execution",
            Self::Fatal(_) => "fatal",
            Self::Unavailable(_) => "unavailable",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { timeout_ms } => write!(f, "timed out after {}ms", timeout_ms),
            Self::Execution(msg) => write!(f, "execution failed: {}", msg),
            Self::Fatal(msg) => write!(f, "fatal failure: {}", msg),
            Self::Unavailable(msg) => write!(f, "unavailable: {}", msg),
        }
    }
}

/// Output of a single engine invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    /// Engine that produced the result
    pub engine_id: String,

    /// Extracted spans, in engine order
    pub spans: Vec<Span>,

    /// Wall-clock processing time
    pub duration: Duration,

    /// Set when the invocation failed; spans are then empty
    pub error: Option<EngineFailure>,
}

impl EngineResult {
    /// Create a successful result
    pub fn success(engine_id: impl Into<String>, spans: Vec<Span>, duration: Duration) -> Self {
        Self {
            engine_id: engine_id.into(),
            spans,
            duration,
            error: None,
        }
    }

    /// Create an empty, error-flagged result
    pub fn failed(engine_id: impl Into<String>, failure: EngineFailure, duration: Duration) -> Self {
        Self {
            engine_id: engine_id.into(),
            spans: Vec::new(),
            duration,
            error: Some(failure),
        }
    }

    /// Whether the invocation failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Quality bucket derived from a span's final confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Minimum confidence for the high tier
    pub const HIGH_MIN: f64 = 0.8;

    /// Minimum confidence for the medium tier
    pub const MEDIUM_MIN: f64 = 0.6;

    /// Derive the tier for a confidence value
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= Self::HIGH_MIN {
            Self::High
        } else if confidence >= Self::MEDIUM_MIN {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked span in the final result, with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedSpan {
    /// Representative span (confidence is the final, possibly boosted, value)
    pub span: Span,

    /// Engines that contributed an equivalent span
    pub sources_used: Vec<String>,

    /// Fraction of total engine weight that agreed on this span
    pub consensus_ratio: f64,

    /// Quality bucket of the final confidence
    pub quality_tier: QualityTier,
}

impl MergedSpan {
    /// Final confidence
    pub fn confidence(&self) -> f64 {
        self.span.confidence
    }
}

/// Execution strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Single,
    Parallel,
    Sequential,
    Ensemble,
    Adaptive,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
            Self::Ensemble => "ensemble",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            "ensemble" => Ok(Self::Ensemble),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(crate::Error::config(format!("unknown strategy '{}'", other))),
        }
    }
}

/// Pipeline variant a caller is routed to during a canary rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cohort {
    Legacy,
    New,
}

impl Cohort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::New => "new",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact per-engine record attached to a merged result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRunSummary {
    pub engine_id: String,
    pub span_count: usize,
    pub duration_us: u64,
    pub error: Option<EngineFailure>,
}

impl From<&EngineResult> for EngineRunSummary {
    fn from(result: &EngineResult) -> Self {
        Self {
            engine_id: result.engine_id.clone(),
            span_count: result.spans.len(),
            duration_us: result.duration.as_micros() as u64,
            error: result.error.clone(),
        }
    }
}

/// Final output of a strategy run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedResult {
    /// Ranked spans, highest confidence first
    pub spans: Vec<MergedSpan>,

    /// Strategy that actually produced the spans
    pub strategy: StrategyKind,

    /// Cohort the caller was routed to, if known
    pub cohort: Option<Cohort>,

    /// One summary per engine invoked
    pub engines: Vec<EngineRunSummary>,

    /// Non-fatal problems encountered during the run
    pub warnings: Vec<String>,

    /// Total run time
    pub total_latency_us: u64,
}

impl MergedResult {
    /// Create an empty result for a strategy
    pub fn empty(strategy: StrategyKind) -> Self {
        Self {
            spans: Vec::new(),
            strategy,
            cohort: None,
            engines: Vec::new(),
            warnings: Vec::new(),
            total_latency_us: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Best tier among the returned spans
    pub fn overall_quality(&self) -> Option<QualityTier> {
        self.spans.iter().map(|s| s.quality_tier).max()
    }

    /// Engines whose invocation failed
    pub fn failed_engines(&self) -> Vec<&str> {
        self.engines
            .iter()
            .filter(|e| e.error.is_some())
            .map(|e| e.engine_id.as_str())
            .collect()
    }

    /// Add a warning
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Per-request caller information passed down to strategies and engines
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Caller identity used for cohort assignment
    pub caller_id: Option<String>,

    /// Cohort assigned for this request
    pub cohort: Option<Cohort>,

    /// Explicit cancellation signal for in-flight engine calls
    pub cancellation: Option<CancellationToken>,
}

impl CallerContext {
    /// Anonymous context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a known caller
    pub fn for_caller(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: Some(caller_id.into()),
            ..Self::default()
        }
    }

    /// Attach the cohort
    pub fn with_cohort(mut self, cohort: Cohort) -> Self {
        self.cohort = Some(cohort);
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Whether the caller has abandoned the request
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_type_aliases() {
        assert_eq!(SpanType::from("PER"), SpanType::Person);
        assert_eq!(SpanType::from("org"), SpanType::Organization);
        assert_eq!(SpanType::from("Gene"), SpanType::Custom("gene".to_string()));
        assert_eq!(SpanType::from("GENE"), SpanType::from("gene"));
    }

    #[test]
    fn test_span_serializes_type_field() {
        let span = Span::new("Moscow", "loc", 0.9, "natasha");
        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["type"], "location");
        assert!(json.get("source_context").is_none());

        let yaml = "content: Acme\ntype: org\nconfidence: 0.7\nsource_engine: spacy\n";
        let parsed: Span = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.span_type, SpanType::Organization);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Span::new("a", "date", 1.7, "x").confidence, 1.0);
        assert_eq!(Span::new("a", "date", -0.2, "x").confidence, 0.0);
        assert_eq!(Span::new("a", "date", f64::NAN, "x").confidence, 0.0);
    }

    #[test]
    fn test_quality_tier_boundaries() {
        assert_eq!(QualityTier::from_confidence(0.8), QualityTier::High);
        assert_eq!(QualityTier::from_confidence(0.79), QualityTier::Medium);
        assert_eq!(QualityTier::from_confidence(0.6), QualityTier::Medium);
        assert_eq!(QualityTier::from_confidence(0.59), QualityTier::Low);
        assert!(QualityTier::High > QualityTier::Low);
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("Ensemble".parse::<StrategyKind>().unwrap(), StrategyKind::Ensemble);
        assert!("round-robin".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_caller_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = CallerContext::for_caller("user-1").with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(!CallerContext::new().is_cancelled());
    }

    #[test]
    fn test_merged_result_helpers() {
        let mut result = MergedResult::empty(StrategyKind::Parallel);
        assert!(result.is_empty());
        assert_eq!(result.overall_quality(), None);

        result.engines.push(EngineRunSummary::from(&EngineResult::failed(
            "gliner",
            EngineFailure::Timeout { timeout_ms: 50 },
            Duration::from_millis(50),
        )));
        result.spans.push(MergedSpan {
            span: Span::new("Acme", "org", 0.65, "spacy"),
            sources_used: vec!["spacy".to_string()],
            consensus_ratio: 0.5,
            quality_tier: QualityTier::Medium,
        });

        assert_eq!(result.failed_engines(), vec!["gliner"]);
        assert_eq!(result.overall_quality(), Some(QualityTier::Medium));
    }
}
