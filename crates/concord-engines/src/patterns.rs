//! Regex engine for well-formed spans (emails, dates, amounts)

use crate::engine::{context_window, EngineAdapter, EngineError, ExtractionContext};
use async_trait::async_trait;
use concord_core::{Error, Result, Span, SpanType};
use regex::Regex;

/// Bytes of surrounding text kept as span context
const CONTEXT_RADIUS: usize = 40;

/// One pattern and the span it produces
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub span_type: SpanType,
    pub regex: Regex,
    pub confidence: f64,
}

impl PatternRule {
    pub fn new(span_type: impl Into<SpanType>, pattern: &str, confidence: f64) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::config(format!("failed to compile pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            span_type: span_type.into(),
            regex,
            confidence,
        })
    }
}

/// Extracts spans matching a fixed set of regular expressions
pub struct PatternEngine {
    name: String,
    rules: Vec<PatternRule>,
}

impl PatternEngine {
    pub fn new(name: impl Into<String>, rules: Vec<PatternRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Emails, ISO and dotted dates, currency amounts
    pub fn standard(name: impl Into<String>) -> Result<Self> {
        Ok(Self::new(
            name,
            vec![
                PatternRule::new(
                    SpanType::Email,
                    r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                    0.95,
                )?,
                PatternRule::new(SpanType::Date, r"\b\d{4}-\d{2}-\d{2}\b", 0.9)?,
                PatternRule::new(SpanType::Date, r"\b\d{1,2}\.\d{1,2}\.\d{4}\b", 0.85)?,
                PatternRule::new(
                    SpanType::Money,
                    r"[$€£₽]\s?\d{1,3}(?:[,\s]\d{3})*(?:\.\d{2})?",
                    0.85,
                )?,
                PatternRule::new(
                    SpanType::Money,
                    r"\b\d{1,3}(?:[,\s]\d{3})*(?:\.\d{2})?\s?(?:USD|EUR|GBP|RUB|руб\.?)",
                    0.8,
                )?,
            ],
        ))
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }
}

#[async_trait]
impl EngineAdapter for PatternEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        text: &str,
        _ctx: &ExtractionContext<'_>,
    ) -> std::result::Result<Vec<Span>, EngineError> {
        let mut spans = Vec::new();
        let mut covered: Vec<(usize, usize)> = Vec::new();

        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                // Earlier rules win on overlap
                if covered.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                    continue;
                }
                covered.push((m.start(), m.end()));
                spans.push(
                    Span::new(m.as_str().trim(), rule.span_type.clone(), rule.confidence, &self.name)
                        .with_context(context_window(text, m.start(), m.end(), CONTEXT_RADIUS)),
                );
            }
        }

        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::CallerContext;

    #[tokio::test]
    async fn test_standard_patterns() {
        let engine = PatternEngine::standard("patterns").unwrap();
        let caller = CallerContext::new();
        let ctx = ExtractionContext::new(&caller);

        let spans = engine
            .extract(
                "Invoice sent to billing@acme.com on 2024-03-15 for $1,200.50, due 01.04.2024.",
                &ctx,
            )
            .await
            .unwrap();

        let found: Vec<_> = spans
            .iter()
            .map(|s| (s.span_type.as_str(), s.content.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("email", "billing@acme.com"),
                ("date", "2024-03-15"),
                ("date", "01.04.2024"),
                ("money", "$1,200.50"),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_matches() {
        let engine = PatternEngine::standard("patterns").unwrap();
        let caller = CallerContext::new();
        let spans = engine
            .extract("nothing to see here", &ExtractionContext::new(&caller))
            .await
            .unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = PatternRule::new("date", "(unclosed", 0.5).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
