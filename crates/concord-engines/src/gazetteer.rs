//! Dictionary engine backed by Aho-Corasick

use crate::engine::{context_window, EngineAdapter, EngineError, ExtractionContext};
use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use concord_core::text::normalize_content;
use concord_core::{Error, Result, Span, SpanType};
use std::collections::{HashMap, HashSet};

/// Bytes of surrounding text kept as span context
const CONTEXT_RADIUS: usize = 40;

fn default_confidence() -> f64 {
    0.75
}

/// Finds known terms (names, places, organizations) by exact lookup.
///
/// Matching is ASCII case-insensitive, leftmost-longest, and only whole
/// words are reported.
pub struct GazetteerEngine {
    name: String,
    matcher: AhoCorasick,
    types: Vec<SpanType>,
    confidence: f64,
}

impl GazetteerEngine {
    /// Build from `(term, type)` pairs
    pub fn new<T>(name: impl Into<String>, entries: Vec<(String, T)>, confidence: f64) -> Result<Self>
    where
        T: Into<SpanType>,
    {
        let (terms, types): (Vec<String>, Vec<SpanType>) = entries
            .into_iter()
            .map(|(term, span_type)| (term, span_type.into()))
            .unzip();

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&terms)
            .map_err(|e| Error::config(format!("failed to build gazetteer: {}", e)))?;

        Ok(Self {
            name: name.into(),
            matcher,
            types,
            confidence,
        })
    }

    /// Build from an engine's `custom_settings`.
    ///
    /// Expects `entries` mapping a span type to a list of terms, and an
    /// optional `confidence`:
    ///
    /// ```yaml
    /// custom_settings:
    ///   confidence: 0.8
    ///   entries:
    ///     organization: [Acme Corp, Globex]
    ///     location: [Moscow, Berlin]
    /// ```
    pub fn from_settings(
        name: impl Into<String>,
        settings: &HashMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let confidence = settings
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or_else(default_confidence);

        let entries: HashMap<String, Vec<String>> = match settings.get("entries") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::config(format!("invalid gazetteer entries: {}", e)))?,
            None => return Err(Error::config("gazetteer requires 'entries'")),
        };

        let mut pairs: Vec<(String, String)> = entries
            .into_iter()
            .flat_map(|(span_type, terms)| terms.into_iter().map(move |t| (t, span_type.clone())))
            .collect();
        // HashMap order is random; keep pattern ids stable
        pairs.sort();

        Self::new(name, pairs, confidence)
    }

    /// Number of known terms
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

#[async_trait]
impl EngineAdapter for GazetteerEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> std::result::Result<(), EngineError> {
        if self.is_empty() {
            return Err(EngineError::Init("gazetteer has no terms".into()));
        }
        Ok(())
    }

    async fn extract(
        &self,
        text: &str,
        ctx: &ExtractionContext<'_>,
    ) -> std::result::Result<Vec<Span>, EngineError> {
        let mut seen = HashSet::new();
        let mut spans = Vec::new();

        for m in self.matcher.find_iter(text) {
            if !is_word_boundary(text, m.start(), m.end()) {
                continue;
            }
            let content = &text[m.start()..m.end()];
            let normalized = normalize_content(content);
            if ctx.already_found(&normalized) {
                continue;
            }
            let span_type = &self.types[m.pattern().as_usize()];
            if !seen.insert((normalized, span_type.clone())) {
                continue;
            }
            spans.push(
                Span::new(content, span_type.clone(), self.confidence, &self.name)
                    .with_context(context_window(text, m.start(), m.end(), CONTEXT_RADIUS)),
            );
        }

        Ok(spans)
    }
}
