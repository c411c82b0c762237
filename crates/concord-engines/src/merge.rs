//! Merge-by-dedup used by the single, parallel and sequential strategies

use crate::config::ConfigLayer;
use concord_core::text::{content_prefix, normalize_content, DEDUP_PREFIX_CHARS};
use concord_core::{EngineResult, MergedSpan, QualityTier, Span, SpanType};
use std::collections::HashMap;

struct Entry {
    best: Span,
    sources: Vec<String>,
}

/// Sum of weights of engines that ran without error
pub fn total_weight(results: &[EngineResult], config: &ConfigLayer) -> f64 {
    results
        .iter()
        .filter(|r| !r.is_error())
        .map(|r| config.weight(&r.engine_id))
        .sum()
}

/// Merge spans from several engines, collapsing duplicates.
///
/// Spans below their engine's confidence threshold are dropped. Two spans
/// are duplicates when their type and the first
/// [`DEDUP_PREFIX_CHARS`] normalized characters match; the highest
/// confidence instance is kept and every contributing engine is recorded.
/// Output is sorted by confidence, highest first, ties in discovery order.
pub fn merge_dedup(results: &[EngineResult], config: &ConfigLayer) -> Vec<MergedSpan> {
    let total = total_weight(results, config);

    let mut entries: Vec<Entry> = Vec::new();
    let mut index: HashMap<(String, SpanType), usize> = HashMap::new();

    for result in results.iter().filter(|r| !r.is_error()) {
        let threshold = config.confidence_threshold(&result.engine_id);

        for span in &result.spans {
            if span.confidence < threshold {
                continue;
            }
            let normalized = normalize_content(&span.content);
            if normalized.is_empty() {
                continue;
            }
            let key = (
                content_prefix(&normalized, DEDUP_PREFIX_CHARS).to_string(),
                span.span_type.clone(),
            );

            match index.get(&key) {
                Some(&pos) => {
                    let entry = &mut entries[pos];
                    if span.confidence > entry.best.confidence {
                        entry.best = span.clone();
                    }
                    if !entry.sources.contains(&result.engine_id) {
                        entry.sources.push(result.engine_id.clone());
                    }
                }
                None => {
                    index.insert(key, entries.len());
                    entries.push(Entry {
                        best: span.clone(),
                        sources: vec![result.engine_id.clone()],
                    });
                }
            }
        }
    }

    let mut merged: Vec<MergedSpan> = entries
        .into_iter()
        .map(|entry| {
            let agreeing: f64 = entry.sources.iter().map(|id| config.weight(id)).sum();
            let consensus_ratio = if total > 0.0 { agreeing / total } else { 0.0 };
            let quality_tier = QualityTier::from_confidence(entry.best.confidence);
            MergedSpan {
                span: entry.best,
                sources_used: entry.sources,
                consensus_ratio,
                quality_tier,
            }
        })
        .collect();

    merged.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, GlobalSettings};
    use concord_core::EngineFailure;
    use std::time::Duration;

    fn layer() -> ConfigLayer {
        let mut engines = HashMap::new();
        engines.insert("a".to_string(), EngineConfig::default());
        engines.insert(
            "b".to_string(),
            EngineConfig::default().with_weight(3.0).with_confidence_threshold(0.3),
        );
        ConfigLayer::new(engines, GlobalSettings::default()).unwrap()
    }

    fn ok(engine: &str, spans: Vec<Span>) -> EngineResult {
        EngineResult::success(engine, spans, Duration::from_millis(1))
    }

    #[test]
    fn test_duplicates_keep_highest_confidence() {
        let results = vec![
            ok("a", vec![Span::new("Acme Corp", "org", 0.7, "a")]),
            ok("b", vec![Span::new("acme corp.", "org", 0.9, "b")]),
        ];

        let merged = merge_dedup(&results, &layer());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].span.source_engine, "b");
        assert_eq!(merged[0].sources_used, vec!["a", "b"]);
        assert_eq!(merged[0].consensus_ratio, 1.0);
        assert_eq!(merged[0].quality_tier, QualityTier::High);
    }

    #[test]
    fn test_type_is_part_of_key() {
        let results = vec![ok(
            "a",
            vec![
                Span::new("Jordan", "person", 0.8, "a"),
                Span::new("Jordan", "location", 0.6, "a"),
            ],
        )];

        assert_eq!(merge_dedup(&results, &layer()).len(), 2);
    }

    #[test]
    fn test_low_confidence_filtered_per_engine() {
        let results = vec![
            ok("a", vec![Span::new("x corp", "org", 0.4, "a")]),
            ok("b", vec![Span::new("y corp", "org", 0.4, "b")]),
        ];

        let merged = merge_dedup(&results, &layer());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].span.content, "y corp");
        assert_eq!(merged[0].consensus_ratio, 0.75);
    }

    #[test]
    fn test_filtered_span_is_not_a_source() {
        let results = vec![
            ok(
                "a",
                vec![
                    Span::new("Paris", "loc", 0.45, "a"),
                    Span::new("Rome", "loc", 0.5, "a"),
                ],
            ),
            ok("b", vec![Span::new("Paris", "loc", 0.9, "b")]),
        ];

        let merged = merge_dedup(&results, &layer());

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].span.content, "Paris");
        assert_eq!(merged[0].sources_used, vec!["b".to_string()]);
        assert_eq!(merged[1].span.content, "Rome");
        assert_eq!(merged[1].sources_used, vec!["a".to_string()]);
    }

    #[test]
    fn test_failed_engines_do_not_count() {
        let results = vec![
            ok("a", vec![Span::new("Paris", "loc", 0.9, "a")]),
            EngineResult::failed(
                "b",
                EngineFailure::Execution("boom".into()),
                Duration::from_millis(1),
            ),
        ];

        let merged = merge_dedup(&results, &layer());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].consensus_ratio, 1.0);
    }
}
