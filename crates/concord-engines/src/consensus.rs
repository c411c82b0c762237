//! Weighted consensus voting across engine results
//!
//! Spans from different engines that describe the same observation are
//! grouped, each group is scored by the weight of the engines agreeing on
//! it, and groups without enough agreement are discarded. The voter runs
//! single-threaded over results that have already been collected.

use crate::config::{ConfigLayer, GlobalSettings};
use concord_core::text::{normalize_content, similarity};
use concord_core::{EngineResult, MergedSpan, QualityTier, Span, SpanType};
use std::collections::HashMap;
use tracing::debug;

/// Tolerance for the inclusive threshold comparison
const RATIO_EPSILON: f64 = 1e-9;

/// Voting parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusConfig {
    /// Minimum consensus ratio for a group to be kept (inclusive)
    pub consensus_threshold: f64,

    /// Minimum normalized Levenshtein similarity for grouping
    pub similarity_cutoff: f64,

    /// Boost factor; full agreement multiplies confidence by `1 + boost`
    pub agreement_boost: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self::from(&GlobalSettings::default())
    }
}

impl From<&GlobalSettings> for ConsensusConfig {
    fn from(settings: &GlobalSettings) -> Self {
        Self {
            consensus_threshold: settings.consensus_threshold,
            similarity_cutoff: settings.similarity_cutoff,
            agreement_boost: settings.agreement_boost,
        }
    }
}

/// One engine's contribution to a group
struct Vote<'a> {
    engine_id: &'a str,
    best: &'a Span,
}

/// Spans judged to be the same observation
struct Group<'a> {
    span_type: &'a SpanType,
    key: String,
    votes: Vec<Vote<'a>>,
}

impl<'a> Group<'a> {
    fn add(&mut self, engine_id: &'a str, span: &'a Span) {
        match self.votes.iter_mut().find(|v| v.engine_id == engine_id) {
            Some(vote) => {
                if span.confidence > vote.best.confidence {
                    vote.best = span;
                }
            }
            None => self.votes.push(Vote {
                engine_id,
                best: span,
            }),
        }
    }

    /// Highest-confidence span, earliest on ties
    fn representative(&self) -> &'a Span {
        let mut best = self.votes[0].best;
        for vote in &self.votes[1..] {
            if vote.best.confidence > best.confidence {
                best = vote.best;
            }
        }
        best
    }
}

/// Weighted consensus voter
#[derive(Debug, Clone, Default)]
pub struct ConsensusVoter {
    config: ConsensusConfig,
}

impl ConsensusVoter {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self::new(ConsensusConfig::from(settings))
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Reconcile per-engine results into one ranked list.
    ///
    /// Engines are visited in ascending id order so that identical inputs
    /// always produce identical output. Engines missing from `engines`
    /// weigh 1.0.
    pub fn vote(
        &self,
        results: &HashMap<String, EngineResult>,
        engines: &ConfigLayer,
    ) -> Vec<MergedSpan> {
        let mut ids: Vec<&String> = results.keys().collect();
        ids.sort();

        let total_weight: f64 = ids
            .iter()
            .filter(|id| !results[id.as_str()].is_error())
            .map(|id| engines.weight(id))
            .sum();

        let groups = self.group(&ids, results);
        let discovered = groups.len();

        let mut merged = Vec::with_capacity(discovered);
        for group in groups {
            if let Some(span) = self.score(&group, total_weight, engines) {
                merged.push(span);
            }
        }

        merged.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

        debug!(
            groups = discovered,
            retained = merged.len(),
            total_weight,
            "Consensus vote complete"
        );
        merged
    }

    fn group<'a>(
        &self,
        ids: &[&'a String],
        results: &'a HashMap<String, EngineResult>,
    ) -> Vec<Group<'a>> {
        let mut groups: Vec<Group<'a>> = Vec::new();

        for &id in ids {
            let result = &results[id.as_str()];
            if result.is_error() {
                continue;
            }
            for span in &result.spans {
                let normalized = normalize_content(&span.content);
                if normalized.is_empty() {
                    continue;
                }
                let existing = groups.iter_mut().find(|g| {
                    *g.span_type == span.span_type
                        && similarity(&g.key, &normalized) >= self.config.similarity_cutoff
                });
                match existing {
                    Some(group) => group.add(id.as_str(), span),
                    None => {
                        let mut group = Group {
                            span_type: &span.span_type,
                            key: normalized,
                            votes: Vec::new(),
                        };
                        group.add(id.as_str(), span);
                        groups.push(group);
                    }
                }
            }
        }

        groups
    }

    fn score(&self, group: &Group<'_>, total_weight: f64, engines: &ConfigLayer) -> Option<MergedSpan> {
        let group_weight: f64 = group.votes.iter().map(|v| engines.weight(v.engine_id)).sum();
        let weighted_score: f64 = group
            .votes
            .iter()
            .map(|v| engines.weight(v.engine_id) * v.best.confidence)
            .sum();

        let consensus_ratio = if total_weight > 0.0 {
            group_weight / total_weight
        } else {
            0.0
        };

        let representative = group.representative();
        let single_source = group.votes.len() == 1;

        let meets_threshold = consensus_ratio + RATIO_EPSILON >= self.config.consensus_threshold;
        let trusted_single = single_source
            && representative.confidence > engines.confidence_threshold(group.votes[0].engine_id);

        if !meets_threshold && !trusted_single {
            debug!(
                content = %representative.content,
                consensus_ratio,
                "Dropping low-consensus group"
            );
            return None;
        }

        let base = if group_weight > 0.0 {
            weighted_score / group_weight
        } else {
            representative.confidence
        };

        let confidence = if single_source {
            base
        } else {
            (base * (1.0 + self.config.agreement_boost * consensus_ratio)).min(1.0)
        };

        let mut span = representative.clone();
        span.confidence = confidence;

        Some(MergedSpan {
            span,
            sources_used: group.votes.iter().map(|v| v.engine_id.to_string()).collect(),
            consensus_ratio,
            quality_tier: QualityTier::from_confidence(confidence),
        })
    }
}
