//! Adaptive strategy selection from input characteristics

use crate::config::AdaptiveThresholds;
use concord_core::StrategyKind;

/// Words per sentence at which the sentence-length signal saturates
const LONG_SENTENCE_WORDS: f64 = 40.0;

/// Measured characteristics of an input text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextProfile {
    /// Length in chars
    pub length: usize,

    /// Structural complexity in [0, 1]
    pub complexity: f64,
}

impl TextProfile {
    pub fn of(text: &str) -> Self {
        Self {
            length: text.chars().count(),
            complexity: structural_complexity(text),
        }
    }
}

/// Picks a strategy from text length and complexity
#[derive(Debug, Clone, Default)]
pub struct AdaptiveSelector {
    thresholds: AdaptiveThresholds,
}

impl AdaptiveSelector {
    pub fn new(thresholds: AdaptiveThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AdaptiveThresholds {
        &self.thresholds
    }

    /// Strategy for a text of `length` chars and the given complexity.
    ///
    /// Short texts always go to a single engine. Long or highly structured
    /// texts go to the ensemble; moderately structured ones run
    /// sequentially so later engines can build on earlier spans; the rest
    /// fan out in parallel. Never returns [`StrategyKind::Adaptive`].
    pub fn select(&self, length: usize, complexity: f64) -> StrategyKind {
        let t = &self.thresholds;
        if length < t.short_text_max {
            StrategyKind::Single
        } else if length > t.long_text_min || complexity >= t.high_complexity {
            StrategyKind::Ensemble
        } else if complexity >= t.moderate_complexity {
            StrategyKind::Sequential
        } else {
            StrategyKind::Parallel
        }
    }

    /// Profile a text and select for it
    pub fn select_for(&self, text: &str) -> (StrategyKind, TextProfile) {
        let profile = TextProfile::of(text);
        (self.select(profile.length, profile.complexity), profile)
    }
}

/// Heuristic structural complexity in [0, 1].
///
/// Blends four signals: share of structured lines (list items, headings,
/// table rows), average sentence length, symbol/digit density and density
/// of capitalized tokens (names, acronyms).
pub fn structural_complexity(text: &str) -> f64 {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return 0.0;
    }

    let structured = lines.iter().filter(|l| is_structured_line(l)).count();
    let structure_ratio = structured as f64 / lines.len() as f64;

    let words: Vec<&str> = text.split_whitespace().collect();
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let sentence_length = (words.len() as f64 / sentences as f64 / LONG_SENTENCE_WORDS).min(1.0);

    let chars = text.chars().filter(|c| !c.is_whitespace()).count().max(1);
    let symbols = text
        .chars()
        .filter(|c| c.is_ascii_digit() || is_symbol(*c))
        .count();
    let symbol_density = (symbols as f64 / chars as f64 * 5.0).min(1.0);

    let capitalized = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .count();
    let capital_density = (capitalized as f64 / words.len().max(1) as f64 * 2.0).min(1.0);

    let score = 0.35 * structure_ratio
        + 0.25 * sentence_length
        + 0.2 * symbol_density
        + 0.2 * capital_density;
    score.clamp(0.0, 1.0)
}

fn is_structured_line(line: &str) -> bool {
    if line.starts_with(['-', '*', '•', '#', '>']) || line.contains('|') || line.contains('\t') {
        return true;
    }
    // Numbered list item: "1." or "12)"
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
}

fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace() && !".,;:!?'\"-()".contains(c)
}
