//! Text normalization and similarity helpers shared by merging and voting

/// Number of normalized characters used as the dedup key prefix
pub const DEDUP_PREFIX_CHARS: usize = 48;

/// Normalize span content for comparison.
///
/// Lower-cases, collapses runs of whitespace to a single space and trims
/// punctuation from both ends ("Acme, Inc." and "acme inc" differ only in
/// the inner comma).
pub fn normalize_content(content: &str) -> String {
    let trimmed = content.trim_matches(|c: char| !c.is_alphanumeric());

    let mut normalized = String::with_capacity(trimmed.len());
    let mut pending_space = false;
    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !normalized.is_empty() {
            normalized.push(' ');
        }
        pending_space = false;
        normalized.extend(ch.to_lowercase());
    }
    normalized
}

/// First `max_chars` characters of already-normalized content
pub fn content_prefix(normalized: &str, max_chars: usize) -> &str {
    match normalized.char_indices().nth(max_chars) {
        Some((idx, _)) => &normalized[..idx],
        None => normalized,
    }
}

/// Character-level Levenshtein distance
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized Levenshtein similarity in [0, 1].
///
/// Symmetric and deterministic. Callers pass normalized content; two empty
/// strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  Acme   Corp. "), "acme corp");
        assert_eq!(normalize_content("\"New\tYork\""), "new york");
        assert_eq!(normalize_content("..."), "");
        assert_eq!(normalize_content("МОСКВА"), "москва");
    }

    #[test]
    fn test_content_prefix_respects_char_boundaries() {
        assert_eq!(content_prefix("москва", 3), "мос");
        assert_eq!(content_prefix("abc", 10), "abc");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let ab = similarity("john smith", "jon smith");
        let ba = similarity("jon smith", "john smith");
        assert_eq!(ab, ba);
        assert!(ab > 0.85);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }
}
