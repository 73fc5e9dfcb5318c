//! Response scoring.
//!
//! Both granularities of feedback share one primitive, [`edit_distance`]:
//!
//! ```text
//! score(candidate, expected)   char-level over the whole utterance → 0..=100
//! align(candidate, expected)   word-level diff, each replaced pair graded
//!                              with similarity_ratio(word, word) → 0.0..=1.0
//! ```

pub mod align;

pub use align::{align, AlignThresholds, AlignedWord, Alignment, WordTag};

use strsim::{levenshtein, normalized_levenshtein};

/// Levenshtein distance (insert / delete / substitute, unit cost) over
/// Unicode scalar values.
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(a, b)
}

/// Normalized similarity in `[0.0, 1.0]`: `1 - distance / max(len_a, len_b)`.
///
/// Two empty strings have nothing in common and yield `0.0`.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b).clamp(0.0, 1.0)
}

/// Percentage score of `candidate` against `expected`.
///
/// Both strings are trimmed and lowercased before comparison. Returns `None`
/// when either side is empty: callers must treat that as "no score, no
/// progression".
pub fn score(candidate: &str, expected: &str) -> Option<u8> {
    let candidate = normalize(candidate);
    let expected = normalize(expected);
    if candidate.is_empty() || expected.is_empty() {
        return None;
    }
    let pct = (similarity_ratio(&candidate, &expected) * 100.0).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
