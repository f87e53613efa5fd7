//! Character-based similarity: case-folded token-sort ratio.
//!
//! Catches typos, case, spacing and word-order differences
//! (`"york new"` vs `"New York"`). Pure local computation.

use rapidfuzz::distance::indel;

use super::matrix::SimilarityMatrix;

/// Compute the character similarity matrix for `values`.
pub fn character_similarity(values: &[String]) -> SimilarityMatrix {
    // Sort tokens once per value instead of once per pair.
    let prepared: Vec<Vec<char>> = values.iter().map(|v| sorted_tokens(v)).collect();
    SimilarityMatrix::from_pairs(values.len(), |i, j| {
        indel_ratio(&prepared[i], &prepared[j]) / 100.0
    })
}

/// Token-sort ratio in `[0, 100]`.
///
/// Both strings are lowercased, split on whitespace, tokens sorted and
/// rejoined with single spaces, then compared by normalized Indel
/// similarity: `200 * LCS / (|a| + |b|)`.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    indel_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Two empty inputs are identical (100).
fn indel_ratio(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    100.0 * indel::normalized_similarity(a.iter().copied(), b.iter().copied())
}

fn sorted_tokens(value: &str) -> Vec<char> {
    let lowered = value.to_lowercase();
    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ").chars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        assert_eq!(token_sort_ratio("Boston", "BOSTON"), 100.0);
    }

    #[test]
    fn test_word_order_insensitive() {
        assert_eq!(token_sort_ratio("New York", "york  new"), 100.0);
    }

    #[test]
    fn test_known_ratio() {
        // LCS("kitten", "sitting") = 4 ("ittn"), 200 * 4 / 13
        let expected = 800.0 / 13.0;
        assert!((token_sort_ratio("kitten", "sitting") - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(token_sort_ratio("", ""), 100.0);
        assert_eq!(token_sort_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_unicode_scalar_values() {
        assert_eq!(token_sort_ratio("Zürich", "zürich"), 100.0);
        assert!(token_sort_ratio("Zürich", "Zurich") > 80.0);
    }

    #[test]
    fn test_transposed_letters() {
        // LCS("boston", "bsoton") = 5, 200 * 5 / 12
        let expected = 1000.0 / 12.0;
        assert!((token_sort_ratio("Boston", "Bsoton") - expected).abs() < 1e-9);
    }

    #[test]
    fn test_matrix() {
        let values: Vec<String> = ["Boston", "boston", "Chicago"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let m = character_similarity(&values);
        assert_eq!(m.get(0, 1), 1.0);
        assert!(m.get(0, 2) < 0.5);
        assert_eq!(m.get(2, 2), 1.0);
    }
}
