//! Character-level sequence similarity for symptom narratives.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

/// Ratio used to compare two normalized symptom texts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SymptomMetric {
    /// `2*M/T`, M = longest common subsequence, T = total length
    #[default]
    SequenceRatio,
    /// `1 - distance / max_len`
    Levenshtein,
}

impl SymptomMetric {
    /// Similarity of two already-normalized texts (0.0 - 1.0).
    pub fn ratio(&self, a: &str, b: &str) -> f64 {
        match self {
            SymptomMetric::SequenceRatio => sequence_ratio(a, b),
            SymptomMetric::Levenshtein => normalized_levenshtein(a, b),
        }
    }
}

/// Compute `2*M/T` over characters, where M is the LCS length.
///
/// Two empty strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    // Keep the shorter sequence on the row axis
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];

    for &lc in long {
        for (j, &sc) in short.iter().enumerate() {
            curr[j + 1] = if lc == sc {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings() {
        assert_eq!(sequence_ratio("headache", "headache"), 1.0);
        assert_eq!(SymptomMetric::Levenshtein.ratio("rash", "rash"), 1.0);
    }

    #[test]
    fn test_disjoint_character_sets() {
        assert_eq!(sequence_ratio("abc", "xyz"), 0.0);
        assert_eq!(SymptomMetric::Levenshtein.ratio("abc", "xyzw"), 0.0);
    }

    #[test]
    fn test_known_ratio() {
        // LCS("headache and vertigo" within "severe headache and dizziness")
        // is 14 chars over a total of 49
        let ratio = sequence_ratio("severe headache and dizziness", "headache and vertigo");
        assert!((ratio - 28.0 / 49.0).abs() < 1e-9, "got {}", ratio);
    }

    #[test]
    fn test_symmetric() {
        let a = "nausea after second dose";
        let b = "severe nausea and vomiting";
        assert_eq!(sequence_ratio(a, b), sequence_ratio(b, a));
        assert_eq!(
            SymptomMetric::Levenshtein.ratio(a, b),
            SymptomMetric::Levenshtein.ratio(b, a)
        );
    }

    #[test]
    fn test_decreases_with_edits() {
        let base = "skin rash on arms";
        let one_edit = sequence_ratio(base, "skin rash on legs");
        let more_edits = sequence_ratio(base, "mild itch on legs");
        assert!(one_edit < 1.0);
        assert!(more_edits < one_edit);
    }

    #[test]
    fn test_unicode_counts_chars() {
        assert_eq!(sequence_ratio("naïve", "naïve"), 1.0);
        assert!((sequence_ratio("é", "e") - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_strings() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
    }
}
