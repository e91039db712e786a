//! Interchangeable fuzzy similarity backends, scored on a 0..=100 scale.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Similarity between two already-normalized keys, from 0.0 to 100.0.
pub trait SimilarityScorer {
    fn score(&self, a: &str, b: &str) -> f64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScorerKind {
    /// Order-insensitive token overlap
    #[default]
    TokenSet,
    /// Character-level edit similarity
    Sequence,
}

impl ScorerKind {
    pub fn scorer(self) -> Box<dyn SimilarityScorer> {
        match self {
            ScorerKind::TokenSet => Box::new(TokenSetScorer),
            ScorerKind::Sequence => Box::new(SequenceScorer),
        }
    }
}

impl std::fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScorerKind::TokenSet => write!(f, "token-set"),
            ScorerKind::Sequence => write!(f, "sequence"),
        }
    }
}

// =============================================================================
// Token set ratio
// =============================================================================

/// Token set ratio: compares the shared tokens of both strings against each
/// side's leftovers, ignoring order and repetition. A string whose tokens are
/// a subset of the other's scores 100.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenSetScorer;

impl SimilarityScorer for TokenSetScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        token_set_ratio(a, b)
    }
}

pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = intersection.join(" ");
    let join_with_sect = |rest: &[&str]| {
        let rest = rest.join(" ");
        if sect.is_empty() {
            rest
        } else {
            format!("{} {}", sect, rest)
        }
    };
    let sect_a = join_with_sect(&only_a);
    let sect_b = join_with_sect(&only_b);

    let mut best = indel_ratio(&sect_a, &sect_b);
    if !sect.is_empty() {
        best = best
            .max(indel_ratio(&sect, &sect_a))
            .max(indel_ratio(&sect, &sect_b));
    }
    best
}

/// Normalized indel similarity: `2 * lcs / (len_a + len_b)`, scaled to 100.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }

    let lcs = longest_common_subsequence(&a, &b);
    200.0 * lcs as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

// =============================================================================
// Sequence similarity
// =============================================================================

/// Whole-string normalized Levenshtein similarity. Coarser than
/// [`TokenSetScorer`]: word order and extra tokens both cost points.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceScorer;

impl SimilarityScorer for SequenceScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_indel_ratio() {
        assert!(close(indel_ratio("abc", "abc"), 100.0));
        assert!(close(indel_ratio("abc", "xyz"), 0.0));
        // lcs("abcd", "abed") = 3 -> 6 / 8
        assert!(close(indel_ratio("abcd", "abed"), 75.0));
        assert!(close(indel_ratio("", ""), 100.0));
    }

    #[test]
    fn test_token_set_ignores_order_and_repetition() {
        assert!(close(token_set_ratio("brown fox quick", "quick brown fox"), 100.0));
        assert!(close(token_set_ratio("fox fox fox", "fox"), 100.0));
    }

    #[test]
    fn test_token_set_subset_scores_full() {
        assert!(close(
            token_set_ratio("the band - song one", "the band - song one live"),
            100.0
        ));
    }

    #[test]
    fn test_token_set_empty_is_zero() {
        assert!(close(token_set_ratio("", "anything"), 0.0));
        assert!(close(token_set_ratio("   ", ""), 0.0));
    }

    #[test]
    fn test_token_set_partial_overlap() {
        // sect = "a", sect_a = "a b", sect_b = "a c"
        // ratio(sect, sect_a) = 50, ratio(sect_a, sect_b) = 2 * 2 / 6 = 66.67
        let score = token_set_ratio("a b", "a c");
        assert!(close(score, 66.666), "score was {}", score);
    }

    #[test]
    fn test_token_set_disjoint() {
        let score = token_set_ratio("alpha", "omega");
        assert!(close(score, indel_ratio("alpha", "omega")));
        assert!(score < 92.0);
    }

    #[test]
    fn test_sequence_scorer() {
        assert!(close(SequenceScorer.score("kitten", "kitten"), 100.0));
        assert!(SequenceScorer.score("brown fox", "fox brown") < 100.0);
        assert!(close(SequenceScorer.score("abcd", "abce"), 75.0));
    }

    #[test]
    fn test_scorer_kind_selects_backend() {
        let token_set = ScorerKind::TokenSet.scorer();
        let sequence = ScorerKind::Sequence.scorer();
        assert!(close(token_set.score("b a", "a b"), 100.0));
        assert!(sequence.score("b a", "a b") < 100.0);
        assert_eq!(ScorerKind::default(), ScorerKind::TokenSet);
        assert_eq!(ScorerKind::Sequence.to_string(), "sequence");
    }
}
