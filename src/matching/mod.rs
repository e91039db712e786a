//! Resolution of a query key against the local index: exact lookup first,
//! then the best fuzzy candidate above a score threshold.

pub mod scorer;

use crate::library::{LibraryEntry, LocalIndex};
use scorer::SimilarityScorer;

pub const DEFAULT_MIN_SCORE: u8 = 92;

/// Outcome of resolving one playlist track.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<'a> {
    Matched {
        entries: &'a [LibraryEntry],
        key: &'a str,
        exact: bool,
        /// 100 for exact matches
        score: f64,
    },
    Missing,
}

/// Pick the highest scoring candidate. Ties keep the first candidate seen.
/// An empty candidate list returns `None` without scoring anything.
pub fn best_candidate<'c>(
    query: &str,
    candidates: &'c [String],
    scorer: &dyn SimilarityScorer,
) -> Option<(&'c str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = scorer.score(query, candidate);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((candidate.as_str(), score)),
        }
    }
    best
}

pub struct Matcher<'a> {
    index: &'a LocalIndex,
    scorer: &'a dyn SimilarityScorer,
    min_score: u8,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a LocalIndex, scorer: &'a dyn SimilarityScorer, min_score: u8) -> Self {
        Self {
            index,
            scorer,
            min_score,
        }
    }

    /// Resolve `query_key` against every key of the index.
    pub fn resolve(&self, query_key: &str) -> MatchResult<'a> {
        self.resolve_among(query_key, self.index.keys())
    }

    /// Resolve `query_key`, restricting the fuzzy search to `candidates`.
    ///
    /// An exact key hit returns without scoring. Otherwise the best candidate
    /// is accepted when its score is at least `min_score`.
    pub fn resolve_among(&self, query_key: &str, candidates: &'a [String]) -> MatchResult<'a> {
        if let Some((key, entries)) = self.index.get_key_value(query_key) {
            return MatchResult::Matched {
                entries,
                key,
                exact: true,
                score: 100.0,
            };
        }

        let Some((key, score)) = best_candidate(query_key, candidates, self.scorer) else {
            return MatchResult::Missing;
        };

        if score < f64::from(self.min_score) {
            tracing::debug!(
                query_key,
                best = key,
                score,
                min_score = self.min_score,
                "Best candidate below threshold"
            );
            return MatchResult::Missing;
        }

        match self.index.get(key) {
            Some(entries) => MatchResult::Matched {
                entries,
                key,
                exact: false,
                score,
            },
            None => MatchResult::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::scorer::TokenSetScorer;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(path: &str) -> LibraryEntry {
        LibraryEntry {
            path: PathBuf::from(path),
            extension: "mp3".into(),
            title: String::new(),
            artist: String::new(),
            album: String::new(),
        }
    }

    fn index_of(keys: &[(&str, &str)]) -> LocalIndex {
        keys.iter()
            .map(|(key, path)| (key.to_string(), entry(path)))
            .collect()
    }

    /// Counts calls and delegates to the token set scorer.
    #[derive(Default)]
    struct CountingScorer {
        calls: AtomicUsize,
    }

    impl SimilarityScorer for CountingScorer {
        fn score(&self, a: &str, b: &str) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            TokenSetScorer.score(a, b)
        }
    }

    /// Returns canned scores per candidate.
    struct FixedScorer(HashMap<&'static str, f64>);

    impl SimilarityScorer for FixedScorer {
        fn score(&self, _query: &str, candidate: &str) -> f64 {
            self.0.get(candidate).copied().unwrap_or(0.0)
        }
    }

    #[test]
    fn test_exact_match_skips_scoring() {
        let index = index_of(&[("the band - song one", "a.mp3"), ("other - x", "b.mp3")]);
        let scorer = CountingScorer::default();
        let matcher = Matcher::new(&index, &scorer, DEFAULT_MIN_SCORE);

        let result = matcher.resolve("the band - song one");

        match result {
            MatchResult::Matched { entries, exact, key, .. } => {
                assert!(exact);
                assert_eq!(key, "the band - song one");
                assert_eq!(entries[0].path, PathBuf::from("a.mp3"));
            }
            MatchResult::Missing => panic!("expected a match"),
        }
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let index = index_of(&[("the band - song one live", "a.mp3")]);
        let scorer = CountingScorer::default();
        let matcher = Matcher::new(&index, &scorer, DEFAULT_MIN_SCORE);

        let result = matcher.resolve("the band - song one");

        assert!(matches!(result, MatchResult::Matched { exact: false, .. }));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let index = index_of(&[("candidate", "a.mp3")]);
        let scorer = FixedScorer(HashMap::from([("candidate", 80.0)]));

        let at = Matcher::new(&index, &scorer, 80).resolve("query");
        assert!(matches!(at, MatchResult::Matched { score, .. } if score == 80.0));

        let above = Matcher::new(&index, &scorer, 81).resolve("query");
        assert_eq!(above, MatchResult::Missing);
    }

    #[test]
    fn test_empty_candidates_never_scores() {
        let index = LocalIndex::default();
        let scorer = CountingScorer::default();
        let matcher = Matcher::new(&index, &scorer, 0);

        assert_eq!(matcher.resolve("anything"), MatchResult::Missing);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_picks_highest_score_and_first_on_tie() {
        let index = index_of(&[("first", "1.mp3"), ("second", "2.mp3"), ("third", "3.mp3")]);
        let scorer = FixedScorer(HashMap::from([
            ("first", 90.0),
            ("second", 95.0),
            ("third", 95.0),
        ]));

        let result = Matcher::new(&index, &scorer, 50).resolve("query");

        assert!(matches!(result, MatchResult::Matched { key: "second", .. }));
    }

    #[test]
    fn test_missing_when_nothing_is_close() {
        let index = index_of(&[("metallica - one", "m.mp3")]);
        let result = Matcher::new(&index, &TokenSetScorer, DEFAULT_MIN_SCORE)
            .resolve("abba - waterloo");
        assert!(matches!(result, MatchResult::Missing));
    }

    #[test]
    fn test_resolve_among_restricts_fuzzy_candidates() {
        let index = index_of(&[("alpha beta", "a.mp3"), ("gamma", "g.mp3")]);
        let candidates = vec!["gamma".to_string()];
        let matcher = Matcher::new(&index, &TokenSetScorer, 90);

        assert_eq!(matcher.resolve_among("alpha", &candidates), MatchResult::Missing);
        assert!(matches!(
            matcher.resolve("alpha"),
            MatchResult::Matched { .. }
        ));
    }
}
