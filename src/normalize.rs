//! Canonicalization of free-text artist/title strings into comparable keys.
//!
//! Both the local index and the playlist queries go through [`normalize_text`]
//! so that tagging differences ("(Remastered 2011)", "feat. Someone",
//! combining accents, casing) collapse to the same token sequence.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Non-greedy `(...)` / `[...]` spans. Mixed pairs like `(...]` are removed too.
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[].*?[\)\]]").expect("bracket pattern is valid"));

/// Whole-word "feat"/"ft"/"featuring" through the end of the string.
static FEATURING_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(feat|ft|featuring)\b.*$").expect("featuring pattern is valid")
});

/// Everything outside ASCII digits, ASCII lowercase and the Cyrillic block.
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9a-z\x{0400}-\x{04FF}]+").expect("charset pattern is valid")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Case-fold a string.
///
/// `str::to_lowercase` covers simple folding for every script we keep; the
/// only full folding that changes the surviving ASCII output is sharp s.
fn case_fold(s: &str) -> String {
    s.to_lowercase().replace('ß', "ss")
}

/// Normalize a free-text string into a comparable token sequence.
///
/// Steps (order matters):
/// 1. NFKD decomposition
/// 2. case folding
/// 3. drop bracketed spans
/// 4. drop a trailing "feat"/"ft"/"featuring" segment
/// 5. replace disallowed characters with a space
/// 6. collapse whitespace and trim
pub fn normalize_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    let decomposed: String = s.nfkd().collect();
    let folded = case_fold(&decomposed);
    let without_brackets = BRACKETED.replace_all(&folded, " ");
    let without_featuring = FEATURING_SUFFIX.replace(&without_brackets, " ");
    let allowed = DISALLOWED.replace_all(&without_featuring, " ");

    WHITESPACE.replace_all(&allowed, " ").trim().to_string()
}

/// Build the lookup key for an (artist, title) pair.
///
/// Returns `"{artist} - {title}"` when both normalize to something, the
/// non-empty one when only one does, and an empty string otherwise. An empty
/// key means the pair cannot be looked up.
pub fn make_key(artist: &str, title: &str) -> String {
    let artist = normalize_text(artist);
    let title = normalize_text(title);

    match (artist.is_empty(), title.is_empty()) {
        (false, false) => format!("{} - {}", artist, title),
        (true, false) => title,
        (false, true) => artist,
        (true, true) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_text("Hello,   World!"), "hello world");
        assert_eq!(normalize_text("  Spaced   Out  "), "spaced out");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("!!!"), "");
    }

    #[test]
    fn test_normalize_strips_combining_marks() {
        assert_eq!(normalize_text("Beyoncé"), "beyonce");
        assert_eq!(normalize_text("Beyoncé"), normalize_text("BEYONCE"));
        // A mid-word mark becomes a separator rather than vanishing.
        assert_eq!(normalize_text("Sigur Rós"), "sigur ro s");
    }

    #[test]
    fn test_normalize_case_folds_cyrillic() {
        assert_eq!(normalize_text("КИНО"), "кино");
        assert_eq!(normalize_text("Группа Крови"), "группа крови");
    }

    #[test]
    fn test_normalize_sharp_s() {
        assert_eq!(normalize_text("Straße"), "strasse");
    }

    #[test]
    fn test_normalize_full_width() {
        assert_eq!(normalize_text("Ｆｕｌｌ　Ｗｉｄｔｈ"), "full width");
    }

    #[test]
    fn test_normalize_removes_brackets() {
        assert_eq!(
            normalize_text("Track Name (Remastered 2011)"),
            normalize_text("Track Name")
        );
        assert_eq!(normalize_text("Song [Live] (Mono)"), "song");
        assert_eq!(normalize_text("A (x) B [y] C"), "a b c");
    }

    #[test]
    fn test_normalize_removes_featuring_suffix() {
        assert_eq!(normalize_text("Song feat. Artist2"), normalize_text("Song"));
        assert_eq!(normalize_text("Song ft. Someone"), "song");
        assert_eq!(normalize_text("Song Featuring Someone Else"), "song");
    }

    #[test]
    fn test_normalize_featuring_needs_word_boundary() {
        assert_eq!(normalize_text("Defeat"), "defeat");
        assert_eq!(normalize_text("Left Behind"), "left behind");
        assert_eq!(normalize_text("Soft Rain"), "soft rain");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "Song One (Live)",
            "Beyoncé feat. JAY-Z",
            "Кино - Группа Крови [2012 Remaster]",
            "  weird ___ spacing -- here ",
            "Ｆｕｌｌ　Ｗｉｄｔｈ",
            "",
        ];
        for input in inputs {
            let once = normalize_text(input);
            assert_eq!(normalize_text(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_make_key() {
        assert_eq!(make_key("The Band", "Song One"), "the band - song one");
        assert_eq!(make_key("", "Title"), normalize_text("Title"));
        assert_eq!(make_key("Artist", ""), normalize_text("Artist"));
        assert_eq!(make_key("", ""), "");
        assert_eq!(make_key("(live)", "[bonus]"), "");
    }
}
