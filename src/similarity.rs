//! Similarity model: normalized edit-distance, shared significant tokens and
//! publisher domain. Pure functions, no state.
//!
//! - `similarity(a, b)` is `(L - levenshtein(lower(a), lower(b))) / L` with `L`
//!   the longer length in characters; `1.0` for two empty strings.
//! - `shared_token_ratio` counts distinct lowercase words longer than 3
//!   characters that are not in [`STOP_WORDS`], relative to the smaller set.
//! - `extract_domain` never fails; an unparsable URL yields `""`.

use std::collections::HashSet;

use strsim::{levenshtein, normalized_levenshtein};

/// Words with no topical signal, dropped before token overlap.
pub const STOP_WORDS: [&str; 16] = [
    "with", "from", "that", "this", "have", "will", "after", "about", "says", "their", "more",
    "than", "into", "over", "some", "been",
];

/// Normalized Levenshtein similarity in `[0.0, 1.0]`, case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    let (long, short) = longer_first(&a, &b);
    normalized_levenshtein(long, short)
}

/// Insert/delete/substitute edit distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let (long, short) = longer_first(a, b);
    levenshtein(long, short)
}

// strsim keeps one row sized by its second argument.
fn longer_first<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a.chars().count() >= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Host of `url` without a leading `www.`; empty when the URL does not parse
/// or has no host.
pub fn extract_domain(url: &str) -> String {
    match url::Url::parse(url.trim()) {
        Ok(u) => {
            let host = u.host_str().unwrap_or_default();
            host.strip_prefix("www.").unwrap_or(host).to_string()
        }
        Err(_) => String::new(),
    }
}

/// Significant tokens of a title: lowercase, whitespace split, longer than
/// three characters, stop words removed.
pub fn significant_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// `|A ∩ B| / min(|A|, |B|)` over significant tokens, `0.0` if either is empty.
pub fn shared_token_ratio(title_a: &str, title_b: &str) -> f64 {
    let a = significant_tokens(title_a);
    let b = significant_tokens(title_b);
    let min = a.len().min(b.len());
    if min == 0 {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    shared as f64 / min as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        for s in ["", "a", "Apple unveils new iPhone", "ŽLUŤOUČKÝ kůň"] {
            assert_eq!(similarity(s, s), 1.0, "{s:?}");
        }
    }

    #[test]
    fn empty_against_non_empty_scores_zero() {
        assert_eq!(similarity("", "x"), 0.0);
        assert_eq!(similarity("headline", ""), 0.0);
    }

    #[test]
    fn similarity_is_case_insensitive_and_symmetric() {
        assert_eq!(similarity("OpenAI", "openai"), 1.0);
        let pairs = [
            ("kitten", "sitting"),
            ("Apple unveils new iPhone", "Apple iPhone announcement today"),
            ("abc", ""),
            ("flaw", "lawn"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn edit_distance_counts_characters() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("flaw", "lawn"), 2);
        assert_eq!(edit_distance("ünïcödé", "unicode"), 4);
    }

    #[test]
    fn similarity_value_matches_formula() {
        // kitten/sitting: distance 3, longest 7
        let s = similarity("kitten", "sitting");
        assert!((s - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn extract_domain_strips_www_and_tolerates_garbage() {
        assert_eq!(extract_domain("https://www.theverge.com/2025/1/1/x"), "theverge.com");
        assert_eq!(extract_domain("https://news.ycombinator.com/item?id=1"), "news.ycombinator.com");
        assert_eq!(extract_domain("not a url"), "");
        assert_eq!(extract_domain(""), "");
        assert_eq!(extract_domain("mailto:someone@example.com"), "");
    }

    #[test]
    fn tokens_drop_short_and_stop_words() {
        let t = significant_tokens("Apple says it will ship the new iPhone with USB-C");
        assert!(t.contains("apple"));
        assert!(t.contains("iphone"));
        assert!(t.contains("usb-c"));
        assert!(t.contains("ship"));
        assert!(!t.contains("says"));
        assert!(!t.contains("with"));
        assert!(!t.contains("new"));
        assert!(!t.contains("the"));
    }

    #[test]
    fn shared_token_ratio_uses_smaller_set() {
        let r = shared_token_ratio("Apple unveils new iPhone", "Apple iPhone announcement today");
        // {apple, unveils, iphone} vs {apple, iphone, announcement, today}
        assert!((r - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(shared_token_ratio("a an the", "Apple iPhone"), 0.0);
        assert_eq!(shared_token_ratio("", ""), 0.0);
    }
}
