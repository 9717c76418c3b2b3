//! Text matching used to compare element labels with intent descriptions and
//! to pick options in selection controls.
//!
//! Rules are evaluated in priority order and the first that applies wins:
//! exact (1.0), substring either way (0.8), value attribute (0.7), fuzzy
//! (0.65 × similarity when similarity clears the threshold), otherwise none.

use serde::{Deserialize, Serialize};

pub const EXACT_SCORE: f64 = 1.0;
pub const PARTIAL_SCORE: f64 = 0.8;
pub const VALUE_MATCH_SCORE: f64 = 0.7;
pub const FUZZY_WEIGHT: f64 = 0.65;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

/// Shorter side of a substring match must be at least this long.
const MIN_PARTIAL_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    Exact,
    Partial,
    ValueMatch,
    Fuzzy,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub kind: MatchKind,
    pub confidence: f64,
}

impl MatchScore {
    pub const NONE: MatchScore = MatchScore {
        kind: MatchKind::None,
        confidence: 0.0,
    };

    pub fn is_match(&self) -> bool {
        self.kind != MatchKind::None
    }
}

/// What a candidate offers for matching: its display text and, separately,
/// a value-style attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchTarget<'a> {
    pub text: &'a str,
    pub value: Option<&'a str>,
}

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalised Damerau-Levenshtein similarity in [0, 1] of two normalised strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_damerau_levenshtein(&normalize_text(a), &normalize_text(b))
}

/// Score display text against a query using the default fuzzy threshold.
pub fn score(candidate_text: &str, query: &str) -> MatchScore {
    score_target(
        MatchTarget {
            text: candidate_text,
            value: None,
        },
        query,
        DEFAULT_FUZZY_THRESHOLD,
    )
}

pub fn score_target(target: MatchTarget<'_>, query: &str, fuzzy_threshold: f64) -> MatchScore {
    let query = normalize_text(query);
    if query.is_empty() {
        return MatchScore::NONE;
    }
    let text = normalize_text(target.text);

    if !text.is_empty() {
        if text == query {
            return MatchScore {
                kind: MatchKind::Exact,
                confidence: EXACT_SCORE,
            };
        }

        let shorter = text.len().min(query.len());
        if shorter >= MIN_PARTIAL_LEN && (text.contains(&query) || query.contains(&text)) {
            return MatchScore {
                kind: MatchKind::Partial,
                confidence: PARTIAL_SCORE,
            };
        }
    }

    if let Some(value) = target.value
        && normalize_text(value) == query
    {
        return MatchScore {
            kind: MatchKind::ValueMatch,
            confidence: VALUE_MATCH_SCORE,
        };
    }

    if !text.is_empty() {
        let sim = strsim::normalized_damerau_levenshtein(&text, &query);
        if sim >= fuzzy_threshold {
            return MatchScore {
                kind: MatchKind::Fuzzy,
                confidence: FUZZY_WEIGHT * sim,
            };
        }
    }

    MatchScore::NONE
}

/// Pick the option that best matches `query`. Ties keep the earliest option.
pub fn best_match<'a, I>(options: I, query: &str, fuzzy_threshold: f64) -> Option<(usize, MatchScore)>
where
    I: IntoIterator<Item = MatchTarget<'a>>,
{
    let mut best: Option<(usize, MatchScore)> = None;
    for (idx, option) in options.into_iter().enumerate() {
        let s = score_target(option, query, fuzzy_threshold);
        if !s.is_match() {
            continue;
        }
        if best.is_none_or(|(_, b)| s.confidence > b.confidence) {
            best = Some((idx, s));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(t: &str) -> MatchTarget<'_> {
        MatchTarget {
            text: t,
            value: None,
        }
    }

    #[test]
    fn test_exact_is_case_and_space_insensitive() {
        let s = score("  Sign   In ", "sign in");
        assert_eq!(s.kind, MatchKind::Exact);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn test_partial_either_direction() {
        assert_eq!(score("Login", "submit login form").kind, MatchKind::Partial);
        assert_eq!(score("Submit the login form", "login").kind, MatchKind::Partial);
        assert_eq!(score("Login", "submit login form").confidence, 0.8);
    }

    #[test]
    fn test_single_letter_is_not_partial() {
        assert_eq!(score("a", "banana").kind, MatchKind::None);
    }

    #[test]
    fn test_value_match() {
        let target = MatchTarget {
            text: "United States",
            value: Some("US"),
        };
        let s = score_target(target, "us", DEFAULT_FUZZY_THRESHOLD);
        assert_eq!(s.kind, MatchKind::ValueMatch);
        assert_eq!(s.confidence, 0.7);
    }

    #[test]
    fn test_fuzzy_tolerates_typos() {
        let s = score("California", "Califronia");
        assert_eq!(s.kind, MatchKind::Fuzzy);
        assert!(similarity("California", "Califronia") >= DEFAULT_FUZZY_THRESHOLD);
        assert!(s.confidence > 0.0 && s.confidence < VALUE_MATCH_SCORE);
    }

    #[test]
    fn test_fuzzy_prefers_closer_option() {
        let options = [text("Colorado"), text("California")];
        let (idx, s) = best_match(options, "Califronia", DEFAULT_FUZZY_THRESHOLD).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(s.kind, MatchKind::Fuzzy);
        assert!(score("Colorado", "Califronia").confidence < s.confidence);
    }

    #[test]
    fn test_unrelated_words_do_not_match() {
        assert_eq!(score("Apple", "Banana"), MatchScore::NONE);
        assert!(best_match([text("Apple")], "Banana", DEFAULT_FUZZY_THRESHOLD).is_none());
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(score("", "login"), MatchScore::NONE);
        assert_eq!(score("Login", "   "), MatchScore::NONE);
    }
}
