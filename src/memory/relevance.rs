//! Lexical relevance scoring for memory retrieval.
//!
//! Retrieval has to bridge phrasings like "my favorite product" and a stored
//! "User's favorite product is Product B" without any semantic index. The
//! score is token-set overlap (Jaccard); on top of that, utterances carrying
//! a preference cue admit every `user_preference` record regardless of score.
//! Injecting an irrelevant preference is cheap, missing the relevant one is a
//! visible failure, so the policy is deliberately recall-generous.

use std::collections::HashSet;

/// Words that carry no matching signal on their own.
///
/// Deliberately excludes possessives and preference words ("my", "favorite"),
/// which are exactly the signal we match on.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "of", "to", "in", "on", "at",
    "for", "and", "or", "with", "about", "me", "it", "this", "that", "do", "does", "can", "you",
    "please", "show", "tell", "give", "get", "what",
];

/// Utterance fragments that signal the user is asking about their own
/// preferences or identity.
const PREFERENCE_CUES: &[&str] = &[
    "my", "favorite", "favourite", "prefer", "preferred", "like", "likes", "best",
];

/// Scoring configuration, derived from `MemorySettings`.
#[derive(Debug, Clone, Copy)]
pub struct RelevanceConfig {
    /// Minimum overlap score for a record to be considered relevant
    pub threshold: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self { threshold: 0.2 }
    }
}

/// Split text into a normalized token set: lowercase, alphanumeric runs only,
/// stopwords and single characters dropped.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over two token sets, in [0, 1].
pub fn overlap_score(query: &HashSet<String>, record: &HashSet<String>) -> f64 {
    if query.is_empty() || record.is_empty() {
        return 0.0;
    }
    let intersection = query.intersection(record).count();
    let union = query.union(record).count();
    intersection as f64 / union as f64
}

/// Does the utterance contain a possessive/preference-indicating cue?
pub fn has_preference_cue(utterance: &str) -> bool {
    let tokens: HashSet<String> = utterance
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    PREFERENCE_CUES.iter().any(|cue| tokens.contains(*cue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("What is the revenue for Product B?");
        assert!(tokens.contains("revenue"));
        assert!(tokens.contains("product"));
        assert!(!tokens.contains("is"));
        assert!(!tokens.contains("the"));
        // "b" is a single character
        assert!(!tokens.contains("b"));
    }

    #[test]
    fn tokenize_keeps_preference_signal() {
        let tokens = tokenize("stats for my favorite product");
        assert!(tokens.contains("my"));
        assert!(tokens.contains("favorite"));
        assert!(tokens.contains("product"));
    }

    #[test]
    fn favorite_product_query_scores_against_stored_preference() {
        let query = tokenize("Show me stats for my favorite product");
        let record = tokenize("User's favorite product is Product B");

        let score = overlap_score(&query, &record);
        assert!(score >= 0.2, "expected relevant score, got {score}");
    }

    #[test]
    fn unrelated_content_scores_low() {
        let query = tokenize("What was total revenue last quarter?");
        let record = tokenize("User's favorite color is green");

        assert!(overlap_score(&query, &record) < 0.2);
    }

    #[test]
    fn empty_sets_score_zero() {
        let empty = HashSet::new();
        let some = tokenize("revenue by region");
        assert_eq!(overlap_score(&empty, &some), 0.0);
        assert_eq!(overlap_score(&some, &empty), 0.0);
    }

    #[test]
    fn preference_cues_detected() {
        assert!(has_preference_cue("show my favorite product"));
        assert!(has_preference_cue("Which region do I like best?"));
        assert!(has_preference_cue("what is my preferred metric"));
        assert!(!has_preference_cue("total revenue by month"));
    }

    #[test]
    fn cue_matches_whole_words_only() {
        // "myth" must not trigger the "my" cue
        assert!(!has_preference_cue("plot the myth dataset"));
    }

    proptest! {
        #[test]
        fn score_is_bounded(a in ".{0,80}", b in ".{0,80}") {
            let score = overlap_score(&tokenize(&a), &tokenize(&b));
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn identical_nonempty_text_scores_one(a in "[a-z]{2,12}( [a-z]{2,12}){1,5}") {
            let tokens = tokenize(&a);
            prop_assume!(!tokens.is_empty());
            prop_assert_eq!(overlap_score(&tokens, &tokens), 1.0);
        }

        #[test]
        fn tokenize_is_case_insensitive(a in "[ -~]{0,80}") {
            prop_assert_eq!(tokenize(&a), tokenize(&a.to_uppercase()));
        }
    }
}
