//! Content-word similarity used by the repetition check and the feedback-loop detector.

use std::collections::BTreeSet;

/// Function words ignored when comparing replies.
const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "am", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her", "here",
    "him", "his", "how", "i", "i'd", "i'll", "i'm", "i've", "if", "in", "into", "is", "it", "it's",
    "its", "just", "let", "let's", "me", "more", "my", "no", "not", "of", "on", "or", "our", "so",
    "some", "that", "that's", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "to", "too", "up", "us", "very", "was", "we", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "you're", "you've", "your",
];

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercased tokens with stop words and one-letter fragments removed.
pub fn content_words(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard index of two word sets; 0.0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Similarity of two texts over content words. Identical texts always score 1.0,
/// even when they consist only of stop words.
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    if !na.is_empty() && na == normalize(b) {
        return 1.0;
    }
    jaccard(&content_words(a), &content_words(b))
}

/// Highest similarity between `text` and any of `others`.
pub fn max_similarity<'a, I>(text: &str, others: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    others
        .into_iter()
        .map(|o| similarity(text, o))
        .fold(0.0_f64, f64::max)
}
