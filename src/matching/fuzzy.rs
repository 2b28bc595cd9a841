//! Lexical confidence that a term appears in a text, tolerant of small typos.

use super::fields::is_placeholder;

const SHORT_TERM_CHARS: usize = 5;
const COMPACT_SCORE: f64 = 0.9;
const PREFIX_SCORE: f64 = 0.7;
const PREFIX_CHARS: usize = 3;

/// Returns a confidence in `[0, 1]`. Rules run in order and the first
/// non-zero result wins:
///
/// 1. empty, placeholder or single-character terms score 0;
/// 2. plain containment scores 1;
/// 3. short terms (up to five characters) score 1 on a whole-word match after
///    punctuation is normalized, or 0.9 when the alphanumeric-only forms contain
///    each other;
/// 4. each term word of three or more characters whose prefix (or the prefix
///    with its first two characters swapped) starts a word in the text adds
///    0.7, averaged over the term's words.
pub fn fuzzy_match(term: &str, text: &str) -> f64 {
    let term = term.trim().to_lowercase();
    if term.chars().count() < 2 || is_placeholder(&term) {
        return 0.0;
    }
    let text = text.to_lowercase();
    if text.contains(&term) {
        return 1.0;
    }
    if term.chars().count() <= SHORT_TERM_CHARS {
        let short = short_term_match(&term, &text);
        if short > 0.0 {
            return short;
        }
    }
    prefix_match(&term, &text)
}

fn short_term_match(term: &str, text: &str) -> f64 {
    let term_words = words(term);
    if term_words.is_empty() {
        return 0.0;
    }
    let padded_text = format!(" {} ", words(text).join(" "));
    let padded_term = format!(" {} ", term_words.join(" "));
    if padded_text.contains(&padded_term) {
        return 1.0;
    }
    let compact_term = compact(term);
    if !compact_term.is_empty() && compact(text).contains(&compact_term) {
        return COMPACT_SCORE;
    }
    0.0
}

fn prefix_match(term: &str, text: &str) -> f64 {
    let term_words: Vec<String> = words(term)
        .into_iter()
        .filter(|word| word.chars().count() >= PREFIX_CHARS)
        .collect();
    if term_words.is_empty() {
        return 0.0;
    }
    let text_words = words(text);
    let matched = term_words
        .iter()
        .filter(|word| {
            let (prefix, swapped) = prefix_variants(word);
            text_words
                .iter()
                .any(|candidate| candidate.starts_with(&prefix) || candidate.starts_with(&swapped))
        })
        .count();
    PREFIX_SCORE * matched as f64 / term_words.len() as f64
}

/// Three-character prefix and the same prefix with its first two characters
/// transposed (`nkie` -> `nki`, `kni`).
fn prefix_variants(word: &str) -> (String, String) {
    let prefix: Vec<char> = word.chars().take(PREFIX_CHARS).collect();
    let mut swapped = prefix.clone();
    swapped.swap(0, 1);
    (prefix.into_iter().collect(), swapped.into_iter().collect())
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_string())
        .collect()
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}
