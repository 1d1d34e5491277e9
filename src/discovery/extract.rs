use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Terms kept after counting.
pub const MAX_CANDIDATES: usize = 20;
/// A term must appear at least this often.
pub const MIN_OCCURRENCES: usize = 3;
/// Tokens this short or shorter are dropped.
const MAX_SHORT_TOKEN_LEN: usize = 2;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall", "can",
    "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with", "at", "by", "from",
    "as", "into", "through", "during", "before", "after", "above", "below", "between", "out",
    "off", "over", "under", "again", "further", "then", "once", "here", "there", "when", "where",
    "why", "how", "all", "each", "every", "both", "few", "more", "most", "other", "some", "such",
    "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "just", "because",
    "but", "and", "or", "if", "while", "about", "up", "my", "your", "his", "her", "its", "our",
    "their", "this", "that", "these", "those", "i", "me", "we", "you", "he", "she", "it", "they",
    "what", "which", "who", "whom", "whose", "anyone", "someone", "look", "looking", "got", "get",
    "new", "like", "help", "want", "think", "know", "find", "advice", "opinion", "thoughts",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z]+").expect("valid regex"))
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercased alphabetic tokens with stop-words and short tokens removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    word_re()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.len() > MAX_SHORT_TOKEN_LEN && !is_stop_word(w))
        .map(str::to_string)
        .collect()
}

/// Frequent unigrams and bigrams across `titles`, most frequent first.
/// Ties keep first-seen order.
pub fn extract_candidate_terms(titles: &[String]) -> Vec<String> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut bump = |term: String| match index.get(&term) {
        Some(&i) => order[i].1 += 1,
        None => {
            index.insert(term.clone(), order.len());
            order.push((term, 1));
        }
    };

    for title in titles {
        let words = tokenize(title);
        for w in &words {
            bump(w.clone());
        }
        for pair in words.windows(2) {
            bump(format!("{} {}", pair[0], pair[1]));
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(MAX_CANDIDATES)
        .filter(|(_, count)| *count >= MIN_OCCURRENCES)
        .map(|(term, _)| term)
        .collect()
}
