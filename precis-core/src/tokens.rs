//! Word and token estimation.
//!
//! Token counts are approximated from whitespace-delimited words using a
//! fixed ratio of 1.3 tokens per word, which holds well enough for English
//! prose. The conversions are pure and total: any string, including the
//! empty string, has a count.

/// Approximate number of model tokens per word
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Count whitespace-delimited words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate the token count of a text
pub fn estimate_tokens(text: &str) -> u32 {
    tokens_for_words(word_count(text))
}

/// Estimate the token count for a number of words
pub fn tokens_for_words(words: usize) -> u32 {
    (words as f64 * TOKENS_PER_WORD).round() as u32
}

/// Convert a token count back to an approximate word count
pub fn estimate_words(tokens: u32) -> u32 {
    (tokens as f64 / TOKENS_PER_WORD).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(word_count(""), 0);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t "), 0);
        assert_eq!(estimate_words(0), 0);
    }

    #[test]
    fn test_word_count_ignores_layout() {
        assert_eq!(word_count("one two\tthree\n\nfour   five"), 5);
    }

    #[test]
    fn test_estimate_tokens_rounds() {
        // 10 * 1.3 = 13
        assert_eq!(estimate_tokens("a b c d e f g h i j"), 13);
        // 5 * 1.3 = 6.5 -> 7
        assert_eq!(estimate_tokens("a b c d e"), 7);
        assert_eq!(tokens_for_words(5000), 6500);
    }

    #[test]
    fn test_estimate_words() {
        assert_eq!(estimate_words(6500), 5000);
        assert_eq!(estimate_words(3250), 2500);
        assert_eq!(estimate_words(1040), 800);
    }

    #[test]
    fn test_round_trip_stays_within_one_word() {
        for words in 0..5000usize {
            let tokens = tokens_for_words(words);
            let back = estimate_words(tokens) as i64;
            assert!(
                (back - words as i64).abs() <= 1,
                "{} words drifted to {}",
                words,
                back
            );
        }

        let text = "The quick brown fox jumps over the lazy dog. ".repeat(37);
        let words = word_count(&text) as i64;
        let back = estimate_words(estimate_tokens(&text)) as i64;
        assert!((back - words).abs() <= 1);
    }
}
