//! Tokenising and stemming front-end.
//!
//! The contract the core consumes this through: a sequence of parsed tokens
//! per line, each reduced to a lowercased stem. Stemmers may not be
//! thread-safe, so callers create one [`TokenStemmer`] per build/search task
//! rather than sharing a single instance across worker threads.

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::sync::OnceLock;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("static pattern is valid"))
}

/// Split a line into the raw word-like tokens the stemmer front-end parses
/// out; punctuation and whitespace are discarded entirely.
pub fn tokenize(line: &str) -> Vec<String> {
    word_pattern()
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A per-task stemmer. Lowercases each token before handing it to the
/// Snowball English stemmer.
pub struct TokenStemmer {
    stemmer: Stemmer,
}

impl TokenStemmer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Stem a single already-tokenised word. May return an empty string,
    /// which callers must drop.
    pub fn stem(&self, token: &str) -> String {
        self.stemmer.stem(&token.to_lowercase()).into_owned()
    }

    /// Tokenise and stem a whole line, dropping empty stems.
    pub fn stem_line(&self, line: &str) -> Vec<String> {
        tokenize(line)
            .into_iter()
            .map(|token| self.stem(&token))
            .filter(|stem| !stem.is_empty())
            .collect()
    }
}

impl Default for TokenStemmer {
    fn default() -> Self {
        Self::new()
    }
}
