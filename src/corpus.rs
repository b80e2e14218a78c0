//! Splitting raw text into corpus tokens.
//!
//! Tokens are the regex matches of a split pattern, in order. Batch
//! tokenization runs one text per Rayon worker.

use std::path::Path;

use fancy_regex::Regex;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use tracing::info;

use crate::{error::TokenizeError, progress::progress_bar};

/// Whitespace-separated words.
pub const DEFAULT_PATTERN: &str = r"\S+";

/// Regex-based corpus tokenizer.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    pattern: Regex,
    lowercase: bool,
}

impl Tokenizer {
    /// Compiles `pattern`; every match becomes one token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizeError::InvalidPattern`] if `pattern` fails to compile.
    pub fn new(pattern: &str) -> Result<Self, TokenizeError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            lowercase: false,
        })
    }

    /// Lowercases every token when `lowercase` is set.
    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Source text of the split pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Splits `text` into tokens. Empty matches are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizeError::RegexMatch`] if the regex engine fails
    /// (e.g. backtracking limit exceeded).
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError> {
        let mut tokens = Vec::new();
        for mat in self.pattern.find_iter(text) {
            let m = mat.map_err(|e| TokenizeError::RegexMatch(e.to_string()))?;
            let token = m.as_str();
            if token.is_empty() {
                continue;
            }
            tokens.push(if self.lowercase {
                token.to_lowercase()
            } else {
                token.to_owned()
            });
        }
        Ok(tokens)
    }

    /// Tokenizes many texts in parallel.
    ///
    /// # Returns
    ///
    /// One token list per text, in input order.
    ///
    /// # Errors
    ///
    /// Returns the first [`TokenizeError`] raised by any text, or
    /// [`TokenizeError::ProgressBarSetup`] if the bar cannot be built.
    pub fn tokenize_batch(
        &self,
        texts: &[&str],
        show_progress: bool,
    ) -> Result<Vec<Vec<String>>, TokenizeError> {
        let pb = progress_bar(texts.len() as u64, "Tokenizing", show_progress)?;
        texts
            .par_iter()
            .progress_with(pb)
            .map(|text| self.tokenize(text))
            .collect()
    }

    /// Reads a UTF-8 text file and tokenizes it line by line.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a
    /// [`TokenizeError`] from [`Self::tokenize_batch`].
    pub fn tokenize_file(
        &self,
        path: impl AsRef<Path>,
        show_progress: bool,
    ) -> crate::Result<Vec<String>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();
        let tokens: Vec<String> = self
            .tokenize_batch(&lines, show_progress)?
            .into_iter()
            .flatten()
            .collect();
        info!(path = %path.display(), tokens = tokens.len(), "read corpus");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn tokenizer(pattern: &str) -> Tokenizer {
        Tokenizer::new(pattern).expect("pattern should compile")
    }

    #[test]
    fn test_whitespace_split() {
        let tok = tokenizer(DEFAULT_PATTERN);
        assert_eq!(tok.pattern(), DEFAULT_PATTERN);
        let tokens = tok.tokenize("  the quick\tbrown\n fox ").expect("text should split");
        assert_eq!(tokens, vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn test_lowercase() {
        let tok = tokenizer(r"[A-Za-z]+").with_lowercase(true);
        let tokens = tok.tokenize("Anarchism, ORIGINATED as").expect("text should split");
        assert_eq!(tokens, vec!["anarchism", "originated", "as"]);
    }

    #[test]
    fn test_lookahead_pattern() {
        // fancy_regex supports look-around, which plain regex does not.
        let tok = tokenizer(r"\w+(?=!)");
        let tokens = tok.tokenize("hey! you there!").expect("text should split");
        assert_eq!(tokens, vec!["hey", "there"]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Tokenizer::new("(unclosed"),
            Err(TokenizeError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_batch_keeps_order() {
        let tok = tokenizer(DEFAULT_PATTERN);
        let out = tok
            .tokenize_batch(&["a b", "", "c"], false)
            .expect("texts should split");
        assert_eq!(out, vec![vec!["a", "b"], vec![], vec!["c"]]);
    }

    #[test]
    fn test_tokenize_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "one two\nthree").expect("temp file should be writable");
        let tokens = tokenizer(DEFAULT_PATTERN)
            .tokenize_file(file.path(), false)
            .expect("file should tokenize");
        assert_eq!(tokens, vec!["one", "two", "three"]);
    }
}
