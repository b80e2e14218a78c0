//! Frequency-ranked vocabulary construction.
//!
//! Turns a raw token stream into a fixed-size id space:
//! 1. Count every distinct token (in parallel via Rayon).
//! 2. Keep the `size - 1` most frequent tokens, ranked by descending count.
//! 3. Reserve id 0 for the UNKNOWN token, carrying the count of everything dropped.
//! 4. Encode the corpus by mapping each token through the vocabulary.

use std::collections::HashMap;

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    error::VocabError,
    progress::progress_bar,
    types::{CorpusIdx, UNKNOWN_ID, UNKNOWN_TOKEN, WordFreq, WordId},
};

/// Tokens per Rayon work item when counting.
const COUNT_CHUNK: usize = 1 << 16;

/// Running tally for one distinct token.
///
/// `first` is the earliest corpus position the token was seen at and is
/// the tie-breaker between equally frequent tokens.
#[derive(Debug, Clone, Copy)]
struct Tally {
    count: WordFreq,
    first: CorpusIdx,
}

/// Bidirectional word ↔ id mapping with per-id frequencies.
///
/// Ids `1..len()` are ordered by descending corpus frequency; tokens with
/// equal counts keep the order of their first occurrence in the corpus.
/// Id 0 is always [`UNKNOWN_TOKEN`].
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// id -> word.
    words: Vec<String>,

    /// word -> id. Never contains [`UNKNOWN_TOKEN`]; lookups fall back to id 0.
    index: HashMap<String, WordId>,

    /// id -> occurrence count in the corpus the vocabulary was built from.
    counts: Vec<WordFreq>,
}

impl Vocabulary {
    /// Builds a vocabulary of at most `size` entries and encodes `tokens` with it.
    ///
    /// If the corpus has fewer than `size - 1` distinct tokens, all of them are
    /// kept and the vocabulary is smaller than requested. A literal
    /// `"UNK"` token in the corpus is folded into id 0.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Ordered corpus tokens.
    /// * `size` - Target vocabulary size, including the UNKNOWN id.
    ///
    /// # Returns
    ///
    /// The vocabulary and the encoded corpus (same length as `tokens`).
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::CorpusEmpty`] if `tokens` is empty and
    /// [`VocabError::ZeroSize`] if `size` is 0.
    pub fn build<S>(tokens: &[S], size: usize) -> Result<(Self, Vec<WordId>), VocabError>
    where
        S: AsRef<str> + Sync,
    {
        Self::build_with_progress(tokens, size, false)
    }

    /// Same as [`Vocabulary::build`], optionally drawing a progress bar
    /// while counting.
    ///
    /// # Errors
    ///
    /// As [`Vocabulary::build`], plus [`VocabError::ProgressBarSetup`] if the
    /// progress bar template fails to compile.
    pub fn build_with_progress<S>(
        tokens: &[S],
        size: usize,
        show_progress: bool,
    ) -> Result<(Self, Vec<WordId>), VocabError>
    where
        S: AsRef<str> + Sync,
    {
        if size == 0 {
            return Err(VocabError::ZeroSize);
        }
        if tokens.is_empty() {
            return Err(VocabError::CorpusEmpty);
        }

        let tallies = count_tokens(tokens, show_progress)?;
        let distinct = tallies.len();

        // Rank by count (descending), then first occurrence (ascending).
        let mut ranked: Vec<(&str, Tally)> = tallies
            .into_iter()
            .filter(|(word, _)| *word != UNKNOWN_TOKEN)
            .collect();
        ranked.sort_unstable_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then_with(|| a.1.first.cmp(&b.1.first))
        });
        ranked.truncate(size - 1);

        let mut words = Vec::with_capacity(ranked.len() + 1);
        let mut counts = Vec::with_capacity(ranked.len() + 1);
        let mut index = HashMap::with_capacity(ranked.len());

        words.push(UNKNOWN_TOKEN.to_string());
        counts.push(0);
        for (word, tally) in ranked {
            index.insert(word.to_string(), words.len());
            words.push(word.to_string());
            counts.push(tally.count);
        }

        let kept: WordFreq = counts.iter().sum();
        counts[UNKNOWN_ID] = tokens.len() as WordFreq - kept;

        let vocab = Self {
            words,
            index,
            counts,
        };
        let encoded = vocab.encode(tokens);

        info!(
            tokens = tokens.len(),
            distinct,
            size = vocab.len(),
            unknown = vocab.counts[UNKNOWN_ID],
            "built vocabulary"
        );

        Ok((vocab, encoded))
    }

    /// Maps a word to its id, or [`UNKNOWN_ID`] if it is not in the vocabulary.
    pub fn id(&self, word: &str) -> WordId {
        self.index.get(word).copied().unwrap_or(UNKNOWN_ID)
    }

    /// Returns `true` if `word` has its own id.
    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    /// Maps an id back to its word.
    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id).map(String::as_str)
    }

    /// Occurrence count for `id`, 0 if out of range.
    pub fn count(&self, id: WordId) -> WordFreq {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Frequency table indexed by id.
    pub fn counts(&self) -> &[WordFreq] {
        &self.counts
    }

    /// Words indexed by id.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Number of ids, including the UNKNOWN id.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false: every vocabulary contains at least the UNKNOWN id.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Encodes tokens to ids; tokens outside the vocabulary become [`UNKNOWN_ID`].
    pub fn encode<S>(&self, tokens: &[S]) -> Vec<WordId>
    where
        S: AsRef<str> + Sync,
    {
        tokens
            .par_iter()
            .map(|token| self.id(token.as_ref()))
            .collect()
    }

    /// Decodes ids to words; ids outside the vocabulary decode to [`UNKNOWN_TOKEN`].
    pub fn decode(&self, ids: &[WordId]) -> Vec<&str> {
        ids.iter()
            .map(|&id| self.word(id).unwrap_or(UNKNOWN_TOKEN))
            .collect()
    }

    /// Iterates `(id, word, count)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (WordId, &str, WordFreq)> + '_ {
        self.words
            .iter()
            .zip(&self.counts)
            .enumerate()
            .map(|(id, (word, &count))| (id, word.as_str(), count))
    }

    /// The first `n` entries in id order, UNKNOWN included, with their counts.
    pub fn most_common(&self, n: usize) -> Vec<(&str, WordFreq)> {
        self.words
            .iter()
            .zip(&self.counts)
            .take(n)
            .map(|(word, &count)| (word.as_str(), count))
            .collect()
    }
}

/// Counts every distinct token and records where it first appears.
///
/// Chunks are tallied on Rayon workers and merged pairwise; merging keeps
/// the minimum first position so the result does not depend on how Rayon
/// schedules the reduction.
fn count_tokens<S>(
    tokens: &[S],
    show_progress: bool,
) -> Result<HashMap<&str, Tally>, VocabError>
where
    S: AsRef<str> + Sync,
{
    let num_chunks = tokens.len().div_ceil(COUNT_CHUNK) as u64;
    let pb = progress_bar(num_chunks, "Counting tokens", show_progress)?;

    let tallies = tokens
        .par_chunks(COUNT_CHUNK)
        .enumerate()
        .progress_with(pb)
        .map(|(chunk_idx, chunk)| {
            let offset = chunk_idx * COUNT_CHUNK;
            let mut local: HashMap<&str, Tally> = HashMap::new();
            for (i, token) in chunk.iter().enumerate() {
                local
                    .entry(token.as_ref())
                    .and_modify(|t| t.count += 1)
                    .or_insert(Tally {
                        count: 1,
                        first: offset + i,
                    });
            }
            local
        })
        .reduce(HashMap::new, |mut acc, other| {
            for (word, tally) in other {
                acc.entry(word)
                    .and_modify(|t| {
                        t.count += tally.count;
                        t.first = t.first.min(tally.first);
                    })
                    .or_insert(tally);
            }
            acc
        });

    debug!(distinct = tallies.len(), "counted tokens");
    Ok(tallies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn test_ranks_by_frequency() {
        let tokens = words("b a c a b a");
        let (vocab, encoded) = Vocabulary::build(&tokens, 10).expect("vocab should build");
        assert_eq!(vocab.words(), &["UNK", "a", "b", "c"]);
        assert_eq!(vocab.counts(), &[0, 3, 2, 1]);
        assert_eq!(encoded, vec![2, 1, 3, 1, 2, 1]);
    }

    #[test]
    fn test_ties_keep_first_occurrence_order() {
        let tokens = words("z y x z y x");
        let (vocab, _) = Vocabulary::build(&tokens, 10).expect("vocab should build");
        assert_eq!(vocab.words(), &["UNK", "z", "y", "x"]);
    }

    #[test]
    fn test_truncation_aggregates_unknown() {
        let tokens = words("a a a b b c d");
        let (vocab, encoded) = Vocabulary::build(&tokens, 3).expect("vocab should build");
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.words(), &["UNK", "a", "b"]);
        // "c" and "d" fall into UNK.
        assert_eq!(vocab.count(UNKNOWN_ID), 2);
        assert_eq!(encoded, vec![1, 1, 1, 2, 2, 0, 0]);
        assert_eq!(vocab.id("c"), UNKNOWN_ID);
        assert_eq!(vocab.id("never-seen"), UNKNOWN_ID);
    }

    #[test]
    fn test_counts_sum_to_corpus_length() {
        let tokens = words("the cat sat on the mat the end");
        let (vocab, _) = Vocabulary::build(&tokens, 4).expect("vocab should build");
        let total: WordFreq = vocab.counts().iter().sum();
        assert_eq!(total, tokens.len() as WordFreq);
    }

    #[test]
    fn test_literal_unk_folds_into_id_zero() {
        let tokens = words("UNK a UNK b");
        let (vocab, encoded) = Vocabulary::build(&tokens, 10).expect("vocab should build");
        assert_eq!(vocab.words(), &["UNK", "a", "b"]);
        assert_eq!(vocab.count(UNKNOWN_ID), 2);
        assert_eq!(encoded, vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_literal_unk_size() {
        // "UNK" is one of the three distinct tokens but takes no id of its own.
        let tokens = words("UNK a UNK b");
        let (vocab, _) = Vocabulary::build(&tokens, 10).expect("vocab should build");
        assert_eq!(vocab.len(), 3);

        let tokens = words("UNK a b c c");
        let (vocab, _) = Vocabulary::build(&tokens, 3).expect("vocab should build");
        assert_eq!(vocab.words(), &["UNK", "c", "a"]);
        assert_eq!(vocab.count(UNKNOWN_ID), 2);
    }

    #[test]
    fn test_empty_corpus_errors() {
        let tokens: Vec<&str> = Vec::new();
        assert!(matches!(
            Vocabulary::build(&tokens, 10),
            Err(VocabError::CorpusEmpty)
        ));
    }

    #[test]
    fn test_zero_size_errors() {
        assert!(matches!(
            Vocabulary::build(&["a"], 0),
            Err(VocabError::ZeroSize)
        ));
    }

    #[test]
    fn test_size_one_is_all_unknown() {
        let tokens = words("a b c");
        let (vocab, encoded) = Vocabulary::build(&tokens, 1).expect("vocab should build");
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.count(UNKNOWN_ID), 3);
        assert_eq!(encoded, vec![0, 0, 0]);
    }

    #[test]
    fn test_word_and_id_are_inverse() {
        let tokens = words("one two two three three three");
        let (vocab, _) = Vocabulary::build(&tokens, 10).expect("vocab should build");
        for (id, word, count) in vocab.iter() {
            assert_eq!(vocab.id(word), id);
            assert_eq!(vocab.count(id), count);
        }
        assert_eq!(vocab.iter().count(), vocab.len());
        assert_eq!(vocab.word(vocab.len()), None);
    }

    #[test]
    fn test_most_common_includes_unknown() {
        let tokens = words("a a b c");
        let (vocab, _) = Vocabulary::build(&tokens, 2).expect("vocab should build");
        assert_eq!(vocab.most_common(5), vec![("UNK", 2), ("a", 2)]);
        assert_eq!(vocab.decode(&[1, 0, 42]), vec!["a", "UNK", "UNK"]);
    }

    #[test]
    fn test_counting_spans_multiple_chunks() {
        // Enough tokens to force several Rayon chunks.
        let mut tokens = vec!["filler"; COUNT_CHUNK * 2 + 17];
        tokens.push("late");
        tokens[COUNT_CHUNK + 3] = "early";
        tokens.push("early");
        let (vocab, _) = Vocabulary::build(&tokens, 10).expect("vocab should build");
        // One "early" sits in the second chunk, the other at the very end.
        assert_eq!(vocab.words(), &["UNK", "filler", "early", "late"]);
        assert_eq!(vocab.count(2), 2);
    }
}
