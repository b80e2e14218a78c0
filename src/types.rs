//! Type aliases and shared types for vocabulary building and training.
//!
//! These type aliases provide semantic clarity throughout the codebase.

/// Represents a word identifier in the vocabulary.
///
/// Ids are assigned by descending corpus frequency starting at 1;
/// id 0 is reserved for [`UNKNOWN_ID`].
pub type WordId = usize;

/// Occurrence count of a word in the corpus.
pub type WordFreq = u64;

/// Position of a word in the encoded corpus.
///
/// Used by the window sampler's cursor.
pub(crate) type CorpusIdx = usize;

/// Reserved id for every token excluded from the frequency-ranked vocabulary.
pub const UNKNOWN_ID: WordId = 0;

/// Surface form stored at [`UNKNOWN_ID`].
pub const UNKNOWN_TOKEN: &str = "UNK";

/// A single (input, label) training example.
///
/// For skip-gram the input is the window pivot and the label a context
/// word; CBOW swaps the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrainingPair(pub WordId, pub WordId);

impl TrainingPair {
    /// Returns the pair with input and label exchanged.
    pub fn swapped(self) -> Self {
        Self(self.1, self.0)
    }
}
