//! Error types for vocabulary building, sampling and training.

use indicatif::style::TemplateError;

/// Errors that can occur while building a vocabulary.
#[derive(Debug, thiserror::Error)]
pub enum VocabError {
    /// The token sequence contained no tokens at all.
    #[error("corpus is empty: no tokens to build a vocabulary from")]
    CorpusEmpty,
    /// Requested vocabulary size leaves no room for the UNKNOWN id.
    #[error("vocabulary size must be at least 1")]
    ZeroSize,
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Invalid sampler, training or evaluation configuration.
///
/// Always raised eagerly, before the first batch is generated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A size or interval that must be positive was zero.
    #[error("`{0}` must be greater than 0")]
    Zero(&'static str),
    /// More context reuses were requested than the window holds.
    #[error("num_skips ({num_skips}) must not exceed 2 * skip_window (skip_window = {skip_window})")]
    TooManySkips { num_skips: usize, skip_window: usize },
    /// Batches must hold a whole number of windows.
    #[error("batch_size ({batch_size}) must be a multiple of num_skips ({num_skips})")]
    UnevenBatch { batch_size: usize, num_skips: usize },
    /// Negatives must be drawn from a strictly larger id space.
    #[error("num_sampled ({num_sampled}) must be smaller than vocabulary_size ({vocabulary_size})")]
    TooManyNegatives { num_sampled: usize, vocabulary_size: usize },
    /// Cannot draw more distinct validation ids than the band offers.
    #[error("valid_size ({valid_size}) must not exceed valid_window ({valid_window})")]
    ValidationBand { valid_size: usize, valid_window: usize },
    /// Cannot return more neighbours than there are other words.
    #[error("top_k ({top_k}) must be smaller than vocabulary_size ({vocabulary_size})")]
    TooManyNeighbours { top_k: usize, vocabulary_size: usize },
    /// Learning rate was zero, negative or not finite.
    #[error("learning_rate must be a positive finite number, got {0}")]
    LearningRate(f32),
    /// A tuning parameter outside its valid range.
    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors that can occur during a training step or loop.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Non-finite loss or gradient observed; the step was not applied.
    #[error("numerical anomaly at step {step}: non-finite {what}")]
    NumericalAnomaly { step: u64, what: &'static str },
    /// Batch arrays disagree with the trainer's shape.
    #[error("batch has {inputs} inputs but {labels} labels")]
    BatchShape { inputs: usize, labels: usize },
    /// A step was requested on a batch with no pairs.
    #[error("cannot train on an empty batch")]
    EmptyBatch,
    /// A batch referenced an id outside the vocabulary.
    #[error("word id {id} out of range for vocabulary of size {vocabulary_size}")]
    IdOutOfRange { id: usize, vocabulary_size: usize },
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Errors that can occur when initializing a corpus tokenizer.
#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    /// The regex pattern failed to compile.
    #[error("invalid split pattern: {0}")]
    InvalidPattern(#[from] fancy_regex::Error),
    /// Regex engine failed during text splitting (e.g. backtracking limit exceeded).
    #[error("regex match failed: {0}")]
    RegexMatch(String),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Umbrella error returned by the pipeline and configuration loaders.
#[derive(Debug, thiserror::Error)]
pub enum Word2VecError {
    #[error(transparent)]
    Vocab(#[from] VocabError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    /// Configuration file could not be parsed.
    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate's public API.
pub type Result<T> = std::result::Result<T, Word2VecError>;
