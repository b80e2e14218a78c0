//! Training configuration.
//!
//! All parameters are validated up front by [`Word2VecConfig::validate`];
//! component constructors re-check the slice they consume so they can be
//! used on their own.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    negative::NegativeSampling,
    optimizer::OptimizerKind,
};

/// Which side of a training pair carries the window pivot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Predict context words from the pivot: pairs are `(pivot, context)`.
    #[default]
    SkipGram,
    /// Predict the pivot from context words: pairs are `(context, pivot)`.
    Cbow,
}

/// What the training loop does when a step produces a non-finite value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyPolicy {
    /// Return the error and stop.
    #[default]
    Abort,
    /// Log it, discard the update and keep going.
    Skip,
}

/// Master configuration for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word2VecConfig {
    /// Number of vocabulary entries including the UNKNOWN id.
    pub vocabulary_size: usize,

    /// Seed for every random draw (sampler, initialization, negatives, validation set).
    pub seed: u64,

    /// Draw progress bars for vocabulary counting and training.
    pub show_progress: bool,

    pub sampler: SamplerConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for Word2VecConfig {
    fn default() -> Self {
        Self {
            vocabulary_size: 50_000,
            seed: 42,
            show_progress: false,
            sampler: SamplerConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

/// Sliding-window sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Pairs per batch.
    pub batch_size: usize,
    /// Context reuses per window.
    pub num_skips: usize,
    /// Window radius on each side of the pivot.
    pub skip_window: usize,
    pub mode: Mode,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            num_skips: 2,
            skip_window: 1,
            mode: Mode::SkipGram,
        }
    }
}

impl SamplerConfig {
    /// Window width, `2 * skip_window + 1`.
    pub fn span(&self) -> usize {
        2 * self.skip_window + 1
    }

    /// Checks window and batch geometry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a size is zero, if `num_skips` exceeds the
    /// number of context slots, or if `batch_size` is not a multiple of
    /// `num_skips`.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.num_skips == 0 {
            return Err(ConfigError::Zero("num_skips"));
        }
        if self.skip_window == 0 {
            return Err(ConfigError::Zero("skip_window"));
        }
        if self.num_skips > 2 * self.skip_window {
            return Err(ConfigError::TooManySkips {
                num_skips: self.num_skips,
                skip_window: self.skip_window,
            });
        }
        if self.batch_size % self.num_skips != 0 {
            return Err(ConfigError::UnevenBatch {
                batch_size: self.batch_size,
                num_skips: self.num_skips,
            });
        }
        Ok(())
    }
}

/// Trainer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Embedding dimension D.
    pub embedding_size: usize,
    /// Negatives drawn per example.
    pub num_sampled: usize,
    /// Steps executed by the pipeline.
    pub num_steps: u64,
    pub learning_rate: f32,
    /// Steps per mean-loss report.
    pub report_interval: u64,
    pub anomaly_policy: AnomalyPolicy,
    pub optimizer: OptimizerKind,
    pub negative_sampling: NegativeSampling,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            embedding_size: 128,
            num_sampled: 64,
            num_steps: 100_001,
            learning_rate: 1.0,
            report_interval: 2_000,
            anomaly_policy: AnomalyPolicy::Abort,
            optimizer: OptimizerKind::default(),
            negative_sampling: NegativeSampling::default(),
        }
    }
}

impl TrainingConfig {
    /// Checks trainer settings against the vocabulary they will run over.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for zero sizes, `num_sampled >= vocabulary_size`,
    /// a non-positive learning rate or invalid optimizer/sampler parameters.
    pub fn validate(&self, vocabulary_size: usize) -> std::result::Result<(), ConfigError> {
        if vocabulary_size == 0 {
            return Err(ConfigError::Zero("vocabulary_size"));
        }
        if self.embedding_size == 0 {
            return Err(ConfigError::Zero("embedding_size"));
        }
        if self.num_sampled == 0 {
            return Err(ConfigError::Zero("num_sampled"));
        }
        if self.report_interval == 0 {
            return Err(ConfigError::Zero("report_interval"));
        }
        if self.num_sampled >= vocabulary_size {
            return Err(ConfigError::TooManyNegatives {
                num_sampled: self.num_sampled,
                vocabulary_size,
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::LearningRate(self.learning_rate));
        }
        self.optimizer.validate()?;
        self.negative_sampling.validate()
    }
}

/// Nearest-neighbour monitoring settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of validation words.
    pub valid_size: usize,
    /// Validation words are drawn from ids `[0, valid_window)`.
    pub valid_window: usize,
    /// Steps between evaluations; step 0 is always evaluated.
    pub eval_interval: u64,
    /// Neighbours reported per validation word.
    pub top_k: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            valid_size: 16,
            valid_window: 100,
            eval_interval: 50_000,
            top_k: 10,
        }
    }
}

impl EvaluationConfig {
    /// Checks the validation band and neighbour count against the vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `valid_size > valid_window`, if the band is
    /// empty, or if `top_k` leaves no room for excluding the query word.
    pub fn validate(&self, vocabulary_size: usize) -> std::result::Result<(), ConfigError> {
        if self.valid_size == 0 {
            return Err(ConfigError::Zero("valid_size"));
        }
        if self.eval_interval == 0 {
            return Err(ConfigError::Zero("eval_interval"));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Zero("top_k"));
        }
        // The band cannot reach past the end of the vocabulary.
        let band = self.valid_window.min(vocabulary_size);
        if self.valid_size > band {
            return Err(ConfigError::ValidationBand {
                valid_size: self.valid_size,
                valid_window: band,
            });
        }
        if self.top_k >= vocabulary_size {
            return Err(ConfigError::TooManyNeighbours {
                top_k: self.top_k,
                vocabulary_size,
            });
        }
        Ok(())
    }
}

impl Word2VecConfig {
    /// Loads configuration from a TOML file and validates it.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read,
    /// [`Word2VecError::ConfigParse`](crate::Word2VecError::ConfigParse) if it is not
    /// valid TOML for this schema, or a [`ConfigError`] from [`Self::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section against the requested vocabulary size.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.validate_for(self.vocabulary_size)
    }

    /// Validates every section against an actual vocabulary size.
    ///
    /// The built vocabulary can be smaller than `vocabulary_size` when the
    /// corpus has few distinct tokens, so the pipeline re-checks with the
    /// real size once the vocabulary exists.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate_for(&self, vocabulary_size: usize) -> std::result::Result<(), ConfigError> {
        if vocabulary_size < 2 {
            return Err(ConfigError::Invalid {
                name: "vocabulary_size",
                reason: format!("need at least 2 entries, got {vocabulary_size}"),
            });
        }
        self.sampler.validate()?;
        self.training.validate(vocabulary_size)?;
        self.evaluation.validate(vocabulary_size)
    }
}
