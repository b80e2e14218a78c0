//! Negative-id sampling policies.
//!
//! The negative-sampling loss contrasts each true label with `num_sampled`
//! ids drawn from a noise distribution. Three distributions are provided:
//!
//! - [`NegativeSampling::Uniform`]: every id equally likely.
//! - [`NegativeSampling::LogUniform`] (default): Zipfian over ids, which are
//!   already ranked by frequency, `P(k) = ln((k + 2) / (k + 1)) / ln(V + 1)`.
//!   Needs no counts and favours frequent words.
//! - [`NegativeSampling::Unigram`]: proportional to `count^power`, with the
//!   customary `power = 0.75` flattening the raw unigram distribution.
//!
//! Accidental hits (a negative equal to the true label) are not filtered.

use rand::{
    Rng, RngCore,
    distributions::{Distribution, WeightedIndex},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    types::{WordFreq, WordId},
};

fn default_power() -> f64 {
    0.75
}

/// Noise distribution selector, as written in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NegativeSampling {
    Uniform,
    #[default]
    LogUniform,
    Unigram {
        #[serde(default = "default_power")]
        power: f64,
    },
}

impl NegativeSampling {
    /// Checks distribution parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the unigram power is negative or not finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Unigram { power } = self
            && !(power.is_finite() && *power >= 0.0)
        {
            return Err(ConfigError::Invalid {
                name: "negative_sampling.power",
                reason: format!("must be a non-negative finite number, got {power}"),
            });
        }
        Ok(())
    }

    /// Builds the sampler for a vocabulary with the given frequency table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the parameters are invalid or if `counts`
    /// cannot form a distribution (empty, or all weights zero).
    pub fn build(&self, counts: &[WordFreq]) -> Result<Box<dyn NegativeSampler>, ConfigError> {
        self.validate()?;
        if counts.is_empty() {
            return Err(ConfigError::Zero("vocabulary_size"));
        }
        let sampler: Box<dyn NegativeSampler> = match *self {
            Self::Uniform => Box::new(UniformSampler::new(counts.len())),
            Self::LogUniform => Box::new(LogUniformSampler::new(counts.len())),
            Self::Unigram { power } => Box::new(UnigramSampler::new(counts, power)?),
        };
        Ok(sampler)
    }
}

/// Source of negative ids for the training loss.
///
/// Implementations hold no mutable state; all randomness comes from the
/// caller's RNG so draws are reproducible from the trainer's seed.
pub trait NegativeSampler: Send + Sync + std::fmt::Debug {
    /// Draws one id in `[0, vocabulary_size)`.
    fn sample(&self, rng: &mut dyn RngCore) -> WordId;

    /// Probability of drawing `id`.
    fn probability(&self, id: WordId) -> f64;

    /// Fills `out` with independent draws.
    fn sample_into(&self, rng: &mut dyn RngCore, out: &mut [WordId]) {
        for slot in out {
            *slot = self.sample(rng);
        }
    }
}

/// Every id equally likely.
#[derive(Debug, Clone)]
pub struct UniformSampler {
    vocabulary_size: usize,
}

impl UniformSampler {
    /// Sampler over `[0, vocabulary_size)`.
    pub fn new(vocabulary_size: usize) -> Self {
        Self { vocabulary_size }
    }
}

impl NegativeSampler for UniformSampler {
    fn sample(&self, rng: &mut dyn RngCore) -> WordId {
        rng.gen_range(0..self.vocabulary_size)
    }

    fn probability(&self, id: WordId) -> f64 {
        if id < self.vocabulary_size {
            1.0 / self.vocabulary_size as f64
        } else {
            0.0
        }
    }
}

/// Zipfian draw over frequency-ranked ids.
///
/// Sampled by inverting the CDF: `floor(exp(u * ln(V + 1))) - 1` for
/// `u ~ U[0, 1)`.
#[derive(Debug, Clone)]
pub struct LogUniformSampler {
    vocabulary_size: usize,
    log_range: f64,
}

impl LogUniformSampler {
    /// Sampler over `[0, vocabulary_size)`; `vocabulary_size` must be non-zero.
    pub fn new(vocabulary_size: usize) -> Self {
        Self {
            vocabulary_size,
            log_range: ((vocabulary_size + 1) as f64).ln(),
        }
    }
}

impl NegativeSampler for LogUniformSampler {
    fn sample(&self, rng: &mut dyn RngCore) -> WordId {
        let u: f64 = rng.r#gen();
        let id = ((u * self.log_range).exp() - 1.0).floor() as WordId;
        // Rounding at u -> 1 can land one past the end.
        id.min(self.vocabulary_size - 1)
    }

    fn probability(&self, id: WordId) -> f64 {
        if id >= self.vocabulary_size {
            return 0.0;
        }
        let k = id as f64;
        ((k + 2.0) / (k + 1.0)).ln() / self.log_range
    }
}

/// Draws ids proportionally to `count^power`.
#[derive(Debug, Clone)]
pub struct UnigramSampler {
    dist: WeightedIndex<f64>,
    weights: Vec<f64>,
    total: f64,
}

impl UnigramSampler {
    /// Builds the weighted table from a frequency table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if every weight is zero.
    pub fn new(counts: &[WordFreq], power: f64) -> Result<Self, ConfigError> {
        let weights: Vec<f64> = counts.iter().map(|&c| (c as f64).powf(power)).collect();
        // 0^0 == 1 would give never-seen ids weight; keep them out.
        let weights: Vec<f64> = weights
            .into_iter()
            .zip(counts)
            .map(|(w, &c)| if c == 0 { 0.0 } else { w })
            .collect();
        let total = weights.iter().sum();
        let dist = WeightedIndex::new(&weights).map_err(|e| ConfigError::Invalid {
            name: "negative_sampling",
            reason: format!("cannot build unigram table: {e}"),
        })?;
        Ok(Self {
            dist,
            weights,
            total,
        })
    }
}

impl NegativeSampler for UnigramSampler {
    fn sample(&self, rng: &mut dyn RngCore) -> WordId {
        self.dist.sample(rng)
    }

    fn probability(&self, id: WordId) -> f64 {
        self.weights.get(id).map_or(0.0, |w| w / self.total)
    }
}
