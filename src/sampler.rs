//! Sliding-window batch generation for skip-gram and CBOW.
//!
//! A [`WindowSampler`] walks the encoded corpus with a cursor, keeping a
//! window of `2 * skip_window + 1` ids. For every window position it picks
//! `num_skips` distinct context slots around the centre and emits one pair
//! per slot, then slides the window by one word. Batches are always filled
//! completely before they are returned; the cursor wraps around at the end
//! of the corpus so the sampler never runs dry.
//!
//! Skip-gram and CBOW share the same windowing and random draws and differ
//! only in which side of the pair carries the pivot.

use std::{collections::VecDeque, sync::Arc};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    config::{Mode, SamplerConfig},
    error::{VocabError, Word2VecError},
    types::{CorpusIdx, TrainingPair, WordId},
};

/// One training batch: `inputs[i]` is trained to predict `labels[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub inputs: Vec<WordId>,
    pub labels: Vec<WordId>,
}

impl Batch {
    /// Creates an empty batch with room for `capacity` pairs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inputs: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// `true` if the batch holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Iterates the batch as (input, label) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = TrainingPair> + '_ {
        self.inputs
            .iter()
            .zip(&self.labels)
            .map(|(&input, &label)| TrainingPair(input, label))
    }

    fn push(&mut self, pair: TrainingPair) {
        self.inputs.push(pair.0);
        self.labels.push(pair.1);
    }
}

/// Stateful batch generator over an encoded corpus.
///
/// The cursor and window belong to this instance alone. The sampler can only
/// continue from where it stopped; to start over, construct a new one.
/// Several samplers may share one corpus through the [`Arc`].
#[derive(Debug, Clone)]
pub struct WindowSampler {
    /// Encoded corpus, never empty.
    corpus: Arc<[WordId]>,

    config: SamplerConfig,

    /// Position of the next id to be consumed.
    cursor: CorpusIdx,

    /// Current context window. Exactly `span` long once filled.
    window: VecDeque<WordId>,

    /// Window offsets eligible as context (every offset except the centre).
    ///
    /// Shuffled in place by the partial Fisher-Yates draw; its contents are
    /// always a permutation of the same candidate set.
    candidates: Vec<usize>,

    rng: ChaCha8Rng,
}

impl WindowSampler {
    /// Creates a sampler positioned at the start of `corpus`.
    ///
    /// # Arguments
    ///
    /// * `corpus` - Encoded corpus to walk.
    /// * `config` - Batch and window geometry plus the pair orientation.
    /// * `seed` - Seed for the context-slot draws.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::error::ConfigError) (wrapped) if the geometry is invalid, and
    /// [`VocabError::CorpusEmpty`] (wrapped) if `corpus` has no ids.
    pub fn new(
        corpus: impl Into<Arc<[WordId]>>,
        config: SamplerConfig,
        seed: u64,
    ) -> Result<Self, Word2VecError> {
        config.validate()?;
        let corpus = corpus.into();
        if corpus.is_empty() {
            return Err(VocabError::CorpusEmpty.into());
        }

        let span = config.span();
        let candidates = (0..span).filter(|&o| o != config.skip_window).collect();

        Ok(Self {
            corpus,
            config,
            cursor: 0,
            window: VecDeque::with_capacity(span),
            candidates,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Produces the next batch of exactly `batch_size` pairs.
    ///
    /// The window advances by one word per `num_skips` pairs emitted, so a
    /// batch covers `batch_size / num_skips` consecutive pivots.
    pub fn next_batch(&mut self) -> Batch {
        let mut batch = Batch::with_capacity(self.config.batch_size);
        self.fill_into(&mut batch);
        batch
    }

    /// Refills `batch` in place, reusing its allocations.
    pub fn fill_into(&mut self, batch: &mut Batch) {
        batch.inputs.clear();
        batch.labels.clear();

        self.fill_window();

        let windows = self.config.batch_size / self.config.num_skips;
        for _ in 0..windows {
            let pivot = self.window[self.config.skip_window];

            for j in 0..self.config.num_skips {
                // Partial Fisher-Yates: slots [0, j) already hold this window's picks.
                let k = self.rng.gen_range(j..self.candidates.len());
                self.candidates.swap(j, k);
                let context = self.window[self.candidates[j]];

                let pair = TrainingPair(pivot, context);
                batch.push(match self.config.mode {
                    Mode::SkipGram => pair,
                    Mode::Cbow => pair.swapped(),
                });
            }

            self.advance();
        }
    }

    /// Endless iterator of batches drawn from this sampler.
    pub fn batches(&mut self) -> Batches<'_> {
        Batches { sampler: self }
    }

    /// Position of the next id to be consumed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current window contents, oldest first. Empty before the first batch.
    pub fn window(&self) -> &VecDeque<WordId> {
        &self.window
    }

    /// Window geometry and mode this sampler was built with.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Length of the corpus being walked.
    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    /// Tops the window up to `span` ids.
    fn fill_window(&mut self) {
        while self.window.len() < self.config.span() {
            let id = self.consume();
            self.window.push_back(id);
        }
    }

    /// Slides the window one word forward, evicting the oldest id.
    fn advance(&mut self) {
        let id = self.consume();
        self.window.pop_front();
        self.window.push_back(id);
    }

    /// Reads the id under the cursor and moves the cursor on, wrapping at the end.
    fn consume(&mut self) -> WordId {
        let id = self.corpus[self.cursor];
        self.cursor = (self.cursor + 1) % self.corpus.len();
        id
    }
}

/// Iterator returned by [`WindowSampler::batches`]. Never ends.
#[derive(Debug)]
pub struct Batches<'a> {
    sampler: &'a mut WindowSampler,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        Some(self.sampler.next_batch())
    }
}
