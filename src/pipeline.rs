//! End-to-end training loop.
//!
//! [`Word2Vec`] wires the components together: the vocabulary is built
//! once, the sampler feeds the trainer one batch per step, and the
//! evaluator periodically reports nearest neighbours of the validation
//! words. Everything runs on the calling thread; the trainer and evaluator
//! parallelise their inner loops with Rayon.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::{
    config::Word2VecConfig,
    error::{Result, TrainError},
    evaluator::{Neighbour, NeighbourList, SimilarityEvaluator, nearest},
    progress::progress_bar,
    sampler::{Batch, WindowSampler},
    trainer::{StepReport, Trainer},
    types::{UNKNOWN_TOKEN, WordId},
    vocab::Vocabulary,
};

/// Words listed in the startup summary.
const SUMMARY_WORDS: usize = 5;

/// Corpus ids echoed in the startup summary.
const SAMPLE_IDS: usize = 10;

/// Pairs of the first batch echoed at debug level.
const SAMPLE_PAIRS: usize = 8;

/// Nearest neighbours of the validation words after one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Zero-based step after which the evaluation ran.
    pub step: u64,
    pub neighbours: Vec<NeighbourList>,
}

/// What a call to [`Word2Vec::run`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    /// Steps executed by this call.
    pub steps: u64,
    /// Steps discarded as numerical anomalies during this call.
    pub anomalies: u64,
    /// Loss of the last executed step.
    pub last_loss: Option<f32>,
    /// Reports that closed a loss interval.
    pub reports: Vec<StepReport>,
    pub evaluations: Vec<Evaluation>,
    /// `true` if the stop flag ended the run early.
    pub stopped: bool,
}

/// Final normalized embeddings with their words, for downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedEmbeddings {
    /// Row-major V x `dim`, every row unit length (or zero).
    pub normalized: Vec<f32>,
    pub dim: usize,
    /// id -> word.
    pub words: Vec<String>,
}

impl TrainedEmbeddings {
    /// Number of rows (vocabulary size).
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// `true` if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Normalized vector of `id`.
    pub fn vector(&self, id: WordId) -> Option<&[f32]> {
        self.normalized.get(id * self.dim..(id + 1) * self.dim)
    }

    /// Cosine similarity between two ids.
    pub fn similarity(&self, a: WordId, b: WordId) -> Option<f32> {
        let (a, b) = (self.vector(a)?, self.vector(b)?);
        Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
    }

    /// The `k` words closest to `id`, most similar first.
    pub fn nearest(&self, id: WordId, k: usize) -> Vec<(&str, f32)> {
        nearest(&self.normalized, self.dim, id, k)
            .into_iter()
            .map(|n| (self.word(n.id), n.similarity))
            .collect()
    }

    fn word(&self, id: WordId) -> &str {
        self.words.get(id).map_or(UNKNOWN_TOKEN, String::as_str)
    }
}

/// A configured training run over one corpus.
#[derive(Debug)]
pub struct Word2Vec {
    config: Word2VecConfig,
    vocab: Vocabulary,
    sampler: WindowSampler,
    trainer: Trainer,
    evaluator: SimilarityEvaluator,
    stop: Arc<AtomicBool>,
}

impl Word2Vec {
    /// Builds the vocabulary and every component for `tokens`.
    ///
    /// The configuration is validated twice: against the requested
    /// vocabulary size before any work, and against the size actually built,
    /// which is smaller when the corpus has few distinct tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Word2VecError::Config`](crate::Word2VecError::Config) for
    /// invalid settings and
    /// [`Word2VecError::Vocab`](crate::Word2VecError::Vocab) for an empty corpus.
    pub fn new<S>(config: Word2VecConfig, tokens: &[S]) -> Result<Self>
    where
        S: AsRef<str> + Sync,
    {
        config.validate()?;

        let (vocab, corpus) =
            Vocabulary::build_with_progress(tokens, config.vocabulary_size, config.show_progress)?;
        if vocab.len() < config.vocabulary_size {
            warn!(
                requested = config.vocabulary_size,
                built = vocab.len(),
                "corpus has fewer distinct tokens than the requested vocabulary size"
            );
        }
        config.validate_for(vocab.len())?;
        log_corpus_summary(&vocab, &corpus);

        let seed = config.seed;
        let sampler = WindowSampler::new(corpus, config.sampler, seed)?;
        let trainer = Trainer::new(&config.training, vocab.counts(), seed.wrapping_add(1))?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(2));
        let evaluator = SimilarityEvaluator::sample(&config.evaluation, vocab.len(), &mut rng)?;

        Ok(Self {
            config,
            vocab,
            sampler,
            trainer,
            evaluator,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Runs the configured `num_steps`.
    ///
    /// # Errors
    ///
    /// Returns the first [`TrainError`] a step raises.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        self.run_steps(self.config.training.num_steps)
    }

    /// Runs up to `num_steps` more steps, continuing where the last run stopped.
    ///
    /// Before each step the stop flag is checked; once raised, the loop ends
    /// with the last applied step's parameters in place. After every step
    /// whose zero-based index is a multiple of `eval_interval` the
    /// validation words are evaluated and logged.
    ///
    /// # Errors
    ///
    /// Returns the first [`TrainError`] a step raises.
    pub fn run_steps(&mut self, num_steps: u64) -> Result<TrainingSummary> {
        let pb = progress_bar(num_steps, "Training", self.config.show_progress)
            .map_err(TrainError::from)?;
        let eval_interval = self.config.evaluation.eval_interval;
        let anomalies_before = self.trainer.anomalies();

        let mut summary = TrainingSummary::default();
        let mut batch = Batch::with_capacity(self.config.sampler.batch_size);

        info!(num_steps, start = self.trainer.steps(), "starting training");
        for _ in 0..num_steps {
            if self.stop.load(Ordering::Relaxed) {
                info!(step = self.trainer.steps(), "stop requested");
                summary.stopped = true;
                break;
            }

            self.sampler.fill_into(&mut batch);
            if self.trainer.steps() == 0 {
                self.log_sample_batch(&batch);
            }
            let report = self.trainer.step(&batch)?;
            pb.inc(1);

            summary.steps += 1;
            summary.last_loss = Some(report.loss);
            if report.interval_loss.is_some() {
                summary.reports.push(report);
            }
            if report.step % eval_interval == 0 {
                summary.evaluations.push(self.evaluate_at(report.step));
            }
        }
        pb.finish_and_clear();

        summary.anomalies = self.trainer.anomalies() - anomalies_before;
        info!(
            steps = summary.steps,
            anomalies = summary.anomalies,
            last_loss = ?summary.last_loss,
            "training finished"
        );
        Ok(summary)
    }

    /// Nearest neighbours of every validation word under the current embeddings.
    pub fn evaluate(&self) -> Vec<NeighbourList> {
        let normalized = self.trainer.normalized_embeddings();
        self.evaluator.evaluate(&normalized, self.trainer.dim())
    }

    /// The `k` words closest to `word`, or `None` if `word` has no id of its own.
    pub fn nearest(&self, word: &str, k: usize) -> Option<Vec<(String, f32)>> {
        if !self.vocab.contains(word) {
            return None;
        }
        let normalized = self.trainer.normalized_embeddings();
        let neighbours = nearest(&normalized, self.trainer.dim(), self.vocab.id(word), k);
        Some(self.named(&neighbours))
    }

    /// Handle that stops [`Self::run`] before its next step when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Validated configuration of this run.
    pub fn config(&self) -> &Word2VecConfig {
        &self.config
    }

    /// Vocabulary built from the corpus.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Trainer holding the current parameters.
    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    /// Sampler positioned where the next step will read.
    pub fn sampler(&self) -> &WindowSampler {
        &self.sampler
    }

    /// Evaluator with the sampled validation ids.
    pub fn evaluator(&self) -> &SimilarityEvaluator {
        &self.evaluator
    }

    /// Snapshot of the normalized embeddings and their words.
    pub fn embeddings(&self) -> TrainedEmbeddings {
        TrainedEmbeddings {
            normalized: self.trainer.normalized_embeddings(),
            dim: self.trainer.dim(),
            words: self.vocab.words().to_vec(),
        }
    }

    /// Consumes the run, keeping only what downstream consumers need.
    ///
    /// `W` and `b` are dropped here.
    pub fn into_embeddings(self) -> TrainedEmbeddings {
        let normalized = self.trainer.normalized_embeddings();
        let dim = self.trainer.dim();
        TrainedEmbeddings {
            normalized,
            dim,
            words: self.vocab.words().to_vec(),
        }
    }

    fn evaluate_at(&self, step: u64) -> Evaluation {
        let neighbours = self.evaluate();
        for list in &neighbours {
            let names: Vec<String> = self
                .named(&list.neighbours)
                .into_iter()
                .map(|(word, _)| word)
                .collect();
            info!(step, "Nearest to {}: {}", self.word(list.query), names.join(", "));
        }
        Evaluation { step, neighbours }
    }

    fn named(&self, neighbours: &[Neighbour]) -> Vec<(String, f32)> {
        neighbours
            .iter()
            .map(|n| (self.word(n.id).to_owned(), n.similarity))
            .collect()
    }

    fn word(&self, id: WordId) -> &str {
        self.vocab.word(id).unwrap_or(UNKNOWN_TOKEN)
    }

    fn log_sample_batch(&self, batch: &Batch) {
        for pair in batch.pairs().take(SAMPLE_PAIRS) {
            debug!(
                "{} {} -> {} {}",
                pair.0,
                self.word(pair.0),
                pair.1,
                self.word(pair.1)
            );
        }
    }
}

fn log_corpus_summary(vocab: &Vocabulary, corpus: &[WordId]) {
    info!("Data size {}", corpus.len());
    info!("Most common words (+UNK) {:?}", vocab.most_common(SUMMARY_WORDS));
    let sample = &corpus[..corpus.len().min(SAMPLE_IDS)];
    info!("Sample data {:?} {:?}", sample, vocab.decode(sample));
}
