//! Negative-sampling embedding trainer.
//!
//! Owns the embedding matrix `E` (V x D), the output weights `W` (V x D) and
//! biases `b` (V). For a pair `(a, j)` the score is `s = E[a] . W[j] + b[j]`
//! and the per-example loss is
//!
//! ```text
//! softplus(-s(a, label)) + sum_k softplus(s(a, neg_k))
//! ```
//!
//! which equals `-log σ(s⁺) - Σ log σ(-s⁻)`, averaged over the batch.
//!
//! Each step computes per-example gradients in parallel, sums gradients of
//! repeated rows in example order, checks everything is finite, and only
//! then writes the touched rows. A step therefore either applies fully or
//! not at all.

use std::{collections::BTreeMap, iter};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    config::{AnomalyPolicy, TrainingConfig},
    error::{ConfigError, TrainError},
    negative::NegativeSampler,
    optimizer::{Optimizer, Slots},
    sampler::Batch,
    types::{UNKNOWN_ID, WordFreq, WordId},
};

/// Outcome of one [`Trainer::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Zero-based index of this step.
    pub step: u64,
    /// Mean loss over the batch. Non-finite only for skipped steps.
    pub loss: f32,
    /// Mean loss over the last `report_interval` applied steps, set on the
    /// step that closes an interval.
    pub interval_loss: Option<f32>,
    /// `false` if the update was discarded as a numerical anomaly.
    pub applied: bool,
}

/// Gradients of one training example, already scaled by `1 / batch_size`.
#[derive(Debug)]
struct ExampleGrad {
    /// Unscaled loss of this example.
    loss: f32,
    /// d loss / d E[input].
    input_grad: Vec<f32>,
    /// d loss / d score, for the label followed by every negative.
    score_grads: Vec<f32>,
}

/// Row-sparse gradients of a whole batch, keyed by row id.
///
/// Ordered maps keep the update order independent of hashing.
#[derive(Debug, Default)]
struct BatchGrad {
    embeddings: BTreeMap<WordId, Vec<f32>>,
    weights: BTreeMap<WordId, Vec<f32>>,
    biases: BTreeMap<WordId, f32>,
}

impl BatchGrad {
    fn non_finite(&self) -> Option<&'static str> {
        let rows_finite =
            |rows: &BTreeMap<WordId, Vec<f32>>| rows.values().flatten().all(|g| g.is_finite());
        if !rows_finite(&self.embeddings) {
            Some("embedding gradient")
        } else if !rows_finite(&self.weights) {
            Some("weight gradient")
        } else if !self.biases.values().all(|g| g.is_finite()) {
            Some("bias gradient")
        } else {
            None
        }
    }
}

/// Embedding trainer with negative-sampling loss.
#[derive(Debug)]
pub struct Trainer {
    vocabulary_size: usize,
    dim: usize,

    /// Embedding matrix E, row-major V x D.
    embeddings: Vec<f32>,
    /// Output weights W, row-major V x D.
    weights: Vec<f32>,
    /// Output biases b, length V.
    biases: Vec<f32>,

    optimizer: Optimizer,
    embedding_slots: Slots,
    weight_slots: Slots,
    bias_slots: Slots,

    negatives: Box<dyn NegativeSampler>,
    num_sampled: usize,

    /// Drives initialization and negative draws.
    rng: ChaCha8Rng,

    anomaly_policy: AnomalyPolicy,
    report_interval: u64,

    /// Completed steps, applied or skipped.
    steps: u64,
    /// Steps discarded as numerical anomalies.
    anomalies: u64,

    /// Loss accumulated over the current report interval.
    interval_loss: f64,
    /// Applied steps in the current report interval.
    interval_applied: u64,
}

impl Trainer {
    /// Initializes the parameters for a vocabulary with frequency table `counts`.
    ///
    /// `E ~ U[-1, 1]`, `W ~ N(0, sqrt(6 / (V + D)))` and `b = 0`.
    ///
    /// # Arguments
    ///
    /// * `config` - Trainer settings.
    /// * `counts` - Frequency table indexed by id; its length is V.
    /// * `seed` - Seed for initialization and negative draws.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid for this vocabulary.
    pub fn new(
        config: &TrainingConfig,
        counts: &[WordFreq],
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let vocabulary_size = counts.len();
        config.validate(vocabulary_size)?;
        let dim = config.embedding_size;
        let len = vocabulary_size * dim;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let embeddings: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect();

        let std_dev = (6.0 / (vocabulary_size + dim) as f32).sqrt();
        let normal = Normal::new(0.0, std_dev).map_err(|e| ConfigError::Invalid {
            name: "embedding_size",
            reason: format!("cannot initialize weights: {e}"),
        })?;
        let weights: Vec<f32> = (&mut rng).sample_iter(normal).take(len).collect();
        let biases = vec![0.0; vocabulary_size];

        let kind = config.optimizer;
        let negatives = config.negative_sampling.build(counts)?;

        debug!(
            vocabulary_size,
            dim,
            optimizer = ?kind,
            negatives = ?config.negative_sampling,
            "initialized trainer"
        );

        Ok(Self {
            vocabulary_size,
            dim,
            embeddings,
            weights,
            biases,
            optimizer: Optimizer::new(kind, config.learning_rate),
            embedding_slots: Slots::new(&kind, len),
            weight_slots: Slots::new(&kind, len),
            bias_slots: Slots::new(&kind, vocabulary_size),
            negatives,
            num_sampled: config.num_sampled,
            rng,
            anomaly_policy: config.anomaly_policy,
            report_interval: config.report_interval,
            steps: 0,
            anomalies: 0,
            interval_loss: 0.0,
            interval_applied: 0,
        })
    }

    /// Runs one training step on `batch`.
    ///
    /// Draws `num_sampled` negatives per example, computes the mean loss and
    /// its gradients, and updates only the rows the batch touched.
    ///
    /// # Returns
    ///
    /// A [`StepReport`] with the batch loss, and the interval mean on every
    /// `report_interval`-th step.
    ///
    /// # Errors
    ///
    /// - [`TrainError::EmptyBatch`], [`TrainError::BatchShape`] or
    ///   [`TrainError::IdOutOfRange`] for malformed batches (nothing changes).
    /// - [`TrainError::NumericalAnomaly`] for a non-finite loss or gradient
    ///   under [`AnomalyPolicy::Abort`]. Parameters keep their previous values.
    pub fn step(&mut self, batch: &Batch) -> Result<StepReport, TrainError> {
        self.check_batch(batch)?;
        let step = self.steps;
        let k = self.num_sampled;

        let mut negatives = vec![UNKNOWN_ID; batch.len() * k];
        self.negatives.sample_into(&mut self.rng, &mut negatives);

        let scale = 1.0 / batch.len() as f32;
        let examples: Vec<ExampleGrad> = batch
            .inputs
            .par_iter()
            .zip(&batch.labels)
            .zip(negatives.par_chunks(k))
            .map(|((&input, &label), negs)| self.example_grad(input, label, negs, scale))
            .collect();

        let loss = (examples.iter().map(|ex| f64::from(ex.loss)).sum::<f64>()
            / batch.len() as f64) as f32;
        if !loss.is_finite() {
            return self.reject(step, loss, "loss");
        }

        let grad = self.aggregate(batch, &negatives, &examples);
        if let Some(what) = grad.non_finite() {
            return self.reject(step, loss, what);
        }

        self.apply(&grad);
        let expected_hits = k as f64
            * batch
                .labels
                .iter()
                .map(|&label| self.negatives.probability(label))
                .sum::<f64>()
            / batch.len() as f64;
        debug!(
            step,
            loss,
            rows = grad.embeddings.len(),
            expected_hits,
            "applied step"
        );
        Ok(self.finish_step(step, loss, true))
    }

    /// Current embedding matrix, row-major V x D.
    pub fn embeddings(&self) -> &[f32] {
        &self.embeddings
    }

    /// Embedding row for `id`.
    pub fn embedding(&self, id: WordId) -> Option<&[f32]> {
        (id < self.vocabulary_size).then(|| &self.embeddings[id * self.dim..(id + 1) * self.dim])
    }

    /// Output weight matrix W, row-major V x D.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Output biases b.
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    /// Score `E[input] . W[label] + b[label]` of a pair, the logit the loss
    /// pushes up for observed pairs and down for negatives.
    ///
    /// # Returns
    ///
    /// `None` if either id is outside the vocabulary.
    pub fn score(&self, input: WordId, label: WordId) -> Option<f32> {
        if input >= self.vocabulary_size || label >= self.vocabulary_size {
            return None;
        }
        let e = self.row(&self.embeddings, input);
        let w = self.row(&self.weights, label);
        Some(dot(e, w) + self.biases[label])
    }

    /// Returns a copy of E with every row scaled to unit L2 norm.
    ///
    /// All-zero rows stay zero. The copy is detached from training.
    pub fn normalized_embeddings(&self) -> Vec<f32> {
        let mut normalized = self.embeddings.clone();
        normalized.par_chunks_mut(self.dim).for_each(|row| {
            let norm = dot(row, row).sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|x| *x /= norm);
            }
        });
        normalized
    }

    /// Embedding dimension D.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows V in every parameter matrix.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    /// Completed steps, including skipped ones.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Steps discarded as numerical anomalies.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    fn check_batch(&self, batch: &Batch) -> Result<(), TrainError> {
        if batch.inputs.len() != batch.labels.len() {
            return Err(TrainError::BatchShape {
                inputs: batch.inputs.len(),
                labels: batch.labels.len(),
            });
        }
        if batch.is_empty() {
            return Err(TrainError::EmptyBatch);
        }
        let out_of_range = batch
            .inputs
            .iter()
            .chain(&batch.labels)
            .find(|&&id| id >= self.vocabulary_size);
        match out_of_range {
            Some(&id) => Err(TrainError::IdOutOfRange {
                id,
                vocabulary_size: self.vocabulary_size,
            }),
            None => Ok(()),
        }
    }

    fn row<'a>(&self, matrix: &'a [f32], id: WordId) -> &'a [f32] {
        &matrix[id * self.dim..(id + 1) * self.dim]
    }

    /// Loss and gradients of one `(input, label)` example against `negs`.
    fn example_grad(
        &self,
        input: WordId,
        label: WordId,
        negs: &[WordId],
        scale: f32,
    ) -> ExampleGrad {
        let e = self.row(&self.embeddings, input);
        let mut input_grad = vec![0.0; self.dim];
        let mut score_grads = Vec::with_capacity(1 + negs.len());
        let mut loss = 0.0;

        let targets = iter::once((label, true)).chain(negs.iter().map(|&n| (n, false)));
        for (target, positive) in targets {
            let w = self.row(&self.weights, target);
            let score = dot(e, w) + self.biases[target];
            let (term, d_score) = if positive {
                (softplus(-score), sigmoid(score) - 1.0)
            } else {
                (softplus(score), sigmoid(score))
            };
            loss += term;

            let g = d_score * scale;
            for (acc, &wj) in input_grad.iter_mut().zip(w) {
                *acc += g * wj;
            }
            score_grads.push(g);
        }

        ExampleGrad {
            loss,
            input_grad,
            score_grads,
        }
    }

    /// Sums example gradients per row, in batch order.
    fn aggregate(
        &self,
        batch: &Batch,
        negatives: &[WordId],
        examples: &[ExampleGrad],
    ) -> BatchGrad {
        let mut grad = BatchGrad::default();
        let k = self.num_sampled;

        for (i, ex) in examples.iter().enumerate() {
            let input = batch.inputs[i];
            let acc = grad
                .embeddings
                .entry(input)
                .or_insert_with(|| vec![0.0; self.dim]);
            add_assign(acc, &ex.input_grad, 1.0);

            let e = self.row(&self.embeddings, input);
            let negs = &negatives[i * k..(i + 1) * k];
            let targets = iter::once(batch.labels[i]).chain(negs.iter().copied());
            for (target, &g) in targets.zip(&ex.score_grads) {
                let acc = grad
                    .weights
                    .entry(target)
                    .or_insert_with(|| vec![0.0; self.dim]);
                add_assign(acc, e, g);
                *grad.biases.entry(target).or_insert(0.0) += g;
            }
        }
        grad
    }

    fn apply(&mut self, grad: &BatchGrad) {
        let dim = self.dim;
        self.optimizer.begin_step();
        for (&id, g) in &grad.embeddings {
            self.optimizer
                .apply(&mut self.embeddings, &mut self.embedding_slots, id * dim, g);
        }
        for (&id, g) in &grad.weights {
            self.optimizer
                .apply(&mut self.weights, &mut self.weight_slots, id * dim, g);
        }
        for (&id, &g) in &grad.biases {
            self.optimizer
                .apply(&mut self.biases, &mut self.bias_slots, id, &[g]);
        }
    }

    /// Handles a non-finite step according to the anomaly policy.
    fn reject(
        &mut self,
        step: u64,
        loss: f32,
        what: &'static str,
    ) -> Result<StepReport, TrainError> {
        match self.anomaly_policy {
            AnomalyPolicy::Abort => Err(TrainError::NumericalAnomaly { step, what }),
            AnomalyPolicy::Skip => {
                self.anomalies += 1;
                warn!(step, what, anomalies = self.anomalies, "skipping non-finite step");
                Ok(self.finish_step(step, loss, false))
            }
        }
    }

    /// Advances the step counter and closes the report interval when due.
    fn finish_step(&mut self, step: u64, loss: f32, applied: bool) -> StepReport {
        self.steps += 1;
        if applied {
            self.interval_loss += f64::from(loss);
            self.interval_applied += 1;
        }

        let mut interval_loss = None;
        if self.steps % self.report_interval == 0 {
            if self.interval_applied > 0 {
                let mean = (self.interval_loss / self.interval_applied as f64) as f32;
                info!(
                    step,
                    average_loss = mean,
                    "average loss over last {} steps",
                    self.report_interval
                );
                interval_loss = Some(mean);
            }
            self.interval_loss = 0.0;
            self.interval_applied = 0;
        }

        StepReport {
            step,
            loss,
            interval_loss,
            applied,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `acc += scale * x`, elementwise.
fn add_assign(acc: &mut [f32], x: &[f32], scale: f32) {
    for (a, &v) in acc.iter_mut().zip(x) {
        *a += scale * v;
    }
}

/// `ln(1 + e^x)` without overflow for large `|x|`.
fn softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
