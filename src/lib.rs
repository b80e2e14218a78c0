//! Word embeddings with skip-gram / CBOW and negative sampling.
//!
//! The crate is organised along the training data flow:
//! 1. [`vocab`] builds a frequency-ranked id space from a token stream.
//! 2. [`sampler`] walks the encoded corpus and emits fixed-size batches.
//! 3. [`trainer`] applies the negative-sampling loss, drawing negatives from
//!    [`negative`] and updating rows through [`optimizer`].
//! 4. [`evaluator`] reports cosine nearest neighbours of validation words.
//!
//! [`pipeline::Word2Vec`] runs all of them from a [`Word2VecConfig`].
//! With the `python` feature the crate also builds a PyO3 extension module.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluator;
pub mod negative;
mod optimizer;
pub mod pipeline;
mod progress;
pub mod sampler;
pub mod trainer;
pub mod types;
pub mod vocab;

pub use config::{AnomalyPolicy, Mode, Word2VecConfig};
pub use error::{Result, Word2VecError};
pub use optimizer::OptimizerKind;
pub use pipeline::{TrainedEmbeddings, TrainingSummary, Word2Vec};
pub use sampler::{Batch, WindowSampler};
pub use trainer::{StepReport, Trainer};
pub use vocab::Vocabulary;

#[cfg(feature = "python")]
mod python {
    use pyo3::{exceptions::PyValueError, prelude::*};

    use crate::{Word2Vec, Word2VecConfig};

    fn to_py_err(err: crate::Word2VecError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }

    /// Python wrapper for a training run.
    #[pyclass(name = "Word2Vec")]
    pub struct PyWord2Vec {
        inner: Word2Vec,
    }

    #[pymethods]
    impl PyWord2Vec {
        /// Builds the vocabulary and model from `tokens`, optionally
        /// configured by a TOML document.
        #[new]
        #[pyo3(signature = (tokens, config_toml = None))]
        fn new(tokens: Vec<String>, config_toml: Option<&str>) -> PyResult<Self> {
            let config = match config_toml {
                Some(text) => toml::from_str::<Word2VecConfig>(text)
                    .map_err(|e| to_py_err(e.into()))?,
                None => Word2VecConfig::default(),
            };
            let inner = Word2Vec::new(config, &tokens).map_err(to_py_err)?;
            Ok(Self { inner })
        }

        /// Runs `num_steps` steps, or the configured count. Returns the last loss.
        #[pyo3(signature = (num_steps = None))]
        fn train(&mut self, py: Python<'_>, num_steps: Option<u64>) -> PyResult<Option<f32>> {
            let steps = num_steps.unwrap_or(self.inner.config().training.num_steps);
            let inner = &mut self.inner;
            let summary = py
                .allow_threads(|| inner.run_steps(steps))
                .map_err(to_py_err)?;
            Ok(summary.last_loss)
        }

        /// Runs a single step and returns its loss.
        fn step(&mut self) -> PyResult<Option<f32>> {
            let summary = self.inner.run_steps(1).map_err(to_py_err)?;
            Ok(summary.last_loss)
        }

        /// The `k` words closest to `word`, or `None` for unknown words.
        fn nearest(&self, word: &str, k: usize) -> Option<Vec<(String, f32)>> {
            self.inner.nearest(word, k)
        }

        /// Normalized embedding rows, one list per id.
        fn embeddings(&self) -> Vec<Vec<f32>> {
            let emb = self.inner.embeddings();
            emb.normalized.chunks(emb.dim).map(<[f32]>::to_vec).collect()
        }

        /// Vocabulary words by id.
        fn words(&self) -> Vec<String> {
            self.inner.vocabulary().words().to_vec()
        }
    }

    #[pymodule]
    fn _wordvec(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyWord2Vec>()?;
        Ok(())
    }
}
