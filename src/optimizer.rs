//! Row-sparse parameter updates.
//!
//! A training step only touches the embedding rows of its inputs and the
//! weight rows of its labels and negatives, so optimizer state is kept per
//! parameter element but only the touched rows are read and written
//! ("lazy" updates). Adam uses the global step count for its bias
//! correction.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-8
}

fn default_initial_accumulator() -> f32 {
    0.1
}

/// Update rule, as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OptimizerKind {
    /// Plain gradient descent: `p -= lr * g`.
    Sgd,
    /// Per-element learning rates scaled by accumulated squared gradients.
    Adagrad {
        #[serde(default = "default_initial_accumulator")]
        initial_accumulator: f32,
    },
    /// Adaptive moment estimation.
    Adam {
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Adam {
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

impl OptimizerKind {
    /// Checks hyper-parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for betas outside `[0, 1)` or a
    /// non-positive epsilon / initial accumulator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Sgd => Ok(()),
            Self::Adagrad {
                initial_accumulator,
            } => {
                if initial_accumulator.is_finite() && initial_accumulator > 0.0 {
                    Ok(())
                } else {
                    Err(ConfigError::Invalid {
                        name: "optimizer.initial_accumulator",
                        reason: format!("must be positive, got {initial_accumulator}"),
                    })
                }
            }
            Self::Adam {
                beta1,
                beta2,
                epsilon,
            } => {
                for (name, beta) in [("optimizer.beta1", beta1), ("optimizer.beta2", beta2)] {
                    if !(0.0..1.0).contains(&beta) {
                        return Err(ConfigError::Invalid {
                            name,
                            reason: format!("must lie in [0, 1), got {beta}"),
                        });
                    }
                }
                if epsilon.is_finite() && epsilon > 0.0 {
                    Ok(())
                } else {
                    Err(ConfigError::Invalid {
                        name: "optimizer.epsilon",
                        reason: format!("must be positive, got {epsilon}"),
                    })
                }
            }
        }
    }
}

/// Optimizer state for one parameter tensor.
///
/// Slot vectors mirror the parameter layout (row-major); SGD keeps none.
#[derive(Debug, Clone, Default)]
pub(crate) struct Slots {
    /// Adam first moment, or Adagrad accumulator.
    first: Vec<f32>,
    /// Adam second moment.
    second: Vec<f32>,
}

impl Slots {
    /// Allocates state for a tensor of `len` elements.
    pub(crate) fn new(kind: &OptimizerKind, len: usize) -> Self {
        match *kind {
            OptimizerKind::Sgd => Self::default(),
            OptimizerKind::Adagrad {
                initial_accumulator,
            } => Self {
                first: vec![initial_accumulator; len],
                second: Vec::new(),
            },
            OptimizerKind::Adam { .. } => Self {
                first: vec![0.0; len],
                second: vec![0.0; len],
            },
        }
    }
}

/// Applies gradient updates to slices of a parameter tensor.
#[derive(Debug, Clone)]
pub(crate) struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f32,

    /// Number of completed [`Optimizer::begin_step`] calls.
    t: u64,

    /// Adam step size with bias correction folded in, refreshed each step.
    adam_lr: f32,
}

impl Optimizer {
    pub(crate) fn new(kind: OptimizerKind, learning_rate: f32) -> Self {
        Self {
            kind,
            learning_rate,
            t: 0,
            adam_lr: learning_rate,
        }
    }

    /// Advances the step counter. Call once per training step, before any
    /// [`Optimizer::apply`] of that step.
    pub(crate) fn begin_step(&mut self) {
        self.t += 1;
        if let OptimizerKind::Adam { beta1, beta2, .. } = self.kind {
            let t = self.t.min(i32::MAX as u64) as i32;
            let correction1 = 1.0 - beta1.powi(t);
            let correction2 = 1.0 - beta2.powi(t);
            self.adam_lr = self.learning_rate * correction2.sqrt() / correction1;
        }
    }

    /// Updates `params[offset..offset + grad.len()]` with `grad`.
    ///
    /// # Arguments
    ///
    /// * `params` - Whole parameter tensor.
    /// * `slots` - Optimizer state for the same tensor.
    /// * `offset` - Start of the touched region (a row start for matrices).
    /// * `grad` - Gradient for the touched region.
    pub(crate) fn apply(&self, params: &mut [f32], slots: &mut Slots, offset: usize, grad: &[f32]) {
        let end = offset + grad.len();
        let params = &mut params[offset..end];

        match self.kind {
            OptimizerKind::Sgd => {
                for (p, g) in params.iter_mut().zip(grad) {
                    *p -= self.learning_rate * g;
                }
            }
            OptimizerKind::Adagrad { .. } => {
                let acc = &mut slots.first[offset..end];
                for ((p, a), g) in params.iter_mut().zip(acc).zip(grad) {
                    *a += g * g;
                    *p -= self.learning_rate * g / a.sqrt();
                }
            }
            OptimizerKind::Adam {
                beta1,
                beta2,
                epsilon,
            } => {
                let m = &mut slots.first[offset..end];
                let v = &mut slots.second[offset..end];
                for (((p, m), v), g) in params.iter_mut().zip(m).zip(v).zip(grad) {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= self.adam_lr * *m / (v.sqrt() + epsilon);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adam() -> OptimizerKind {
        OptimizerKind::default()
    }

    #[test]
    fn test_sgd_step() {
        let kind = OptimizerKind::Sgd;
        let mut opt = Optimizer::new(kind, 0.5);
        let mut params = vec![1.0, 2.0, 3.0, 4.0];
        let mut slots = Slots::new(&kind, params.len());
        opt.begin_step();
        opt.apply(&mut params, &mut slots, 2, &[2.0, -2.0]);
        assert_eq!(params, vec![1.0, 2.0, 2.0, 5.0]);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        // With bias correction the first Adam step is lr * sign(g).
        let kind = adam();
        let mut opt = Optimizer::new(kind, 0.1);
        let mut params = vec![0.0, 0.0];
        let mut slots = Slots::new(&kind, params.len());
        opt.begin_step();
        opt.apply(&mut params, &mut slots, 0, &[3.0, -0.01]);
        assert!((params[0] + 0.1).abs() < 1e-4, "got {}", params[0]);
        assert!((params[1] - 0.1).abs() < 1e-3, "got {}", params[1]);
    }

    #[test]
    fn test_untouched_rows_keep_state() {
        let kind = adam();
        let mut opt = Optimizer::new(kind, 0.1);
        let mut params = vec![1.0; 4];
        let mut slots = Slots::new(&kind, params.len());
        for _ in 0..3 {
            opt.begin_step();
            opt.apply(&mut params, &mut slots, 0, &[1.0, 1.0]);
        }
        assert_eq!(&params[2..], &[1.0, 1.0]);
        assert_eq!(&slots.first[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_adagrad_shrinks_steps() {
        let kind = OptimizerKind::Adagrad {
            initial_accumulator: 0.1,
        };
        let mut opt = Optimizer::new(kind, 1.0);
        let mut params = vec![0.0];
        let mut slots = Slots::new(&kind, 1);
        opt.begin_step();
        opt.apply(&mut params, &mut slots, 0, &[1.0]);
        let first = -params[0];
        opt.begin_step();
        opt.apply(&mut params, &mut slots, 0, &[1.0]);
        let second = -params[0] - first;
        assert!(second < first);
    }

    #[test]
    fn test_validate_rejects_bad_betas() {
        let kind = OptimizerKind::Adam {
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-8,
        };
        assert!(matches!(kind.validate(), Err(ConfigError::Invalid { .. })));
        assert_eq!(adam().validate(), Ok(()));
    }
}
