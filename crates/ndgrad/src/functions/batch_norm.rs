//! Batch normalization.
//!
//! Axis 0 of the input shape is the channel axis. Statistics of a channel are
//! taken over every batch slot and every trailing position, so a `[C]` input
//! normalizes across the batch and a `[C, H, W]` input across batch and space.

use super::{Function, GradFn, expect_inputs};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};
use crate::tensor::NdArray;

/// Default weight of the old running statistics in each update.
pub const DEFAULT_DECAY: Real = 0.9;

/// Default variance offset.
pub const DEFAULT_EPS: Real = 1e-5;

/// Batch normalization with trainable scale (`gamma`) and shift (`beta`).
///
/// In training mode the stage normalizes with the statistics of the current
/// batch and folds them into running averages. In inference mode it uses the
/// running averages.
#[derive(Debug, Clone)]
pub struct BatchNormalization {
    name: String,
    channels: usize,
    gamma: NodeId,
    beta: NodeId,
    running_mean: Vec<Real>,
    running_var: Vec<Real>,
    decay: Real,
    eps: Real,
    training: bool,
}

/// Backward state of one invocation.
#[derive(Debug, Clone)]
struct BatchNormGrad {
    gamma: NodeId,
    beta: NodeId,
    channels: usize,
    mean: Vec<Real>,
    std: Vec<Real>,
    // Batch statistics feed back into the input gradient only in training mode.
    batch_stats: bool,
}

impl BatchNormalization {
    /// Create a layer for `channels` channels in training mode.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `channels` is zero.
    pub fn new(graph: &mut ComputationGraph, channels: usize) -> Result<Self, TensorError> {
        if channels == 0 {
            return Err(TensorError::InvalidArgument(
                "BatchNormalization needs at least one channel".to_string(),
            ));
        }
        let gamma = graph.parameter(NdArray::from_fn(&[channels], 1, |_| Real::one()));
        let beta = graph.parameter(NdArray::zeros(&[channels], 1));
        Ok(Self {
            name: "BatchNormalization".to_string(),
            channels,
            gamma,
            beta,
            running_mean: vec![Real::zero(); channels],
            running_var: vec![Real::one(); channels],
            decay: DEFAULT_DECAY,
            eps: DEFAULT_EPS,
            training: true,
        })
    }

    /// Override the running-average decay.
    pub fn with_decay(mut self, decay: Real) -> Self {
        self.decay = decay;
        self
    }

    /// Override the variance offset.
    pub fn with_eps(mut self, eps: Real) -> Self {
        self.eps = eps;
        self
    }

    /// Rename the layer.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Scale parameter node.
    pub fn gamma(&self) -> NodeId {
        self.gamma
    }

    /// Shift parameter node.
    pub fn beta(&self) -> NodeId {
        self.beta
    }

    /// Running mean per channel.
    pub fn running_mean(&self) -> &[Real] {
        &self.running_mean
    }

    /// Running (unbiased) variance per channel.
    pub fn running_var(&self) -> &[Real] {
        &self.running_var
    }

    /// Whether batch statistics are used.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Per-channel mean and biased variance of `x`.
    fn batch_statistics(&self, x: &NdArray, inner: usize) -> (Vec<Real>, Vec<Real>) {
        let m = Real::from_usize(x.batch_count() * inner);
        let mut mean = vec![Real::zero(); self.channels];
        let mut var = vec![Real::zero(); self.channels];
        for batch in 0..x.batch_count() {
            for (i, &v) in x.batch_data(batch).iter().enumerate() {
                mean[i / inner] += v;
            }
        }
        for mu in &mut mean {
            *mu /= m;
        }
        for batch in 0..x.batch_count() {
            for (i, &v) in x.batch_data(batch).iter().enumerate() {
                let d = v - mean[i / inner];
                var[i / inner] += d * d;
            }
        }
        for s in &mut var {
            *s /= m;
        }
        (mean, var)
    }
}

impl Function for BatchNormalization {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let [x] = expect_inputs::<1>(&self.name, inputs)?;
        let xa = graph.array(x)?;
        if xa.shape().first() != Some(&self.channels) {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.channels],
                actual: xa.shape().to_vec(),
            });
        }
        let inner = xa.len() / self.channels;

        let (mean, std) = if self.training {
            let (mean, var) = self.batch_statistics(xa, inner);
            let m = xa.batch_count() * inner;
            let correction = if m > 1 {
                Real::from_usize(m) / Real::from_usize(m - 1)
            } else {
                Real::one()
            };
            for c in 0..self.channels {
                self.running_mean[c] = self.decay * self.running_mean[c] + (1.0 - self.decay) * mean[c];
                self.running_var[c] =
                    self.decay * self.running_var[c] + (1.0 - self.decay) * var[c] * correction;
            }
            let std: Vec<Real> = var.iter().map(|&v| (v + self.eps).sqrt()).collect();
            (mean, std)
        } else {
            let std: Vec<Real> = self
                .running_var
                .iter()
                .map(|&v| (v + self.eps).sqrt())
                .collect();
            (self.running_mean.clone(), std)
        };

        let gamma = graph.data(self.gamma)?;
        let beta = graph.data(self.beta)?;
        let mut y = NdArray::zeros_like(xa);
        for (i, (out, &v)) in y.data_mut().iter_mut().zip(xa.data()).enumerate() {
            let c = (i % xa.len()) / inner;
            *out = gamma[c] * (v - mean[c]) / std[c] + beta[c];
        }

        let grad_fn = BatchNormGrad {
            gamma: self.gamma,
            beta: self.beta,
            channels: self.channels,
            mean,
            std,
            batch_stats: self.training,
        };
        let name = self.name.clone();
        graph.apply(name, Box::new(grad_fn), &[x], vec![y])
    }

    fn parameters(&self) -> Vec<NodeId> {
        vec![self.gamma, self.beta]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl GradFn for BatchNormGrad {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let x = graph.array(inputs[0])?;
        let gy = graph.grad(outputs[0])?;
        let gamma = graph.data(self.gamma)?;
        let len = x.len();
        let inner = len / self.channels;
        let channel = |i: usize| (i % len) / inner;
        let xhat = |i: usize, v: Real| {
            let c = channel(i);
            (v - self.mean[c]) / self.std[c]
        };

        let mut ggamma = vec![Real::zero(); self.channels];
        let mut gbeta = vec![Real::zero(); self.channels];
        for (i, (&v, &g)) in x.data().iter().zip(gy).enumerate() {
            let c = channel(i);
            gbeta[c] += g;
            ggamma[c] += g * xhat(i, v);
        }

        let m = Real::from_usize(x.batch_count() * inner);
        let gx = x
            .data()
            .iter()
            .zip(gy)
            .enumerate()
            .map(|(i, (&v, &g))| {
                let c = channel(i);
                let scale = gamma[c] / self.std[c];
                if self.batch_stats {
                    scale * (g - gbeta[c] / m - xhat(i, v) * ggamma[c] / m)
                } else {
                    scale * g
                }
            })
            .collect();

        Ok(vec![
            (inputs[0], gx),
            (self.gamma, ggamma),
            (self.beta, gbeta),
        ])
    }
}
