//! Adam with bias-corrected moment estimates.

use super::{Optimizer, OptimizerParameter, parameter_lengths, update_parameters};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    /// Step size.
    pub alpha: Real,
    /// Decay of the first moment.
    pub beta1: Real,
    /// Decay of the second moment.
    pub beta2: Real,
    /// Denominator offset.
    pub eps: Real,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            alpha: Real::from_f64(0.001),
            beta1: Real::from_f64(0.9),
            beta2: Real::from_f64(0.999),
            eps: Real::from_f64(1e-8),
        }
    }
}

/// Adam optimizer.
///
/// ```text
/// m += (1 - beta1) (g - m)
/// v += (1 - beta2) (g² - v)
/// lr = alpha * sqrt(1 - beta2^t) / (1 - beta1^t)
/// value -= lr * m / (sqrt(v) + eps)
/// ```
#[derive(Debug, Clone, Default)]
pub struct Adam {
    config: AdamConfig,
    parameters: Vec<AdamParameter>,
    update_count: u64,
}

impl Adam {
    /// Create with the given hyperparameters.
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            parameters: Vec::new(),
            update_count: 0,
        }
    }

    /// Create with step size `alpha` and default moments.
    pub fn with_alpha(alpha: Real) -> Self {
        Self::new(AdamConfig {
            alpha,
            ..AdamConfig::default()
        })
    }

    /// Hyperparameters.
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    /// Attached adapters.
    pub fn parameters(&self) -> &[AdamParameter] {
        &self.parameters
    }
}

/// Adapter for [`Adam`] holding both moment estimates of one parameter.
#[derive(Debug, Clone)]
pub struct AdamParameter {
    parameter: NodeId,
    config: AdamConfig,
    m: Vec<Real>,
    v: Vec<Real>,
}

impl AdamParameter {
    /// First moment estimate.
    pub fn first_moment(&self) -> &[Real] {
        &self.m
    }

    /// Second moment estimate.
    pub fn second_moment(&self) -> &[Real] {
        &self.v
    }
}

fn bias_correction(beta: Real, step: u64) -> Real {
    Real::one() - beta.powi(i32::try_from(step).unwrap_or(i32::MAX))
}

impl OptimizerParameter for AdamParameter {
    fn parameter(&self) -> NodeId {
        self.parameter
    }

    fn update(&mut self, step: u64, data: &mut [Real], grad: &[Real]) {
        let AdamConfig {
            alpha,
            beta1,
            beta2,
            eps,
        } = self.config;
        let lr = alpha * bias_correction(beta2, step).sqrt() / bias_correction(beta1, step);

        for (((x, m), v), &g) in data
            .iter_mut()
            .zip(&mut self.m)
            .zip(&mut self.v)
            .zip(grad)
        {
            *m += (Real::one() - beta1) * (g - *m);
            *v += (Real::one() - beta2) * (g * g - *v);
            *x -= lr * *m / (v.sqrt() + eps);
        }
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &str {
        "Adam"
    }

    fn attach(
        &mut self,
        graph: &ComputationGraph,
        parameters: &[NodeId],
    ) -> Result<(), TensorError> {
        let lengths = parameter_lengths(graph, parameters)?;
        for (&parameter, len) in parameters.iter().zip(lengths) {
            self.parameters.push(AdamParameter {
                parameter,
                config: self.config,
                m: vec![Real::zero(); len],
                v: vec![Real::zero(); len],
            });
        }
        Ok(())
    }

    fn update(&mut self, graph: &mut ComputationGraph) -> Result<bool, TensorError> {
        let step = self.update_count + 1;
        let updated = update_parameters("Adam", graph, &mut self.parameters, step)?;
        if updated {
            self.update_count = step;
        }
        Ok(updated)
    }

    fn update_count(&self) -> u64 {
        self.update_count
    }

    fn learning_rate(&self) -> Real {
        self.config.alpha
    }

    fn set_learning_rate(&mut self, lr: Real) {
        self.config.alpha = lr;
        for p in &mut self.parameters {
            p.config.alpha = lr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdArray;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_step_moves_by_alpha() {
        // With bias correction the first step is alpha * sign(g) up to eps.
        let mut graph = ComputationGraph::new();
        let p = graph.parameter(NdArray::from_vec(vec![1.0, 1.0], &[2]).unwrap());
        let array = graph.array_mut(p).unwrap();
        array.set_grad(&[3.0, -0.5]).unwrap();
        array.count_up();

        let mut adam = Adam::with_alpha(0.01);
        adam.attach(&graph, &[p]).unwrap();
        adam.update(&mut graph).unwrap();
        let data = graph.data(p).unwrap();
        assert_relative_eq!(data[0], 0.99, epsilon = 1e-6);
        assert_relative_eq!(data[1], 1.01, epsilon = 1e-6);

        let state = &adam.parameters()[0];
        assert_relative_eq!(state.first_moment()[0], 0.3, epsilon = 1e-12);
        assert_relative_eq!(state.second_moment()[0], 0.009, epsilon = 1e-12);
    }

    #[test]
    fn test_default_config() {
        let adam = Adam::default();
        assert_eq!(adam.config(), &AdamConfig::default());
        assert_relative_eq!(adam.learning_rate(), 0.001);
    }

    #[test]
    fn test_bias_correction() {
        assert_relative_eq!(bias_correction(0.9, 1), 0.1, epsilon = 1e-12);
        assert_relative_eq!(bias_correction(0.9, 2), 0.19, epsilon = 1e-12);
    }
}
