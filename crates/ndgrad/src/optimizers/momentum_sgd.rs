//! SGD with a velocity term.

use super::{Optimizer, OptimizerParameter, parameter_lengths, update_parameters};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};

/// Default learning rate.
const DEFAULT_LR: f64 = 0.01;

/// Default momentum factor.
const DEFAULT_MOMENTUM: f64 = 0.9;

/// `v = v * momentum - lr * grad; value += v`.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::optimizers::{MomentumSgd, Optimizer};
///
/// let mut graph = ComputationGraph::new();
/// let p = graph.parameter(NdArray::from_vec(vec![1.0], &[1]).unwrap());
/// let mut opt = MomentumSgd::new(0.1, 0.9);
/// opt.attach(&graph, &[p]).unwrap();
///
/// let array = graph.array_mut(p).unwrap();
/// array.set_grad(&[2.0]).unwrap();
/// array.count_up();
/// opt.update(&mut graph).unwrap();
/// assert!((graph.data(p).unwrap()[0] - 0.8).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct MomentumSgd {
    lr: Real,
    momentum: Real,
    parameters: Vec<MomentumSgdParameter>,
    update_count: u64,
}

impl MomentumSgd {
    /// Create with learning rate `lr` and momentum factor `momentum`.
    pub fn new(lr: Real, momentum: Real) -> Self {
        Self {
            lr,
            momentum,
            parameters: Vec::new(),
            update_count: 0,
        }
    }

    /// Momentum factor.
    pub fn momentum(&self) -> Real {
        self.momentum
    }

    /// Attached adapters.
    pub fn parameters(&self) -> &[MomentumSgdParameter] {
        &self.parameters
    }
}

impl Default for MomentumSgd {
    fn default() -> Self {
        Self::new(Real::from_f64(DEFAULT_LR), Real::from_f64(DEFAULT_MOMENTUM))
    }
}

/// Adapter for [`MomentumSgd`] holding the velocity of one parameter.
#[derive(Debug, Clone)]
pub struct MomentumSgdParameter {
    parameter: NodeId,
    lr: Real,
    momentum: Real,
    velocity: Vec<Real>,
}

impl MomentumSgdParameter {
    /// Current velocity.
    pub fn velocity(&self) -> &[Real] {
        &self.velocity
    }
}

impl OptimizerParameter for MomentumSgdParameter {
    fn parameter(&self) -> NodeId {
        self.parameter
    }

    fn update(&mut self, _step: u64, data: &mut [Real], grad: &[Real]) {
        for ((x, v), &g) in data.iter_mut().zip(&mut self.velocity).zip(grad) {
            *v *= self.momentum;
            *v -= self.lr * g;
            *x += *v;
        }
    }
}

impl Optimizer for MomentumSgd {
    fn name(&self) -> &str {
        "MomentumSGD"
    }

    fn attach(
        &mut self,
        graph: &ComputationGraph,
        parameters: &[NodeId],
    ) -> Result<(), TensorError> {
        let lengths = parameter_lengths(graph, parameters)?;
        for (&parameter, len) in parameters.iter().zip(lengths) {
            self.parameters.push(MomentumSgdParameter {
                parameter,
                lr: self.lr,
                momentum: self.momentum,
                velocity: vec![Real::zero(); len],
            });
        }
        Ok(())
    }

    fn update(&mut self, graph: &mut ComputationGraph) -> Result<bool, TensorError> {
        let step = self.update_count + 1;
        let updated = update_parameters("MomentumSGD", graph, &mut self.parameters, step)?;
        if updated {
            self.update_count = step;
        }
        Ok(updated)
    }

    fn update_count(&self) -> u64 {
        self.update_count
    }

    fn learning_rate(&self) -> Real {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: Real) {
        self.lr = lr;
        for p in &mut self.parameters {
            p.lr = lr;
        }
    }
}
