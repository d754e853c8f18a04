//! Plain stochastic gradient descent.

use super::{Optimizer, OptimizerParameter, parameter_lengths, update_parameters};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};

/// `value -= lr * grad`.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: Real,
    parameters: Vec<SgdParameter>,
    update_count: u64,
}

impl Sgd {
    /// Create with learning rate `lr`.
    pub fn new(lr: Real) -> Self {
        Self {
            lr,
            parameters: Vec::new(),
            update_count: 0,
        }
    }

    /// Attached adapters.
    pub fn parameters(&self) -> &[SgdParameter] {
        &self.parameters
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(Real::from_f64(0.1))
    }
}

/// Adapter for [`Sgd`]; stateless apart from the learning rate.
#[derive(Debug, Clone)]
pub struct SgdParameter {
    parameter: NodeId,
    lr: Real,
}

impl OptimizerParameter for SgdParameter {
    fn parameter(&self) -> NodeId {
        self.parameter
    }

    fn update(&mut self, _step: u64, data: &mut [Real], grad: &[Real]) {
        for (x, &g) in data.iter_mut().zip(grad) {
            *x -= self.lr * g;
        }
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &str {
        "SGD"
    }

    fn attach(
        &mut self,
        graph: &ComputationGraph,
        parameters: &[NodeId],
    ) -> Result<(), TensorError> {
        parameter_lengths(graph, parameters)?;
        self.parameters.extend(parameters.iter().map(|&parameter| SgdParameter {
            parameter,
            lr: self.lr,
        }));
        Ok(())
    }

    fn update(&mut self, graph: &mut ComputationGraph) -> Result<bool, TensorError> {
        let step = self.update_count + 1;
        let updated = update_parameters("SGD", graph, &mut self.parameters, step)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdArray;
    use approx::assert_relative_eq;

    #[test]
    fn test_sgd_step() {
        let mut graph = ComputationGraph::new();
        let p = graph.parameter(NdArray::from_vec(vec![1.0, -1.0], &[2]).unwrap());
        let array = graph.array_mut(p).unwrap();
        array.set_grad(&[0.5, -2.0]).unwrap();
        array.count_up();

        let mut sgd = Sgd::new(0.1);
        sgd.attach(&graph, &[p]).unwrap();
        sgd.update(&mut graph).unwrap();
        let data = graph.data(p).unwrap();
        assert_relative_eq!(data[0], 0.95, epsilon = 1e-12);
        assert_relative_eq!(data[1], -0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_learning_rate_reaches_adapters() {
        let mut graph = ComputationGraph::new();
        let p = graph.parameter(NdArray::from_vec(vec![0.0], &[1]).unwrap());
        let mut sgd = Sgd::default();
        sgd.attach(&graph, &[p]).unwrap();
        sgd.set_learning_rate(2.0);
        assert_eq!(sgd.learning_rate(), 2.0);

        let array = graph.array_mut(p).unwrap();
        array.set_grad(&[1.0]).unwrap();
        array.count_up();
        sgd.update(&mut graph).unwrap();
        assert_eq!(graph.data(p).unwrap(), &[-2.0]);
        assert_eq!(sgd.parameters().len(), 1);
    }
}
