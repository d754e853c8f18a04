//! Activation stages.

use super::{Function, GradFn, unary_backward, unary_forward};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::Real;

/// Rectified linear unit: `max(x, 0)`.
///
/// The gradient at exactly zero is taken as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl Function for ReLU {
    fn name(&self) -> &str {
        "ReLU"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "ReLU", Box::new(*self), inputs, |x| x.max(0.0))
    }
}

impl GradFn for ReLU {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |x, _| if x > 0.0 { 1.0 } else { 0.0 })
    }
}

/// Logistic sigmoid: `1 / (1 + exp(-x))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Function for Sigmoid {
    fn name(&self) -> &str {
        "Sigmoid"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Sigmoid", Box::new(*self), inputs, |x| {
            1.0 / (1.0 + (-x).exp())
        })
    }
}

impl GradFn for Sigmoid {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, y| y * (1.0 - y))
    }
}

/// Hyperbolic tangent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

impl Function for Tanh {
    fn name(&self) -> &str {
        "Tanh"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Tanh", Box::new(*self), inputs, Real::tanh)
    }
}

impl GradFn for Tanh {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, y| 1.0 - y * y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::forward_one;
    use crate::functions::testing::check_gradients;
    use crate::tensor::NdArray;

    #[test]
    fn test_relu_forward_backward() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::from_vec(vec![-1.0, 0.0, 2.0], &[3]).unwrap());
        let y = forward_one(&mut ReLU, &mut graph, &[x]).unwrap();
        assert_eq!(graph.data(y).unwrap(), &[0.0, 0.0, 2.0]);
        graph.backward_with_grad(y, &[5.0, 5.0, 5.0]).unwrap();
        assert_eq!(graph.grad(x).unwrap(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_sigmoid_at_zero() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::scalar(0.0));
        let y = forward_one(&mut Sigmoid, &mut graph, &[x]).unwrap();
        assert_eq!(graph.data(y).unwrap(), &[0.5]);
        graph.backward(y).unwrap();
        assert_eq!(graph.grad(x).unwrap(), &[0.25]);
    }

    #[test]
    fn test_gradients() {
        let x = vec![NdArray::new(vec![-0.7, 0.4, 1.3, -2.1], &[2], 2).unwrap()];
        check_gradients(|| Box::new(ReLU), &x, 1e-6);
        check_gradients(|| Box::new(Sigmoid), &x, 1e-6);
        check_gradients(|| Box::new(Tanh), &x, 1e-6);
    }
}
