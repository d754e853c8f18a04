//! Elementwise transcendental stages.

use super::{Function, GradFn, unary_backward, unary_forward};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::Real;

/// `sin(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sin;

impl Function for Sin {
    fn name(&self) -> &str {
        "Sin"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Sin", Box::new(*self), inputs, Real::sin)
    }
}

impl GradFn for Sin {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |x, _| x.cos())
    }
}

/// `cos(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cos;

impl Function for Cos {
    fn name(&self) -> &str {
        "Cos"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Cos", Box::new(*self), inputs, Real::cos)
    }
}

impl GradFn for Cos {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |x, _| -x.sin())
    }
}

/// `tan(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tan;

impl Function for Tan {
    fn name(&self) -> &str {
        "Tan"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Tan", Box::new(*self), inputs, Real::tan)
    }
}

impl GradFn for Tan {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        // d/dx tan(x) = 1 + tan(x)^2
        unary_backward(graph, inputs, outputs, |_, y| 1.0 + y * y)
    }
}

/// `exp(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl Function for Exp {
    fn name(&self) -> &str {
        "Exp"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Exp", Box::new(*self), inputs, Real::exp)
    }
}

impl GradFn for Exp {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, y| y)
    }
}

/// Natural logarithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Log;

impl Function for Log {
    fn name(&self) -> &str {
        "Log"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Log", Box::new(*self), inputs, Real::ln)
    }
}

impl GradFn for Log {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |x, _| 1.0 / x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::forward_one;
    use crate::functions::testing::check_gradients;
    use crate::tensor::NdArray;
    use approx::assert_relative_eq;

    fn inputs() -> Vec<NdArray> {
        vec![NdArray::new(vec![0.3, -1.2, 0.9, 1.1], &[2], 2).unwrap()]
    }

    #[test]
    fn test_forward_values() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::from_vec(vec![0.5], &[1]).unwrap());
        let s = forward_one(&mut Sin, &mut graph, &[x]).unwrap();
        let e = forward_one(&mut Exp, &mut graph, &[x]).unwrap();
        let l = forward_one(&mut Log, &mut graph, &[x]).unwrap();
        assert_relative_eq!(graph.data(s).unwrap()[0], (0.5 as Real).sin());
        assert_relative_eq!(graph.data(e).unwrap()[0], (0.5 as Real).exp());
        assert_relative_eq!(graph.data(l).unwrap()[0], (0.5 as Real).ln());
    }

    #[test]
    fn test_gradients() {
        check_gradients(|| Box::new(Sin), &inputs(), 1e-6);
        check_gradients(|| Box::new(Cos), &inputs(), 1e-6);
        check_gradients(|| Box::new(Tan), &inputs(), 1e-4);
        check_gradients(|| Box::new(Exp), &inputs(), 1e-6);
    }

    #[test]
    fn test_log_gradient() {
        let positive = vec![NdArray::from_vec(vec![0.5, 1.0, 4.0], &[3]).unwrap()];
        check_gradients(|| Box::new(Log), &positive, 1e-6);
    }
}
