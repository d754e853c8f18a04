//! Elementwise arithmetic stages.
//!
//! Two-input stages require equal shapes and batch counts. The `*Const`
//! stages combine one input with a fixed scalar; `Const*` puts the scalar on
//! the left-hand side.

use super::{Function, GradFn, binary_forward, forward_one, unary_backward, unary_forward};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::Real;

/// `a + b`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl Function for Add {
    fn name(&self) -> &str {
        "Add"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        binary_forward(graph, "Add", Box::new(*self), inputs, |a, b| a + b)
    }
}

impl GradFn for Add {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let gy = graph.grad(outputs[0])?;
        Ok(vec![(inputs[0], gy.to_vec()), (inputs[1], gy.to_vec())])
    }
}

/// `a - b`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sub;

impl Function for Sub {
    fn name(&self) -> &str {
        "Sub"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        binary_forward(graph, "Sub", Box::new(*self), inputs, |a, b| a - b)
    }
}

impl GradFn for Sub {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let gy = graph.grad(outputs[0])?;
        Ok(vec![
            (inputs[0], gy.to_vec()),
            (inputs[1], gy.iter().map(|&g| -g).collect()),
        ])
    }
}

/// `a * b`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl Function for Mul {
    fn name(&self) -> &str {
        "Mul"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        binary_forward(graph, "Mul", Box::new(*self), inputs, |a, b| a * b)
    }
}

impl GradFn for Mul {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let gy = graph.grad(outputs[0])?;
        let (a, b) = (graph.data(inputs[0])?, graph.data(inputs[1])?);
        let ga = gy.iter().zip(b).map(|(&g, &b)| g * b).collect();
        let gb = gy.iter().zip(a).map(|(&g, &a)| g * a).collect();
        Ok(vec![(inputs[0], ga), (inputs[1], gb)])
    }
}

/// `a / b`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Div;

impl Function for Div {
    fn name(&self) -> &str {
        "Div"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        binary_forward(graph, "Div", Box::new(*self), inputs, |a, b| a / b)
    }
}

impl GradFn for Div {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let gy = graph.grad(outputs[0])?;
        let (a, b) = (graph.data(inputs[0])?, graph.data(inputs[1])?);
        let ga = gy.iter().zip(b).map(|(&g, &b)| g / b).collect();
        let gb = gy
            .iter()
            .zip(a.iter().zip(b))
            .map(|(&g, (&a, &b))| -g * a / (b * b))
            .collect();
        Ok(vec![(inputs[0], ga), (inputs[1], gb)])
    }
}

/// `x + value`.
#[derive(Debug, Clone, Copy)]
pub struct AddConst {
    /// Added to every element.
    pub value: Real,
}

impl Function for AddConst {
    fn name(&self) -> &str {
        "AddConst"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let c = self.value;
        unary_forward(graph, "AddConst", Box::new(*self), inputs, |x| x + c)
    }
}

impl GradFn for AddConst {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, _| 1.0)
    }
}

/// `x - value`.
#[derive(Debug, Clone, Copy)]
pub struct SubConst {
    /// Subtracted from every element.
    pub value: Real,
}

impl Function for SubConst {
    fn name(&self) -> &str {
        "SubConst"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let c = self.value;
        unary_forward(graph, "SubConst", Box::new(*self), inputs, |x| x - c)
    }
}

impl GradFn for SubConst {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, _| 1.0)
    }
}

/// `value - x`.
#[derive(Debug, Clone, Copy)]
pub struct ConstSub {
    /// Left-hand operand of the subtraction.
    pub value: Real,
}

impl Function for ConstSub {
    fn name(&self) -> &str {
        "ConstSub"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let c = self.value;
        unary_forward(graph, "ConstSub", Box::new(*self), inputs, |x| c - x)
    }
}

impl GradFn for ConstSub {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, _| -1.0)
    }
}

/// `x * value`.
#[derive(Debug, Clone, Copy)]
pub struct MulConst {
    /// Factor applied to every element.
    pub value: Real,
}

impl Function for MulConst {
    fn name(&self) -> &str {
        "MulConst"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let c = self.value;
        unary_forward(graph, "MulConst", Box::new(*self), inputs, |x| x * c)
    }
}

impl GradFn for MulConst {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let c = self.value;
        unary_backward(graph, inputs, outputs, |_, _| c)
    }
}

/// `x / value`.
#[derive(Debug, Clone, Copy)]
pub struct DivConst {
    /// Divisor of every element.
    pub value: Real,
}

impl Function for DivConst {
    fn name(&self) -> &str {
        "DivConst"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let c = self.value;
        unary_forward(graph, "DivConst", Box::new(*self), inputs, |x| x / c)
    }
}

impl GradFn for DivConst {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let c = self.value;
        unary_backward(graph, inputs, outputs, |_, _| 1.0 / c)
    }
}

/// `value / x`.
#[derive(Debug, Clone, Copy)]
pub struct ConstDiv {
    /// Numerator of the division.
    pub value: Real,
}

impl Function for ConstDiv {
    fn name(&self) -> &str {
        "ConstDiv"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let c = self.value;
        unary_forward(graph, "ConstDiv", Box::new(*self), inputs, |x| c / x)
    }
}

impl GradFn for ConstDiv {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let c = self.value;
        unary_backward(graph, inputs, outputs, |x, _| -c / (x * x))
    }
}

/// `-x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neg;

impl Function for Neg {
    fn name(&self) -> &str {
        "Neg"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        unary_forward(graph, "Neg", Box::new(*self), inputs, |x| -x)
    }
}

impl GradFn for Neg {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        unary_backward(graph, inputs, outputs, |_, _| -1.0)
    }
}

/// Record `a + b` and return the output node.
///
/// # Errors
///
/// `ShapeMismatch` / `BatchMismatch` for incompatible operands, plus lookup
/// errors.
pub fn add(graph: &mut ComputationGraph, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
    forward_one(&mut Add, graph, &[a, b])
}

/// Record `a - b` and return the output node.
///
/// # Errors
///
/// Same as [`add`].
pub fn sub(graph: &mut ComputationGraph, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
    forward_one(&mut Sub, graph, &[a, b])
}

/// Record `a * b` and return the output node.
///
/// # Errors
///
/// Same as [`add`].
pub fn mul(graph: &mut ComputationGraph, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
    forward_one(&mut Mul, graph, &[a, b])
}

/// Record `a / b` and return the output node.
///
/// # Errors
///
/// Same as [`add`].
pub fn div(graph: &mut ComputationGraph, a: NodeId, b: NodeId) -> Result<NodeId, TensorError> {
    forward_one(&mut Div, graph, &[a, b])
}

/// Record `-x` and return the output node.
///
/// # Errors
///
/// Lookup errors.
pub fn neg(graph: &mut ComputationGraph, x: NodeId) -> Result<NodeId, TensorError> {
    forward_one(&mut Neg, graph, &[x])
}
