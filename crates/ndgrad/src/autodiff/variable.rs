//! `Variable` - node handle on the thread-local graph with operator overloads.

use super::backward::BackwardReport;
use super::graph::{NodeId, clear_graph, with_graph};
use crate::error::TensorError;
use crate::functions::basic_math::{
    Add, AddConst, ConstDiv, ConstSub, Div, DivConst, Mul, MulConst, Neg, Sub, SubConst,
};
use crate::functions::{Function, forward_one};
use crate::scalar::Real;
use crate::tensor::NdArray;
use std::ops;

/// Handle to a node of the thread-local [`ComputationGraph`](super::ComputationGraph).
///
/// Arithmetic between variables (and between a variable and a [`Real`])
/// records the matching stage in the thread-local graph.
///
/// # Panics
///
/// The operators panic if the operands are incompatible or no longer in the
/// graph. Use the stages in [`functions::basic_math`](crate::functions::basic_math)
/// directly to get a `Result` instead.
///
/// # Example
///
/// ```
/// use ndgrad::{NdArray, Variable};
/// use ndgrad::autodiff::clear_graph;
///
/// clear_graph();
/// let x = Variable::new(NdArray::scalar(2.0));
/// let y = x * x + 3.0 * x;
/// y.backward().unwrap();
/// assert_eq!(x.grad().unwrap(), vec![7.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(NodeId);

impl Variable {
    /// Register a leaf in the thread-local graph.
    pub fn new(array: NdArray) -> Self {
        Self(with_graph(|g| g.leaf(array)))
    }

    /// Register a persistent parameter in the thread-local graph.
    pub fn parameter(array: NdArray) -> Self {
        Self(with_graph(|g| g.parameter(array)))
    }

    /// Wrap an existing node id.
    pub fn from_id(id: NodeId) -> Self {
        Self(id)
    }

    /// Node id in the thread-local graph.
    pub fn id(&self) -> NodeId {
        self.0
    }

    /// Copy of the node's values.
    ///
    /// # Errors
    ///
    /// `UnknownNode` / `StaleNode` if the graph no longer holds the node.
    pub fn data(&self) -> Result<Vec<Real>, TensorError> {
        with_graph(|g| g.data(self.0).map(<[Real]>::to_vec))
    }

    /// Copy of the node's gradient.
    ///
    /// # Errors
    ///
    /// Same as [`Variable::data`].
    pub fn grad(&self) -> Result<Vec<Real>, TensorError> {
        with_graph(|g| g.grad(self.0).map(<[Real]>::to_vec))
    }

    /// Copy of the node's array.
    ///
    /// # Errors
    ///
    /// Same as [`Variable::data`].
    pub fn array(&self) -> Result<NdArray, TensorError> {
        with_graph(|g| g.array(self.0).cloned())
    }

    /// Run backward from this node.
    ///
    /// # Errors
    ///
    /// See [`ComputationGraph::backward`](super::ComputationGraph::backward).
    pub fn backward(&self) -> Result<BackwardReport, TensorError> {
        with_graph(|g| g.backward(self.0))
    }

    /// Seed an explicit gradient on this node.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if `grad` does not fit.
    pub fn set_grad(&self, grad: &[Real]) -> Result<(), TensorError> {
        with_graph(|g| g.set_grad(self.0, grad))
    }

    /// Zero the node's gradient.
    ///
    /// # Errors
    ///
    /// Same as [`Variable::data`].
    pub fn clear_grad(&self) -> Result<(), TensorError> {
        with_graph(|g| g.clear_grad(self.0))
    }

    /// Cut the link to the producer.
    ///
    /// # Errors
    ///
    /// Same as [`Variable::data`].
    pub fn unchain(&self) -> Result<(), TensorError> {
        with_graph(|g| g.unchain(self.0))
    }

    /// Run `function` on this variable in the thread-local graph.
    ///
    /// # Errors
    ///
    /// Whatever the stage's forward returns.
    pub fn apply(&self, function: &mut dyn Function) -> Result<Variable, TensorError> {
        with_graph(|g| forward_one(function, g, &[self.0])).map(Variable)
    }

    /// Drop every activation of the thread-local graph.
    pub fn reset_graph() {
        clear_graph();
    }
}

fn record(function: &mut dyn Function, inputs: &[NodeId]) -> Variable {
    let name = function.name().to_string();
    match with_graph(|g| forward_one(function, g, inputs)) {
        Ok(id) => Variable(id),
        Err(e) => panic!("{name} on variables failed: {e}"),
    }
}

impl ops::Add for Variable {
    type Output = Variable;

    fn add(self, rhs: Variable) -> Variable {
        record(&mut Add, &[self.0, rhs.0])
    }
}

impl ops::Sub for Variable {
    type Output = Variable;

    fn sub(self, rhs: Variable) -> Variable {
        record(&mut Sub, &[self.0, rhs.0])
    }
}

impl ops::Mul for Variable {
    type Output = Variable;

    fn mul(self, rhs: Variable) -> Variable {
        record(&mut Mul, &[self.0, rhs.0])
    }
}

impl ops::Div for Variable {
    type Output = Variable;

    fn div(self, rhs: Variable) -> Variable {
        record(&mut Div, &[self.0, rhs.0])
    }
}

impl ops::Neg for Variable {
    type Output = Variable;

    fn neg(self) -> Variable {
        record(&mut Neg, &[self.0])
    }
}

impl ops::Add<Real> for Variable {
    type Output = Variable;

    fn add(self, rhs: Real) -> Variable {
        record(&mut AddConst { value: rhs }, &[self.0])
    }
}

impl ops::Sub<Real> for Variable {
    type Output = Variable;

    fn sub(self, rhs: Real) -> Variable {
        record(&mut SubConst { value: rhs }, &[self.0])
    }
}

impl ops::Mul<Real> for Variable {
    type Output = Variable;

    fn mul(self, rhs: Real) -> Variable {
        record(&mut MulConst { value: rhs }, &[self.0])
    }
}

impl ops::Div<Real> for Variable {
    type Output = Variable;

    fn div(self, rhs: Real) -> Variable {
        record(&mut DivConst { value: rhs }, &[self.0])
    }
}

impl ops::Add<Variable> for Real {
    type Output = Variable;

    fn add(self, rhs: Variable) -> Variable {
        record(&mut AddConst { value: self }, &[rhs.0])
    }
}

impl ops::Sub<Variable> for Real {
    type Output = Variable;

    fn sub(self, rhs: Variable) -> Variable {
        record(&mut ConstSub { value: self }, &[rhs.0])
    }
}

impl ops::Mul<Variable> for Real {
    type Output = Variable;

    fn mul(self, rhs: Variable) -> Variable {
        record(&mut MulConst { value: self }, &[rhs.0])
    }
}

impl ops::Div<Variable> for Real {
    type Output = Variable;

    fn div(self, rhs: Variable) -> Variable {
        record(&mut ConstDiv { value: self }, &[rhs.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Exp;
    use approx::assert_relative_eq;

    #[test]
    fn test_operators_record_calls() {
        clear_graph();
        let a = Variable::new(NdArray::scalar(6.0));
        let b = Variable::new(NdArray::scalar(3.0));
        assert_eq!((a + b).data().unwrap(), vec![9.0]);
        assert_eq!((a - b).data().unwrap(), vec![3.0]);
        assert_eq!((a * b).data().unwrap(), vec![18.0]);
        assert_eq!((a / b).data().unwrap(), vec![2.0]);
        assert_eq!((-a).data().unwrap(), vec![-6.0]);
        assert_eq!(with_graph(|g| g.num_calls()), 5);
        clear_graph();
    }

    #[test]
    fn test_scalar_operands() {
        clear_graph();
        let x = Variable::new(NdArray::scalar(4.0));
        assert_eq!((x + 1.0).data().unwrap(), vec![5.0]);
        assert_eq!((x - 1.0).data().unwrap(), vec![3.0]);
        assert_eq!((x * 2.0).data().unwrap(), vec![8.0]);
        assert_eq!((x / 2.0).data().unwrap(), vec![2.0]);
        assert_eq!((1.0 + x).data().unwrap(), vec![5.0]);
        assert_eq!((1.0 - x).data().unwrap(), vec![-3.0]);
        assert_eq!((2.0 * x).data().unwrap(), vec![8.0]);
        assert_eq!((8.0 / x).data().unwrap(), vec![2.0]);
        clear_graph();
    }

    #[test]
    fn test_quotient_rule() {
        clear_graph();
        let x = Variable::new(NdArray::scalar(2.0));
        let y = (x * x) / (x + 1.0);
        y.backward().unwrap();
        // d/dx x^2/(x+1) = (x^2 + 2x) / (x+1)^2 = 8/9 at x = 2
        assert_relative_eq!(x.grad().unwrap()[0], 8.0 / 9.0, epsilon = 1e-12);
        clear_graph();
    }

    #[test]
    fn test_apply_stage() {
        clear_graph();
        let x = Variable::new(NdArray::scalar(0.0));
        let y = x.apply(&mut Exp).unwrap();
        assert_eq!(y.data().unwrap(), vec![1.0]);
        clear_graph();
    }

    #[test]
    #[should_panic(expected = "Add on variables failed")]
    fn test_incompatible_operands_panic() {
        clear_graph();
        let a = Variable::new(NdArray::zeros(&[2], 1));
        let b = Variable::new(NdArray::zeros(&[3], 1));
        let _ = a + b;
    }

    #[test]
    fn test_stale_after_reset() {
        clear_graph();
        let x = Variable::new(NdArray::scalar(1.0));
        Variable::reset_graph();
        assert!(matches!(x.data(), Err(TensorError::StaleNode { .. })));
    }
}
