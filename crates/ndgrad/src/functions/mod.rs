//! Differentiable stages.
//!
//! A stage implements [`Function`]: its `forward` reads input nodes from a
//! [`ComputationGraph`], computes output arrays and records them with
//! [`ComputationGraph::apply`] together with a [`GradFn`] (usually a clone of
//! the stage itself). Backward later calls that `GradFn` exactly once per
//! recorded invocation.
//!
//! ```text
//! forward:   inputs ──► Function::forward ──► graph.apply(name, grad_fn, inputs, outputs)
//!                                                   │
//! backward:  contributions ◄── GradFn::backward ◄───┘ (fired by the engine)
//! ```
//!
//! Stages with trainable state ([`linear::Linear`], [`batch_norm::BatchNormalization`])
//! own [`NodeId`]s of parameter nodes and report them from
//! [`Function::parameters`].

pub mod activations;
pub mod basic_math;
pub mod batch_norm;
pub mod linear;
pub mod math;
pub mod split;
pub mod stack;
pub mod sum;

pub use crate::autodiff::GradFn;
pub use activations::{ReLU, Sigmoid, Tanh};
pub use basic_math::{
    Add, AddConst, ConstDiv, ConstSub, Div, DivConst, Mul, MulConst, Neg, Sub, SubConst,
};
pub use batch_norm::BatchNormalization;
pub use linear::Linear;
pub use math::{Cos, Exp, Log, Sin, Tan};
pub use split::SplitFunction;
pub use stack::{FunctionStack, Layer};
pub use sum::Sum;

use crate::autodiff::{ComputationGraph, NodeId};
use crate::config::VALIDATION;
use crate::error::TensorError;
use crate::scalar::Real;
use crate::tensor::NdArray;
use std::fmt::Debug;

/// A differentiable stage.
pub trait Function: Debug {
    /// Stage name, recorded with every call.
    fn name(&self) -> &str;

    /// Run the stage on `inputs` and record the invocation.
    ///
    /// # Errors
    ///
    /// Arity, shape and lookup errors.
    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError>;

    /// Parameter nodes owned by the stage, in a stable order.
    fn parameters(&self) -> Vec<NodeId> {
        Vec::new()
    }

    /// Switch between training and inference behavior.
    fn set_training(&mut self, _training: bool) {}
}

/// Check the number of inputs and return them as an array.
pub(crate) fn expect_inputs<const N: usize>(
    name: &str,
    inputs: &[NodeId],
) -> Result<[NodeId; N], TensorError> {
    <[NodeId; N]>::try_from(inputs).map_err(|_| {
        TensorError::InvalidArgument(format!(
            "{name} expects {N} input(s), got {}",
            inputs.len()
        ))
    })
}

/// Elementwise operands must agree in shape and batch count.
pub(crate) fn check_compatible(a: &NdArray, b: &NdArray) -> Result<(), TensorError> {
    if !VALIDATION {
        return Ok(());
    }
    if a.shape() != b.shape() {
        return Err(TensorError::ShapeMismatch {
            expected: a.shape().to_vec(),
            actual: b.shape().to_vec(),
        });
    }
    if a.batch_count() != b.batch_count() {
        return Err(TensorError::BatchMismatch {
            expected: a.batch_count(),
            actual: b.batch_count(),
        });
    }
    Ok(())
}

/// Forward of a one-input elementwise stage.
pub(crate) fn unary_forward<F>(
    graph: &mut ComputationGraph,
    name: &str,
    grad_fn: Box<dyn GradFn>,
    inputs: &[NodeId],
    f: F,
) -> Result<Vec<NodeId>, TensorError>
where
    F: Fn(Real) -> Real,
{
    let [x] = expect_inputs::<1>(name, inputs)?;
    let y = graph.array(x)?.map(f);
    graph.apply(name, grad_fn, &[x], vec![y])
}

/// Backward of a one-input elementwise stage; `df(x, y)` is dy/dx.
pub(crate) fn unary_backward<F>(
    graph: &ComputationGraph,
    inputs: &[NodeId],
    outputs: &[NodeId],
    df: F,
) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError>
where
    F: Fn(Real, Real) -> Real,
{
    let x = graph.array(inputs[0])?;
    let y = graph.array(outputs[0])?;
    let gx = x
        .data()
        .iter()
        .zip(y.data())
        .zip(y.grad())
        .map(|((&x, &y), &gy)| gy * df(x, y))
        .collect();
    Ok(vec![(inputs[0], gx)])
}

/// Forward of a two-input elementwise stage.
pub(crate) fn binary_forward<F>(
    graph: &mut ComputationGraph,
    name: &str,
    grad_fn: Box<dyn GradFn>,
    inputs: &[NodeId],
    f: F,
) -> Result<Vec<NodeId>, TensorError>
where
    F: Fn(Real, Real) -> Real,
{
    let [a, b] = expect_inputs::<2>(name, inputs)?;
    let (xa, xb) = (graph.array(a)?, graph.array(b)?);
    check_compatible(xa, xb)?;
    let mut y = NdArray::zeros_like(xa);
    for ((o, &p), &q) in y.data_mut().iter_mut().zip(xa.data()).zip(xb.data()) {
        *o = f(p, q);
    }
    graph.apply(name, grad_fn, &[a, b], vec![y])
}

/// Run a single-output stage and return its output.
pub(crate) fn forward_one(
    function: &mut dyn Function,
    graph: &mut ComputationGraph,
    inputs: &[NodeId],
) -> Result<NodeId, TensorError> {
    let name = function.name().to_string();
    function
        .forward(graph, inputs)?
        .into_iter()
        .next()
        .ok_or_else(|| TensorError::InvalidArgument(format!("{name} produced no output")))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Numerical gradient checks shared by the stage tests.

    use super::*;
    use crate::scalar::Scalar;

    /// Compare the analytic gradient of `sum(stage(inputs))` against central
    /// differences for every input.
    pub(crate) fn check_gradients<F>(make: F, arrays: &[NdArray], tolerance: Real)
    where
        F: Fn() -> Box<dyn Function>,
    {
        let mut graph = ComputationGraph::new();
        let ids: Vec<NodeId> = arrays.iter().map(|a| graph.leaf(a.clone())).collect();
        let mut stage = make();
        let y = forward_one(stage.as_mut(), &mut graph, &ids).unwrap();
        graph.backward(y).unwrap();

        let eps = Real::from_f64(1e-6);
        for (k, array) in arrays.iter().enumerate() {
            let analytic = graph.grad(ids[k]).unwrap().to_vec();
            for i in 0..array.data().len() {
                let eval = |delta: Real| {
                    let mut g = ComputationGraph::new();
                    let inputs: Vec<NodeId> = arrays
                        .iter()
                        .enumerate()
                        .map(|(j, a)| {
                            let mut a = a.clone();
                            if j == k {
                                a.data_mut()[i] += delta;
                            }
                            g.leaf(a)
                        })
                        .collect();
                    let mut stage = make();
                    let out = forward_one(stage.as_mut(), &mut g, &inputs).unwrap();
                    g.data(out).unwrap().iter().copied().sum::<Real>()
                };
                let numeric = (eval(eps) - eval(-eps)) / (eps + eps);
                assert!(
                    (numeric - analytic[i]).abs() <= tolerance,
                    "input {k} element {i}: numeric {numeric}, analytic {}",
                    analytic[i]
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_inputs_arity() {
        let mut graph = ComputationGraph::new();
        let a = graph.leaf(NdArray::scalar(1.0));
        assert!(expect_inputs::<1>("Exp", &[a]).is_ok());
        assert!(matches!(
            expect_inputs::<2>("Add", &[a]),
            Err(TensorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_check_compatible() {
        let a = NdArray::zeros(&[2, 3], 1);
        assert!(check_compatible(&a, &NdArray::zeros(&[2, 3], 1)).is_ok());
        assert!(matches!(
            check_compatible(&a, &NdArray::zeros(&[3, 2], 1)),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            check_compatible(&a, &NdArray::zeros(&[2, 3], 2)),
            Err(TensorError::BatchMismatch { .. })
        ));
    }
}
