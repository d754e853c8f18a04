//! Fan-out stage.

use super::{Function, FunctionStack, expect_inputs};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;

/// Hands its single input to `n` branches.
///
/// Each branch is a [`FunctionStack`]; an empty branch returns the input
/// itself. The split records no call: every downstream consumer holds the
/// shared input directly, so the input is released only after all branches
/// have propagated their gradient back.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::functions::{Function, SplitFunction};
///
/// let mut graph = ComputationGraph::new();
/// let x = graph.leaf(NdArray::scalar(1.0));
/// let outs = SplitFunction::new(3).forward(&mut graph, &[x]).unwrap();
/// assert_eq!(outs, vec![x, x, x]);
/// assert_eq!(graph.num_calls(), 0);
/// ```
#[derive(Debug)]
pub struct SplitFunction {
    name: String,
    branches: Vec<FunctionStack>,
}

impl SplitFunction {
    /// Split into `n` pass-through branches.
    pub fn new(n: usize) -> Self {
        let branches = (0..n)
            .map(|i| FunctionStack::new(format!("SplitFunction{i}")))
            .collect();
        Self {
            name: "SplitFunction".to_string(),
            branches,
        }
    }

    /// Split into the given branches.
    pub fn with_branches(branches: Vec<FunctionStack>) -> Self {
        Self {
            name: "SplitFunction".to_string(),
            branches,
        }
    }

    /// Number of outputs.
    pub fn split_count(&self) -> usize {
        self.branches.len()
    }

    /// Branch stacks in output order.
    pub fn branches(&self) -> &[FunctionStack] {
        &self.branches
    }
}

impl Function for SplitFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let [x] = expect_inputs::<1>(&self.name, inputs)?;
        let mut outputs = Vec::with_capacity(self.branches.len());
        for branch in &mut self.branches {
            let out = branch.forward(graph, &[x])?;
            let first = out.first().copied().ok_or_else(|| {
                TensorError::InvalidArgument(format!("{} produced no output", branch.name()))
            })?;
            outputs.push(first);
        }
        Ok(outputs)
    }

    fn parameters(&self) -> Vec<NodeId> {
        self.branches.iter().flat_map(|b| b.parameters()).collect()
    }

    fn set_training(&mut self, training: bool) {
        for branch in &mut self.branches {
            branch.set_training(training);
        }
    }
}
