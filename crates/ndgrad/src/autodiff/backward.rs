//! Backward pass execution for reverse-mode automatic differentiation.
//!
//! The traversal is driven by each node's `use_count`: the number of
//! consumers recorded in forward that have not yet propagated their gradient
//! back. A node is descended into only after its last consumer released it,
//! so its gradient is complete before its producer runs, and every call
//! fires at most once per pass no matter how much fan-out the graph has.

use super::graph::{CallId, ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};

/// What a backward pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackwardReport {
    fired: Vec<CallId>,
    visited: Vec<NodeId>,
}

impl BackwardReport {
    /// Calls whose backward ran, in firing order.
    pub fn fired(&self) -> &[CallId] {
        &self.fired
    }

    /// Nodes the traversal reached, in visiting order.
    pub fn visited(&self) -> &[NodeId] {
        &self.visited
    }

    /// How many times `call` fired (0 or 1 for a well-formed pass).
    pub fn fire_count(&self, call: CallId) -> usize {
        self.fired.iter().filter(|&&c| c == call).count()
    }
}

impl ComputationGraph {
    /// Run backward from `root`.
    ///
    /// The root gradient is filled with ones unless an explicit gradient was
    /// seeded with [`ComputationGraph::set_grad`]. Gradients accumulate into
    /// existing buffers; call [`ComputationGraph::clear_grad`] or
    /// [`ComputationGraph::clear_parameter_grads`] between iterations.
    ///
    /// Every firing releases one consumer of each input occurrence. Running
    /// backward twice over the same forward therefore fails with
    /// `UseCountUnderflow`.
    ///
    /// # Errors
    ///
    /// - `UnknownNode` / `StaleNode` if `root` or a recorded id is not live.
    /// - `LengthMismatch` if a contribution does not fit its target.
    /// - `UseCountUnderflow` if a node is released more often than consumed.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndgrad::{ComputationGraph, NdArray};
    /// use ndgrad::functions::basic_math::{add, mul};
    ///
    /// let mut graph = ComputationGraph::new();
    /// let x = graph.leaf(NdArray::scalar(3.0));
    /// let y = mul(&mut graph, x, x).unwrap();
    /// let z = add(&mut graph, y, x).unwrap();
    /// graph.backward(z).unwrap();
    /// assert_eq!(graph.grad(x).unwrap(), &[7.0]); // d(x^2 + x)/dx = 2x + 1
    /// ```
    pub fn backward(&mut self, root: NodeId) -> Result<BackwardReport, TensorError> {
        let root_node = self.node_mut(root)?;
        if !root_node.seeded {
            root_node.array_mut().fill_grad(Real::one());
        }
        root_node.seeded = false;

        let num_calls = self.calls().len();
        let mut fired = vec![false; num_calls];
        let mut reached: Vec<Vec<bool>> = vec![Vec::new(); num_calls];
        let mut report = BackwardReport::default();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            report.visited.push(id);
            let Some(call_id) = self.node(id)?.creator else {
                continue;
            };
            if fired[call_id.index()] {
                continue;
            }

            if !self.mark_reached(call_id, id, root, &mut reached[call_id.index()])? {
                continue;
            }

            fired[call_id.index()] = true;
            let released = self.fire(call_id)?;
            report.fired.push(call_id);
            // Reverse so the leftmost input is processed first.
            stack.extend(released.into_iter().rev());
        }

        log::debug!(
            "backward from {:?}: {} calls fired, {} nodes visited",
            root,
            report.fired.len(),
            report.visited.len()
        );
        Ok(report)
    }

    /// Seed `grad` on `root` and run backward.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if `grad` does not fit `root`, plus the errors of
    /// [`ComputationGraph::backward`].
    pub fn backward_with_grad(
        &mut self,
        root: NodeId,
        grad: &[Real],
    ) -> Result<BackwardReport, TensorError> {
        self.set_grad(root, grad)?;
        self.backward(root)
    }

    /// Mark output `id` of `call_id` as reached and report whether the call
    /// is ready to fire.
    ///
    /// Outputs nobody consumed (and that are not the root) never carry a
    /// gradient and do not hold the call back.
    fn mark_reached(
        &self,
        call_id: CallId,
        id: NodeId,
        root: NodeId,
        reached: &mut Vec<bool>,
    ) -> Result<bool, TensorError> {
        let call = self
            .call(call_id)
            .ok_or(TensorError::UnknownNode { node: id })?;
        let outputs = call.outputs();
        if outputs.len() == 1 {
            return Ok(true);
        }

        if reached.is_empty() {
            reached.resize(outputs.len(), false);
        }
        if let Some(pos) = outputs.iter().position(|&o| o == id) {
            reached[pos] = true;
        }

        for (i, &output) in outputs.iter().enumerate() {
            if reached[i] {
                continue;
            }
            if output == root || self.node(output)?.consumers > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run one call's backward, accumulate its contributions and release its
    /// inputs. Returns the distinct inputs whose `use_count` reached zero.
    fn fire(&mut self, call_id: CallId) -> Result<Vec<NodeId>, TensorError> {
        let (contributions, inputs) = {
            let call = &self.calls()[call_id.index()];
            log::trace!("firing {} ({:?})", call.name(), call_id);
            (
                call.grad_fn.backward(self, call.inputs(), call.outputs())?,
                call.inputs().to_vec(),
            )
        };

        let mut counted: Vec<NodeId> = Vec::new();
        for (target, grad) in contributions {
            let array = self.node_mut(target)?.array_mut();
            array.accumulate_grad(&grad)?;
            if target.is_parameter() && !counted.contains(&target) {
                array.count_up();
                counted.push(target);
            }
        }

        let mut released = Vec::new();
        for &input in &inputs {
            let node = self.node_mut(input)?;
            node.use_count = node
                .use_count
                .checked_sub(1)
                .ok_or(TensorError::UseCountUnderflow { node: input })?;
            if node.use_count == 0 && !released.contains(&input) {
                released.push(input);
            }
        }
        Ok(released)
    }
}
