//! Computation graph for reverse-mode automatic differentiation.
//!
//! The graph is an arena. Nodes own their [`NdArray`] and are addressed by
//! [`NodeId`]; each stage invocation is recorded as a [`Call`] holding the
//! stage's [`GradFn`] together with the exact input and output ids of that
//! invocation.
//!
//! Two node kinds live in separate arenas:
//!
//! - `Parameter` nodes are persistent. They survive [`ComputationGraph::clear`]
//!   and keep their gradient buffers, so optimizers can hold their ids across
//!   iterations.
//! - `Activation` nodes are transient. `clear` drops them together with every
//!   call and bumps the graph generation; ids from an earlier generation are
//!   rejected with [`TensorError::StaleNode`].

use crate::error::TensorError;
use crate::scalar::Real;
use crate::tensor::NdArray;
use std::cell::RefCell;
use std::fmt::{self, Debug};

/// Which arena a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Trainable value owned by the graph across iterations.
    Parameter,
    /// Intermediate value of the current forward pass.
    Activation,
}

/// Unique identifier for a node in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    kind: NodeKind,
    index: usize,
    generation: u64,
}

impl NodeId {
    /// Arena the node lives in.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the internal index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Check if this is a parameter node.
    #[inline]
    pub fn is_parameter(&self) -> bool {
        self.kind == NodeKind::Parameter
    }
}

/// Identifier of a recorded stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(usize);

impl CallId {
    /// Get the internal index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Backward function of one recorded invocation.
///
/// Given the graph (upstream gradients are already accumulated in the
/// output nodes), returns the gradient contributions of the invocation. The
/// engine adds each contribution into the target node's gradient buffer, so
/// implementations never write to the graph themselves.
///
/// Contributions may target nodes that are not inputs of the call, such as
/// the parameters of a layer.
pub trait GradFn: Debug {
    /// Compute the contributions `(target, gradient)` of this invocation.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures from the graph.
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError>;
}

/// A node in the computation graph.
#[derive(Debug)]
pub struct Node {
    array: NdArray,
    /// Consumers still to be released in the current backward pass.
    pub(crate) use_count: usize,
    /// Consumers recorded during the forward pass.
    pub(crate) consumers: usize,
    pub(crate) creator: Option<CallId>,
    pub(crate) seeded: bool,
}

impl Node {
    fn new(array: NdArray, creator: Option<CallId>) -> Self {
        Self {
            array,
            use_count: 0,
            consumers: 0,
            creator,
            seeded: false,
        }
    }

    /// Value and gradient of the node.
    pub fn array(&self) -> &NdArray {
        &self.array
    }

    pub(crate) fn array_mut(&mut self) -> &mut NdArray {
        &mut self.array
    }

    /// Consumers not yet released by backward.
    pub fn use_count(&self) -> usize {
        self.use_count
    }

    /// Consumers recorded by forward passes.
    pub fn consumers(&self) -> usize {
        self.consumers
    }

    /// The invocation that produced this node, if any.
    pub fn creator(&self) -> Option<CallId> {
        self.creator
    }

    /// Check if an explicit gradient was seeded.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }
}

/// Record of one stage invocation.
#[derive(Debug)]
pub struct Call {
    name: String,
    pub(crate) grad_fn: Box<dyn GradFn>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

impl Call {
    /// Name of the stage that recorded the call.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input ids in argument order, repeated ids included.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Output ids in result order.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }
}

/// Arena of nodes and calls.
///
/// Each thread has an independent default graph reachable through
/// [`with_graph`]; explicit graphs can be created with
/// [`ComputationGraph::new`] and passed to stages directly.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
///
/// let mut graph = ComputationGraph::new();
/// let w = graph.parameter(NdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap());
/// let x = graph.leaf(NdArray::from_vec(vec![3.0, 4.0], &[2]).unwrap());
/// assert_eq!(graph.num_parameters(), 1);
/// assert_eq!(graph.num_activations(), 1);
///
/// graph.clear();
/// assert!(graph.array(w).is_ok());
/// assert!(graph.array(x).is_err());
/// ```
pub struct ComputationGraph {
    parameters: Vec<Node>,
    activations: Vec<Node>,
    calls: Vec<Call>,
    generation: u64,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            activations: Vec::new(),
            calls: Vec::new(),
            generation: 0,
        }
    }

    /// Register a persistent parameter node.
    pub fn parameter(&mut self, array: NdArray) -> NodeId {
        let id = NodeId {
            kind: NodeKind::Parameter,
            index: self.parameters.len(),
            generation: 0,
        };
        self.parameters.push(Node::new(array, None));
        id
    }

    /// Register a transient leaf (an input of the forward pass).
    pub fn leaf(&mut self, array: NdArray) -> NodeId {
        self.push_activation(array, None)
    }

    fn push_activation(&mut self, array: NdArray, creator: Option<CallId>) -> NodeId {
        let id = NodeId {
            kind: NodeKind::Activation,
            index: self.activations.len(),
            generation: self.generation,
        };
        self.activations.push(Node::new(array, creator));
        id
    }

    /// Record a stage invocation and create its output nodes.
    ///
    /// Every occurrence of an id in `inputs` counts as one consumer, so a
    /// node passed twice must be released twice during backward.
    ///
    /// # Errors
    ///
    /// `UnknownNode` / `StaleNode` if an input id is not live.
    pub fn apply(
        &mut self,
        name: impl Into<String>,
        grad_fn: Box<dyn GradFn>,
        inputs: &[NodeId],
        outputs: Vec<NdArray>,
    ) -> Result<Vec<NodeId>, TensorError> {
        for &id in inputs {
            self.node(id)?;
        }
        for &id in inputs {
            let node = self.node_mut(id)?;
            node.use_count += 1;
            node.consumers += 1;
        }

        let call_id = CallId(self.calls.len());
        let output_ids: Vec<NodeId> = outputs
            .into_iter()
            .map(|array| self.push_activation(array, Some(call_id)))
            .collect();
        self.calls.push(Call {
            name: name.into(),
            grad_fn,
            inputs: inputs.to_vec(),
            outputs: output_ids.clone(),
        });
        Ok(output_ids)
    }

    /// Get node by ID.
    ///
    /// # Errors
    ///
    /// `UnknownNode` if the id was never issued, `StaleNode` if it belongs to
    /// a cleared generation.
    pub fn node(&self, id: NodeId) -> Result<&Node, TensorError> {
        let arena = match id.kind {
            NodeKind::Parameter => &self.parameters,
            NodeKind::Activation => {
                if id.generation != self.generation {
                    return Err(TensorError::StaleNode { node: id });
                }
                &self.activations
            }
        };
        arena
            .get(id.index)
            .ok_or(TensorError::UnknownNode { node: id })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TensorError> {
        let arena = match id.kind {
            NodeKind::Parameter => &mut self.parameters,
            NodeKind::Activation => {
                if id.generation != self.generation {
                    return Err(TensorError::StaleNode { node: id });
                }
                &mut self.activations
            }
        };
        arena
            .get_mut(id.index)
            .ok_or(TensorError::UnknownNode { node: id })
    }

    /// Array (value and gradient) of a node.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn array(&self, id: NodeId) -> Result<&NdArray, TensorError> {
        Ok(&self.node(id)?.array)
    }

    /// Mutable array of a node.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn array_mut(&mut self, id: NodeId) -> Result<&mut NdArray, TensorError> {
        Ok(&mut self.node_mut(id)?.array)
    }

    /// Values of a node.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn data(&self, id: NodeId) -> Result<&[Real], TensorError> {
        Ok(self.array(id)?.data())
    }

    /// Gradients of a node.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn grad(&self, id: NodeId) -> Result<&[Real], TensorError> {
        Ok(self.array(id)?.grad())
    }

    /// Remaining consumers of a node in the current pass.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn use_count(&self, id: NodeId) -> Result<usize, TensorError> {
        Ok(self.node(id)?.use_count)
    }

    /// Producer of a node.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn creator(&self, id: NodeId) -> Result<Option<CallId>, TensorError> {
        Ok(self.node(id)?.creator)
    }

    /// Get a recorded call.
    pub fn call(&self, id: CallId) -> Option<&Call> {
        self.calls.get(id.0)
    }

    /// Seed an explicit gradient; the next backward from this node uses it
    /// instead of ones.
    ///
    /// # Errors
    ///
    /// Lookup errors, or `LengthMismatch` if `grad` has the wrong length.
    pub fn set_grad(&mut self, id: NodeId, grad: &[Real]) -> Result<(), TensorError> {
        let node = self.node_mut(id)?;
        node.array.set_grad(grad)?;
        node.seeded = true;
        Ok(())
    }

    /// Zero the gradient and train count of a node.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn clear_grad(&mut self, id: NodeId) -> Result<(), TensorError> {
        let node = self.node_mut(id)?;
        node.array.clear_grad();
        node.seeded = false;
        Ok(())
    }

    /// Zero the gradients of every parameter.
    pub fn clear_parameter_grads(&mut self) {
        for node in &mut self.parameters {
            node.array.clear_grad();
        }
    }

    /// Cut the link from a node to its producer.
    ///
    /// Backward stops at the node as if it were a leaf; the producer's
    /// inputs are never released.
    ///
    /// # Errors
    ///
    /// Same as [`ComputationGraph::node`].
    pub fn unchain(&mut self, id: NodeId) -> Result<(), TensorError> {
        self.node_mut(id)?.creator = None;
        Ok(())
    }

    /// Drop every activation and call; parameters keep values and gradients.
    pub fn clear(&mut self) {
        log::debug!(
            "clearing graph generation {}: {} activations, {} calls",
            self.generation,
            self.activations.len(),
            self.calls.len()
        );
        self.activations.clear();
        self.calls.clear();
        self.generation += 1;
        for node in &mut self.parameters {
            node.use_count = 0;
            node.consumers = 0;
            node.seeded = false;
        }
    }

    /// Number of parameter nodes.
    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Number of live activation nodes.
    pub fn num_activations(&self) -> usize {
        self.activations.len()
    }

    /// Number of recorded calls.
    pub fn num_calls(&self) -> usize {
        self.calls.len()
    }

    /// Current generation; bumped by every [`ComputationGraph::clear`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn calls(&self) -> &[Call] {
        &self.calls
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ComputationGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputationGraph")
            .field("num_parameters", &self.parameters.len())
            .field("num_activations", &self.activations.len())
            .field("num_calls", &self.calls.len())
            .field("generation", &self.generation)
            .finish()
    }
}

thread_local! {
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());
}

/// Access the thread-local computation graph.
///
/// # Panics
///
/// Panics if called re-entrantly from inside another `with_graph` closure.
///
/// # Examples
///
/// ```
/// use ndgrad::NdArray;
/// use ndgrad::autodiff::with_graph;
///
/// let id = with_graph(|graph| graph.leaf(NdArray::scalar(1.0)));
/// assert_eq!(with_graph(|graph| graph.data(id).unwrap()[0]), 1.0);
/// ```
pub fn with_graph<R>(f: impl FnOnce(&mut ComputationGraph) -> R) -> R {
    GRAPH.with(|g| f(&mut g.borrow_mut()))
}

/// Clear the thread-local computation graph.
pub fn clear_graph() {
    with_graph(|g| g.clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    // Passes the first output's gradient through to every input.
    #[derive(Debug)]
    struct PassThrough;

    impl GradFn for PassThrough {
        fn backward(
            &self,
            graph: &ComputationGraph,
            inputs: &[NodeId],
            outputs: &[NodeId],
        ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
            let gy = graph.grad(outputs[0])?.to_vec();
            Ok(inputs.iter().map(|&id| (id, gy.clone())).collect())
        }
    }

    #[test]
    fn test_leaf_and_parameter_ids() {
        let mut graph = ComputationGraph::new();
        let p = graph.parameter(NdArray::scalar(1.0));
        let a = graph.leaf(NdArray::scalar(2.0));
        let b = graph.leaf(NdArray::scalar(3.0));

        assert!(p.is_parameter());
        assert_eq!(a.kind(), NodeKind::Activation);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(graph.creator(a).unwrap().is_none());
    }

    #[test]
    fn test_apply_counts_consumers() {
        let mut graph = ComputationGraph::new();
        let a = graph.leaf(NdArray::scalar(2.0));
        let out = graph
            .apply("PassThrough", Box::new(PassThrough), &[a, a], vec![NdArray::scalar(4.0)])
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(graph.use_count(a).unwrap(), 2);
        assert_eq!(graph.node(a).unwrap().consumers(), 2);
        let call = graph.call(graph.creator(out[0]).unwrap().unwrap()).unwrap();
        assert_eq!(call.name(), "PassThrough");
        assert_eq!(call.inputs(), &[a, a]);
        assert_eq!(call.outputs(), out.as_slice());
    }

    #[test]
    fn test_apply_rejects_stale_input() {
        let mut graph = ComputationGraph::new();
        let a = graph.leaf(NdArray::scalar(2.0));
        graph.clear();
        let result = graph.apply("PassThrough", Box::new(PassThrough), &[a], vec![]);
        assert!(matches!(result, Err(TensorError::StaleNode { .. })));
        assert_eq!(graph.num_calls(), 0);
    }

    #[test]
    fn test_clear_keeps_parameters() {
        let mut graph = ComputationGraph::new();
        let p = graph.parameter(NdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap());
        graph.array_mut(p).unwrap().fill_grad(3.0);
        let x = graph.leaf(NdArray::scalar(1.0));
        graph
            .apply("PassThrough", Box::new(PassThrough), &[p, x], vec![NdArray::scalar(0.0)])
            .unwrap();
        assert_eq!(graph.use_count(p).unwrap(), 1);

        graph.clear();
        assert_eq!(graph.generation(), 1);
        assert_eq!(graph.num_activations(), 0);
        assert_eq!(graph.num_calls(), 0);
        assert_eq!(graph.use_count(p).unwrap(), 0);
        assert_eq!(graph.grad(p).unwrap(), &[3.0, 3.0]);
        assert!(matches!(graph.array(x), Err(TensorError::StaleNode { .. })));
    }

    #[test]
    fn test_unknown_node() {
        let mut a = ComputationGraph::new();
        let mut b = ComputationGraph::new();
        b.leaf(NdArray::scalar(0.0));
        let id = b.leaf(NdArray::scalar(0.0));
        a.leaf(NdArray::scalar(0.0));
        assert!(matches!(a.array(id), Err(TensorError::UnknownNode { .. })));
    }

    #[test]
    fn test_set_grad_marks_seeded() {
        let mut graph = ComputationGraph::new();
        let a = graph.leaf(NdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap());
        graph.set_grad(a, &[0.5, 0.25]).unwrap();
        assert!(graph.node(a).unwrap().is_seeded());
        assert!(graph.set_grad(a, &[1.0]).is_err());

        graph.clear_grad(a).unwrap();
        assert!(!graph.node(a).unwrap().is_seeded());
        assert_eq!(graph.grad(a).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn test_unchain() {
        let mut graph = ComputationGraph::new();
        let a = graph.leaf(NdArray::scalar(1.0));
        let y = graph
            .apply("PassThrough", Box::new(PassThrough), &[a], vec![NdArray::scalar(1.0)])
            .unwrap()[0];
        assert!(graph.creator(y).unwrap().is_some());
        graph.unchain(y).unwrap();
        assert!(graph.creator(y).unwrap().is_none());
    }

    #[test]
    fn test_thread_local_graph_is_per_thread() {
        clear_graph();
        with_graph(|g| g.leaf(NdArray::scalar(1.0)));
        let other = std::thread::spawn(|| with_graph(|g| g.num_activations()))
            .join()
            .unwrap();
        assert_eq!(other, 0);
        assert_eq!(with_graph(|g| g.num_activations()), 1);
        clear_graph();
    }
}
