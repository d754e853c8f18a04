//! Composite stage running child stages in order.
//!
//! Layers are wired by name when they declare ports and sequentially
//! otherwise:
//!
//! ```text
//! stack inputs ──bind──► {"x": n0}
//!   layer 0 (no ports)          reads previous outputs       ──► [n1]
//!   layer 1 (outputs ["h"])     reads previous outputs       ──► [n2] bind "h"
//!   layer 2 (inputs ["x", "h"]) reads bindings "x", "h"      ──► [n3]
//! stack outputs: declared names, else the last layer's outputs
//! ```
//!
//! The stack records no call of its own; backward walks straight through the
//! calls of its children.

use super::Function;
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use std::collections::HashMap;

/// One child stage with optional named ports.
#[derive(Debug)]
pub struct Layer {
    function: Box<dyn Function>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl Layer {
    /// Wrap a stage without ports.
    pub fn new(function: impl Function + 'static) -> Self {
        Self::boxed(Box::new(function))
    }

    /// Wrap an already boxed stage.
    pub fn boxed(function: Box<dyn Function>) -> Self {
        Self {
            function,
            input_names: Vec::new(),
            output_names: Vec::new(),
        }
    }

    /// Read inputs from these bindings instead of the previous layer.
    pub fn with_inputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.input_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Bind the outputs to these names.
    pub fn with_outputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// The wrapped stage.
    pub fn function(&self) -> &dyn Function {
        self.function.as_ref()
    }
}

/// Ordered container of stages; itself a [`Function`], so stacks nest.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::functions::{Function, FunctionStack, MulConst, ReLU};
///
/// let mut graph = ComputationGraph::new();
/// let mut stack = FunctionStack::new("block")
///     .with(MulConst { value: 2.0 })
///     .with(ReLU);
///
/// let x = graph.leaf(NdArray::from_vec(vec![-1.0, 3.0], &[2]).unwrap());
/// let y = stack.forward(&mut graph, &[x]).unwrap()[0];
/// assert_eq!(graph.data(y).unwrap(), &[0.0, 6.0]);
/// ```
#[derive(Debug)]
pub struct FunctionStack {
    name: String,
    layers: Vec<Layer>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl FunctionStack {
    /// Create an empty stack. An empty stack passes its inputs through.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            input_names: Vec::new(),
            output_names: Vec::new(),
        }
    }

    /// Create a sequential stack from boxed stages.
    pub fn from_functions(name: impl Into<String>, functions: Vec<Box<dyn Function>>) -> Self {
        let mut stack = Self::new(name);
        stack.layers = functions.into_iter().map(Layer::boxed).collect();
        stack
    }

    /// Append a stage without ports.
    pub fn with(mut self, function: impl Function + 'static) -> Self {
        self.layers.push(Layer::new(function));
        self
    }

    /// Append a layer.
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Append a layer in place.
    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Name the stack's inputs so layers can refer to them.
    pub fn with_inputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.input_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Return these bindings instead of the last layer's outputs.
    pub fn with_outputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Child layers in execution order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of child layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if the stack has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

fn lookup(
    stack: &str,
    bindings: &HashMap<String, NodeId>,
    names: &[String],
) -> Result<Vec<NodeId>, TensorError> {
    names
        .iter()
        .map(|n| {
            bindings.get(n).copied().ok_or_else(|| {
                TensorError::InvalidArgument(format!("{stack}: no value bound to '{n}'"))
            })
        })
        .collect()
}

fn bind(
    stack: &str,
    bindings: &mut HashMap<String, NodeId>,
    names: &[String],
    ids: &[NodeId],
) -> Result<(), TensorError> {
    if names.len() != ids.len() {
        return Err(TensorError::InvalidArgument(format!(
            "{stack}: {} names for {} values",
            names.len(),
            ids.len()
        )));
    }
    for (name, &id) in names.iter().zip(ids) {
        bindings.insert(name.clone(), id);
    }
    Ok(())
}

impl Function for FunctionStack {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let mut bindings = HashMap::new();
        if !self.input_names.is_empty() {
            bind(&self.name, &mut bindings, &self.input_names, inputs)?;
        }

        let mut current = inputs.to_vec();
        for layer in &mut self.layers {
            let layer_inputs = if layer.input_names.is_empty() {
                current
            } else {
                lookup(&self.name, &bindings, &layer.input_names)?
            };
            let outputs = layer.function.forward(graph, &layer_inputs)?;
            if !layer.output_names.is_empty() {
                bind(&self.name, &mut bindings, &layer.output_names, &outputs)?;
            }
            current = outputs;
        }

        if self.output_names.is_empty() {
            Ok(current)
        } else {
            lookup(&self.name, &bindings, &self.output_names)
        }
    }

    fn parameters(&self) -> Vec<NodeId> {
        self.layers
            .iter()
            .flat_map(|layer| layer.function.parameters())
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        for layer in &mut self.layers {
            layer.function.set_training(training);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{Add, BatchNormalization, Linear, MulConst, ReLU, Sin};
    use crate::scalar::Real;
    use crate::tensor::NdArray;

    fn linear(graph: &mut ComputationGraph, w: Vec<Real>) -> Linear {
        let w = NdArray::from_vec(w, &[1, 1]).unwrap();
        Linear::with_weights(graph, w, None).unwrap()
    }

    #[test]
    fn test_sequential() {
        let mut graph = ComputationGraph::new();
        let mut stack = FunctionStack::new("seq")
            .with(MulConst { value: 3.0 })
            .with(MulConst { value: -1.0 })
            .with(ReLU);
        let x = graph.leaf(NdArray::from_vec(vec![-2.0, 1.0], &[2]).unwrap());
        let y = stack.forward(&mut graph, &[x]).unwrap()[0];
        assert_eq!(graph.data(y).unwrap(), &[6.0, 0.0]);
        assert_eq!(graph.num_calls(), 3);
    }

    #[test]
    fn test_named_routing() {
        let mut graph = ComputationGraph::new();
        // y = sin(x) + 2x
        let mut stack = FunctionStack::new("residual")
            .with_inputs(["x"])
            .with_layer(Layer::new(Sin).with_inputs(["x"]).with_outputs(["s"]))
            .with_layer(Layer::new(MulConst { value: 2.0 }).with_inputs(["x"]).with_outputs(["d"]))
            .with_layer(Layer::new(Add).with_inputs(["s", "d"]).with_outputs(["y"]))
            .with_outputs(["y"]);

        let x = graph.leaf(NdArray::scalar(0.0));
        let y = stack.forward(&mut graph, &[x]).unwrap()[0];
        assert_eq!(graph.data(y).unwrap(), &[0.0]);
        assert_eq!(graph.use_count(x).unwrap(), 2);

        graph.backward(y).unwrap();
        assert_eq!(graph.grad(x).unwrap(), &[3.0]);
    }

    #[test]
    fn test_unbound_name() {
        let mut graph = ComputationGraph::new();
        let mut stack = FunctionStack::new("broken")
            .with_layer(Layer::new(ReLU).with_inputs(["missing"]));
        let x = graph.leaf(NdArray::scalar(1.0));
        assert!(matches!(
            stack.forward(&mut graph, &[x]),
            Err(TensorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_stack_passes_through() {
        let mut graph = ComputationGraph::new();
        let mut stack = FunctionStack::new("empty");
        assert!(stack.is_empty());
        let x = graph.leaf(NdArray::scalar(1.0));
        assert_eq!(stack.forward(&mut graph, &[x]).unwrap(), vec![x]);
        assert_eq!(graph.num_calls(), 0);
    }

    #[test]
    fn test_nested_parameters_in_order() {
        let mut graph = ComputationGraph::new();
        let l1 = linear(&mut graph, vec![1.0]);
        let l2 = linear(&mut graph, vec![2.0]);
        let l3 = linear(&mut graph, vec![3.0]);
        let (w1, w2, w3) = (l1.weight(), l2.weight(), l3.weight());

        let inner = FunctionStack::new("inner").with(l2).with(ReLU).with(l3);
        let mut outer = FunctionStack::new("outer").with(l1).with(inner);
        assert_eq!(outer.parameters(), vec![w1, w2, w3]);
        assert_eq!(outer.len(), 2);

        let x = graph.leaf(NdArray::scalar(1.0));
        let y = outer.forward(&mut graph, &[x]).unwrap()[0];
        assert_eq!(graph.data(y).unwrap(), &[6.0]);
        // Only the children's calls are recorded.
        assert_eq!(graph.num_calls(), 4);
    }

    #[test]
    fn test_set_training_reaches_children() {
        let mut graph = ComputationGraph::new();
        let bn = BatchNormalization::new(&mut graph, 1).unwrap();
        let mut stack = FunctionStack::new("outer").with(FunctionStack::new("inner").with(bn));
        stack.set_training(false);

        // In inference mode a fresh layer is the identity up to eps.
        let x = graph.leaf(NdArray::new(vec![4.0, 8.0], &[1], 2).unwrap());
        let y = stack.forward(&mut graph, &[x]).unwrap()[0];
        let data = graph.data(y).unwrap();
        assert!((data[0] - 4.0).abs() < 1e-3);
        assert!((data[1] - 8.0).abs() < 1e-3);
    }
}
