//! Reverse-mode automatic differentiation.
//!
//! Stages record their invocations in a [`ComputationGraph`]; backward walks
//! the recorded calls from a root node, ordered by per-node consumer counts.
//!
//! # Architecture
//!
//! ```text
//! ComputationGraph (arena, one thread-local default per thread)
//! ├── parameters   Vec<Node>   persistent, survive clear()
//! ├── activations  Vec<Node>   transient, dropped by clear()
//! └── calls        Vec<Call>   name + Box<dyn GradFn> + input ids + output ids
//!
//! Node = NdArray + use_count + consumers + creator: Option<CallId>
//! ```
//!
//! # Example
//!
//! ```
//! use ndgrad::{ComputationGraph, NdArray};
//! use ndgrad::functions::{Function, Sigmoid};
//! use ndgrad::functions::basic_math::mul;
//!
//! let mut graph = ComputationGraph::new();
//! let w = graph.parameter(NdArray::from_vec(vec![0.5, -0.5], &[2]).unwrap());
//! let x = graph.leaf(NdArray::from_vec(vec![2.0, 2.0], &[2]).unwrap());
//!
//! let h = mul(&mut graph, w, x).unwrap();
//! let y = Sigmoid.forward(&mut graph, &[h]).unwrap()[0];
//! graph.backward(y).unwrap();
//!
//! // Gradients reach the parameter; clearing the graph keeps them.
//! graph.clear();
//! assert!(graph.grad(w).unwrap().iter().all(|&g| g != 0.0));
//! ```
//!
//! # Key Types
//!
//! - [`ComputationGraph`]: arena of nodes and calls, [`ComputationGraph::backward`]
//! - [`GradFn`]: backward function recorded with each call
//! - [`BackwardReport`]: which calls fired, which nodes were visited
//! - [`Variable`]: operator-overloading handle on the thread-local graph

mod backward;
mod graph;
mod variable;

pub use backward::BackwardReport;
pub use graph::{
    Call, CallId, ComputationGraph, GradFn, Node, NodeId, NodeKind, clear_graph, with_graph,
};
pub use variable::Variable;
