//! ndgrad - reverse-mode automatic differentiation over batched N-dimensional arrays
//!
//! Stages run eagerly on [`NdArray`] values and record themselves in a
//! [`ComputationGraph`]. Backward walks the recorded calls from a root,
//! releasing each node only after all of its consumers have propagated into
//! it, so every call fires exactly once even under fan-out.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Tensors (tensor, operations)
//!     → NdArray: value + gradient buffers, shape, batch count
//!     → sum, split, concatenate, divide_arrays, from_arrays
//!
//! Level 2: Graph (autodiff)
//!     → ComputationGraph arena, NodeId handles, use_count-driven backward
//!     → Variable: operator overloading on the thread-local graph
//!
//! Level 3: Stages and training (functions, loss, optimizers)
//!     → Function / GradFn traits, FunctionStack, SplitFunction
//!     → MeanSquaredError, SoftmaxCrossEntropy
//!     → Sgd, MomentumSgd, Adam
//! ```
//!
//! # Example
//!
//! ```
//! use ndgrad::{ComputationGraph, NdArray, INFER};
//! use ndgrad::functions::{Function, FunctionStack, Linear, ReLU};
//! use ndgrad::loss::{LossFunction, MeanSquaredError};
//! use ndgrad::optimizers::{MomentumSgd, Optimizer};
//!
//! let mut graph = ComputationGraph::new();
//! let w = NdArray::from_vec(vec![0.5, -0.25, 1.0, 0.75], &[2, 2]).unwrap();
//! let mut net = FunctionStack::new("net")
//!     .with(Linear::with_weights(&mut graph, w, None).unwrap())
//!     .with(ReLU);
//!
//! let mut opt = MomentumSgd::default();
//! opt.attach(&graph, &net.parameters()).unwrap();
//!
//! let mut x = NdArray::from_vec(vec![1.0, 2.0], &[1, 2]).unwrap();
//! x.reshape(&[INFER]).unwrap();
//! let x = graph.leaf(x);
//! let y = net.forward(&mut graph, &[x]).unwrap()[0];
//!
//! let target = NdArray::from_vec(vec![0.0, 1.0], &[2]).unwrap();
//! MeanSquaredError.evaluate(&mut graph, y, &target).unwrap();
//! graph.backward(y).unwrap();
//! assert!(opt.update(&mut graph).unwrap());
//!
//! graph.clear();
//! graph.clear_parameter_grads();
//! ```

pub mod autodiff;
pub mod config;
pub mod error;
pub mod functions;
pub mod loss;
pub mod operations;
pub mod optimizers;
pub mod random;
pub mod scalar;
pub mod serialize;
pub mod strides;
pub mod tensor;

pub use autodiff::{BackwardReport, ComputationGraph, NodeId, Variable};
pub use error::TensorError;
pub use functions::Function;
pub use scalar::{Real, Scalar};
pub use tensor::{INFER, NdArray};
