//! Error types for ndgrad.

use crate::autodiff::NodeId;
use thiserror::Error;

/// Errors that can occur in tensor, graph and optimizer operations.
#[derive(Debug, Error)]
pub enum TensorError {
    /// Operand shapes are incompatible.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Buffer length does not match the shape.
    #[error("length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Operand batch counts differ.
    #[error("batch mismatch: expected {expected} batches, got {actual}")]
    BatchMismatch { expected: usize, actual: usize },

    /// Axis out of range or duplicated.
    #[error("invalid axis {axis} for tensor of rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// Split point outside the axis or not strictly increasing.
    #[error("invalid cut {cut} for axis of size {size}")]
    InvalidCut { cut: usize, size: usize },

    /// Element access out of range.
    #[error("index out of range: index {index} is out of range for dimension {dim_size}")]
    IndexOutOfRange { index: usize, dim_size: usize },

    /// Wrong number of indices provided.
    #[error("wrong number of indices: expected {expected}, got {actual}")]
    WrongNumberOfIndices { expected: usize, actual: usize },

    /// More than one axis marked for inference in a reshape.
    #[error("ambiguous reshape: more than one inferred axis in {shape:?}")]
    AmbiguousReshape { shape: Vec<isize> },

    /// The inferred axis does not divide the element count.
    #[error("reshape {shape:?} does not divide {length} elements")]
    NonDividingReshape { shape: Vec<isize>, length: usize },

    /// Argument rejected by an operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A node was released by more consumers than were recorded.
    #[error("use count underflow at node {node:?}")]
    UseCountUnderflow { node: NodeId },

    /// Node id does not exist in the graph.
    #[error("unknown node {node:?}")]
    UnknownNode { node: NodeId },

    /// Node id belongs to a graph generation that has been cleared.
    #[error("stale node {node:?}: graph was cleared")]
    StaleNode { node: NodeId },

    /// Persistence failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
