//! Tensor-level kernels over [`NdArray`](crate::NdArray).
//!
//! These functions work on plain arrays and record nothing in a graph.
//! Stages in [`functions`](crate::functions) call them for their forward
//! pass and add the matching backward.
//!
//! ```text
//! sum          reduce over axes (data and grad)
//! split        cut one axis into parts
//! concatenate  join two arrays along one axis
//! divide_arrays / from_arrays   batch slots <-> single arrays
//! ```

mod batch;
mod reduce;
mod split;

pub use batch::{divide_arrays, from_arrays};
pub use reduce::sum;
pub(crate) use reduce::reduction_index_map;
pub use split::{concatenate, split};
