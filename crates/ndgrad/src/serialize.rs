//! Persistence of tensor values and trained parameters.
//!
//! Only values are stored. Gradients, train counts and graph links are
//! transient and start fresh after loading.
//!
//! ```text
//! NdArray ──From──► TensorData { shape, batch_count, data } ──serde_json──► text
//! graph + [NodeId] ──capture──► ParameterSet ──restore──► graph + [NodeId]
//! ```

use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::Real;
use crate::tensor::NdArray;
use serde::{Deserialize, Serialize};

/// Serializable value triple of an [`NdArray`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Dimension sizes, batch excluded.
    pub shape: Vec<usize>,
    /// Number of batch slots.
    pub batch_count: usize,
    /// Row-major values of every batch slot.
    pub data: Vec<Real>,
}

impl From<NdArray> for TensorData {
    fn from(array: NdArray) -> Self {
        Self {
            shape: array.shape().to_vec(),
            batch_count: array.batch_count(),
            data: array.data().to_vec(),
        }
    }
}

impl From<&NdArray> for TensorData {
    fn from(array: &NdArray) -> Self {
        Self {
            shape: array.shape().to_vec(),
            batch_count: array.batch_count(),
            data: array.data().to_vec(),
        }
    }
}

impl TryFrom<TensorData> for NdArray {
    type Error = TensorError;

    fn try_from(value: TensorData) -> Result<Self, Self::Error> {
        NdArray::new(value.data, &value.shape, value.batch_count)
    }
}

/// Values of a list of parameter nodes, in order.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::serialize::ParameterSet;
///
/// let mut graph = ComputationGraph::new();
/// let w = graph.parameter(NdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap());
///
/// let json = ParameterSet::capture(&graph, &[w]).unwrap().to_json().unwrap();
/// graph.array_mut(w).unwrap().fill(0.0);
///
/// ParameterSet::from_json(&json).unwrap().restore(&mut graph, &[w]).unwrap();
/// assert_eq!(graph.data(w).unwrap(), &[1.0, 2.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    tensors: Vec<TensorData>,
}

impl ParameterSet {
    /// Copy the values of `ids` out of `graph`.
    ///
    /// # Errors
    ///
    /// `UnknownNode` / `StaleNode` for ids the graph does not hold.
    pub fn capture(graph: &ComputationGraph, ids: &[NodeId]) -> Result<Self, TensorError> {
        let tensors = ids
            .iter()
            .map(|&id| graph.array(id).map(TensorData::from))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("captured {} parameter tensors", tensors.len());
        Ok(Self { tensors })
    }

    /// Write the stored values back into `ids`, in order.
    ///
    /// Gradients of the targets are left untouched. Nothing is written
    /// unless every target matches.
    ///
    /// # Errors
    ///
    /// - `LengthMismatch` if the number of ids differs from the stored count.
    /// - `ShapeMismatch` / `BatchMismatch` if a target has a different layout.
    pub fn restore(&self, graph: &mut ComputationGraph, ids: &[NodeId]) -> Result<(), TensorError> {
        if ids.len() != self.tensors.len() {
            return Err(TensorError::LengthMismatch {
                expected: self.tensors.len(),
                actual: ids.len(),
            });
        }
        for (tensor, &id) in self.tensors.iter().zip(ids) {
            let target = graph.array(id)?;
            if target.shape() != tensor.shape.as_slice() {
                return Err(TensorError::ShapeMismatch {
                    expected: tensor.shape.clone(),
                    actual: target.shape().to_vec(),
                });
            }
            if target.batch_count() != tensor.batch_count {
                return Err(TensorError::BatchMismatch {
                    expected: tensor.batch_count,
                    actual: target.batch_count(),
                });
            }
            if target.data().len() != tensor.data.len() {
                return Err(TensorError::LengthMismatch {
                    expected: target.data().len(),
                    actual: tensor.data.len(),
                });
            }
        }
        for (tensor, &id) in self.tensors.iter().zip(ids) {
            graph.array_mut(id)?.data_mut().copy_from_slice(&tensor.data);
        }
        log::debug!("restored {} parameter tensors", ids.len());
        Ok(())
    }

    /// Stored tensors in capture order.
    pub fn tensors(&self) -> &[TensorData] {
        &self.tensors
    }

    /// Number of stored tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, TensorError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON produced by [`ParameterSet::to_json`].
    ///
    /// # Errors
    ///
    /// `Serialization` on malformed input.
    pub fn from_json(json: &str) -> Result<Self, TensorError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Encode a single array's values as JSON.
///
/// # Errors
///
/// `Serialization` if encoding fails.
pub fn to_json(array: &NdArray) -> Result<String, TensorError> {
    Ok(serde_json::to_string(&TensorData::from(array))?)
}

/// Decode an array from JSON produced by [`to_json`].
///
/// # Errors
///
/// `Serialization` on malformed input, or the layout errors of
/// [`NdArray::new`].
pub fn from_json(json: &str) -> Result<NdArray, TensorError> {
    let data: TensorData = serde_json::from_str(json)?;
    NdArray::try_from(data)
}
