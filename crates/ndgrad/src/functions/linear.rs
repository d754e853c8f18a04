//! Fully connected layer.

use super::{Function, GradFn, expect_inputs};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};
use crate::tensor::NdArray;
use rand::Rng;

/// Affine map `y = W x + b` applied to every batch slot.
///
/// The weight has shape `[out_size, in_size]` and the bias `[out_size]`.
/// Inputs of any shape are accepted as long as one batch slot holds
/// `in_size` elements; the output has shape `[out_size]`.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::functions::{Function, Linear};
///
/// let mut graph = ComputationGraph::new();
/// let weight = NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let bias = NdArray::from_vec(vec![0.5, -0.5], &[2]).unwrap();
/// let mut layer = Linear::with_weights(&mut graph, weight, Some(bias)).unwrap();
///
/// let x = graph.leaf(NdArray::from_vec(vec![1.0, 0.0, -1.0], &[3]).unwrap());
/// let y = layer.forward(&mut graph, &[x]).unwrap()[0];
/// assert_eq!(graph.data(y).unwrap(), &[-1.5, -2.5]);
/// ```
#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    in_size: usize,
    out_size: usize,
    weight: NodeId,
    bias: Option<NodeId>,
}

impl Linear {
    /// Create a layer with He-initialized weights and a zero bias.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if either size is zero.
    pub fn new<R: Rng>(
        graph: &mut ComputationGraph,
        in_size: usize,
        out_size: usize,
        no_bias: bool,
        rng: &mut R,
    ) -> Result<Self, TensorError> {
        if in_size == 0 || out_size == 0 {
            return Err(TensorError::InvalidArgument(format!(
                "Linear needs positive sizes, got {in_size} -> {out_size}"
            )));
        }
        let weight = graph.parameter(NdArray::he_normal_with_rng(
            &[out_size, in_size],
            in_size,
            rng,
        ));
        let bias = (!no_bias).then(|| graph.parameter(NdArray::zeros(&[out_size], 1)));
        Ok(Self {
            name: "Linear".to_string(),
            in_size,
            out_size,
            weight,
            bias,
        })
    }

    /// Create a layer from explicit weight `[out, in]` and bias `[out]`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the weight is not a matrix, `ShapeMismatch` if
    /// the bias does not match its row count.
    pub fn with_weights(
        graph: &mut ComputationGraph,
        weight: NdArray,
        bias: Option<NdArray>,
    ) -> Result<Self, TensorError> {
        let &[out_size, in_size] = weight.shape() else {
            return Err(TensorError::InvalidArgument(format!(
                "linear weight must be [out, in], got {:?}",
                weight.shape()
            )));
        };
        if let Some(b) = &bias {
            if b.shape() != [out_size] {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![out_size],
                    actual: b.shape().to_vec(),
                });
            }
        }
        let weight = graph.parameter(weight);
        let bias = bias.map(|b| graph.parameter(b));
        Ok(Self {
            name: "Linear".to_string(),
            in_size,
            out_size,
            weight,
            bias,
        })
    }

    /// Rename the layer; the name is recorded with every call.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Weight parameter node.
    pub fn weight(&self) -> NodeId {
        self.weight
    }

    /// Bias parameter node, if the layer has one.
    pub fn bias(&self) -> Option<NodeId> {
        self.bias
    }

    /// Input elements per batch slot.
    pub fn in_size(&self) -> usize {
        self.in_size
    }

    /// Output elements per batch slot.
    pub fn out_size(&self) -> usize {
        self.out_size
    }
}

impl Function for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let [x] = expect_inputs::<1>(&self.name, inputs)?;
        let xa = graph.array(x)?;
        if xa.len() != self.in_size {
            return Err(TensorError::LengthMismatch {
                expected: self.in_size,
                actual: xa.len(),
            });
        }

        let w = graph.data(self.weight)?;
        let b = match self.bias {
            Some(id) => Some(graph.data(id)?),
            None => None,
        };
        let batch_count = xa.batch_count();
        let mut y = NdArray::zeros(&[self.out_size], batch_count);
        for batch in 0..batch_count {
            let xb = xa.batch_data(batch);
            let yb = &mut y.data_mut()[batch * self.out_size..(batch + 1) * self.out_size];
            for (o, out) in yb.iter_mut().enumerate() {
                let row = &w[o * self.in_size..(o + 1) * self.in_size];
                let mut acc: Real = row.iter().zip(xb).map(|(&wi, &xi)| wi * xi).sum();
                if let Some(b) = b {
                    acc += b[o];
                }
                *out = acc;
            }
        }

        let name = self.name.clone();
        graph.apply(name, Box::new(self.clone()), &[x], vec![y])
    }

    fn parameters(&self) -> Vec<NodeId> {
        std::iter::once(self.weight).chain(self.bias).collect()
    }
}

impl GradFn for Linear {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let x = graph.array(inputs[0])?;
        let gy = graph.grad(outputs[0])?;
        let w = graph.data(self.weight)?;
        let (n_in, n_out) = (self.in_size, self.out_size);

        let mut gx = vec![Real::zero(); x.data().len()];
        let mut gw = vec![Real::zero(); n_out * n_in];
        let mut gb = vec![Real::zero(); n_out];
        for batch in 0..x.batch_count() {
            let xb = x.batch_data(batch);
            let gyb = &gy[batch * n_out..(batch + 1) * n_out];
            let gxb = &mut gx[batch * n_in..(batch + 1) * n_in];
            for (o, &g) in gyb.iter().enumerate() {
                gb[o] += g;
                let row = &w[o * n_in..(o + 1) * n_in];
                let grow = &mut gw[o * n_in..(o + 1) * n_in];
                for i in 0..n_in {
                    gxb[i] += row[i] * g;
                    grow[i] += g * xb[i];
                }
            }
        }

        let mut contributions = vec![(inputs[0], gx), (self.weight, gw)];
        if let Some(bias) = self.bias {
            contributions.push((bias, gb));
        }
        Ok(contributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn layer(graph: &mut ComputationGraph) -> Linear {
        let w = NdArray::from_vec(vec![1.0, -1.0, 2.0, 0.5, 0.0, 3.0], &[2, 3]).unwrap();
        let b = NdArray::from_vec(vec![0.1, 0.2], &[2]).unwrap();
        Linear::with_weights(graph, w, Some(b)).unwrap()
    }

    #[test]
    fn test_new_shapes() {
        let mut graph = ComputationGraph::new();
        let mut rng = StdRng::seed_from_u64(0);
        let l = Linear::new(&mut graph, 4, 3, false, &mut rng).unwrap();
        assert_eq!(graph.array(l.weight()).unwrap().shape(), &[3, 4]);
        assert_eq!(graph.array(l.bias().unwrap()).unwrap().shape(), &[3]);
        assert_eq!(l.parameters().len(), 2);

        let nb = Linear::new(&mut graph, 4, 3, true, &mut rng).unwrap();
        assert!(nb.bias().is_none());
        assert_eq!(nb.parameters(), vec![nb.weight()]);

        assert!(matches!(
            Linear::new(&mut graph, 0, 3, false, &mut rng),
            Err(TensorError::InvalidArgument(_))
        ));
        assert!(matches!(
            Linear::new(&mut graph, 4, 0, false, &mut rng),
            Err(TensorError::InvalidArgument(_))
        ));
        // Rejected layers register nothing.
        assert_eq!(graph.num_parameters(), 3);
    }

    #[test]
    fn test_with_weights_validation() {
        let mut graph = ComputationGraph::new();
        assert!(Linear::with_weights(&mut graph, NdArray::zeros(&[6], 1), None).is_err());
        assert!(
            Linear::with_weights(
                &mut graph,
                NdArray::zeros(&[2, 3], 1),
                Some(NdArray::zeros(&[3], 1))
            )
            .is_err()
        );
    }

    #[test]
    fn test_forward_batched() {
        let mut graph = ComputationGraph::new();
        let mut l = layer(&mut graph);
        let x = graph.leaf(NdArray::new(vec![1.0, 2.0, 3.0, 0.0, 1.0, 0.0], &[3], 2).unwrap());
        let y = l.forward(&mut graph, &[x]).unwrap()[0];
        let ya = graph.array(y).unwrap();
        assert_eq!(ya.shape(), &[2]);
        assert_eq!(ya.batch_count(), 2);
        assert_relative_eq!(ya.data()[0], 1.0 - 2.0 + 6.0 + 0.1);
        assert_relative_eq!(ya.data()[1], 0.5 + 9.0 + 0.2);
        assert_relative_eq!(ya.data()[2], -1.0 + 0.1);
        assert_relative_eq!(ya.data()[3], 0.0 + 0.2);
    }

    #[test]
    fn test_forward_rejects_wrong_size() {
        let mut graph = ComputationGraph::new();
        let mut l = layer(&mut graph);
        let x = graph.leaf(NdArray::zeros(&[4], 1));
        assert!(matches!(
            l.forward(&mut graph, &[x]),
            Err(TensorError::LengthMismatch { expected: 3, actual: 4 })
        ));
    }

    #[test]
    fn test_backward() {
        let mut graph = ComputationGraph::new();
        let mut l = layer(&mut graph);
        let x = graph.leaf(NdArray::new(vec![1.0, 2.0, 3.0, 0.0, 1.0, 0.0], &[3], 2).unwrap());
        let y = l.forward(&mut graph, &[x]).unwrap()[0];
        graph.backward_with_grad(y, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        // gx_b = W^T gy_b
        let gx = graph.grad(x).unwrap();
        assert_eq!(gx, &[2.0, -1.0, 8.0, 5.0, -3.0, 18.0]);
        // gW = sum_b gy_b x_b^T
        let gw = graph.grad(l.weight()).unwrap();
        assert_eq!(gw, &[1.0, 5.0, 3.0, 2.0, 8.0, 6.0]);
        // gb = sum_b gy_b
        assert_eq!(graph.grad(l.bias().unwrap()).unwrap(), &[4.0, 6.0]);
        assert_eq!(graph.array(l.weight()).unwrap().train_count(), 1);
    }

    #[test]
    fn test_parameters_survive_clear() {
        let mut graph = ComputationGraph::new();
        let mut l = layer(&mut graph);
        for _ in 0..2 {
            let x = graph.leaf(NdArray::from_vec(vec![1.0, 1.0, 1.0], &[3]).unwrap());
            let y = l.forward(&mut graph, &[x]).unwrap()[0];
            graph.backward(y).unwrap();
            graph.clear();
        }
        assert_eq!(graph.grad(l.bias().unwrap()).unwrap(), &[2.0, 2.0]);
        assert_eq!(graph.array(l.weight()).unwrap().train_count(), 2);
    }
}
