//! Axis-sum stage.

use super::{Function, GradFn, expect_inputs};
use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::operations::{self, reduction_index_map};
use crate::scalar::Real;

/// Sum over `axes` (all axes when empty).
///
/// Backward hands every input element the upstream gradient of the element
/// it was summed into, unscaled.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::functions::{Function, Sum};
///
/// let mut graph = ComputationGraph::new();
/// let x = graph.leaf(NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap());
/// let y = Sum::new(vec![0], false).forward(&mut graph, &[x]).unwrap()[0];
/// assert_eq!(graph.data(y).unwrap(), &[5.0, 7.0, 9.0]);
///
/// graph.backward_with_grad(y, &[1.0, 2.0, 3.0]).unwrap();
/// assert_eq!(graph.grad(x).unwrap(), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Sum {
    axes: Vec<usize>,
    keep_dims: bool,
}

impl Sum {
    /// Sum over `axes`, keeping reduced axes as size 1 when `keep_dims`.
    pub fn new(axes: Vec<usize>, keep_dims: bool) -> Self {
        Self { axes, keep_dims }
    }

    /// Sum over every axis.
    pub fn all() -> Self {
        Self::default()
    }
}

impl Function for Sum {
    fn name(&self) -> &str {
        "Sum"
    }

    fn forward(
        &mut self,
        graph: &mut ComputationGraph,
        inputs: &[NodeId],
    ) -> Result<Vec<NodeId>, TensorError> {
        let [x] = expect_inputs::<1>("Sum", inputs)?;
        let mut y = operations::sum(graph.array(x)?, self.keep_dims, &self.axes)?;
        // The output starts a fresh gradient.
        y.clear_grad();
        graph.apply("Sum", Box::new(self.clone()), &[x], vec![y])
    }
}

impl GradFn for Sum {
    fn backward(
        &self,
        graph: &ComputationGraph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Vec<(NodeId, Vec<Real>)>, TensorError> {
        let x = graph.array(inputs[0])?;
        let y = graph.array(outputs[0])?;
        let map = reduction_index_map(x.shape(), &self.axes)?;

        let mut gx = Vec::with_capacity(x.data().len());
        for batch in 0..x.batch_count() {
            let gy = y.batch_grad(batch);
            gx.extend(map.iter().map(|&target| gy[target]));
        }
        Ok(vec![(inputs[0], gx)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::forward_one;
    use crate::functions::testing::check_gradients;
    use crate::tensor::NdArray;

    #[test]
    fn test_sum_all_backward_broadcasts() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::new(vec![1.0, 2.0, 3.0, 4.0], &[2], 2).unwrap());
        let y = forward_one(&mut Sum::all(), &mut graph, &[x]).unwrap();
        assert_eq!(graph.data(y).unwrap(), &[3.0, 7.0]);
        graph.backward_with_grad(y, &[2.0, 5.0]).unwrap();
        assert_eq!(graph.grad(x).unwrap(), &[2.0, 2.0, 5.0, 5.0]);
    }

    #[test]
    fn test_forward_ignores_input_grad() {
        let mut graph = ComputationGraph::new();
        let mut a = NdArray::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        a.fill_grad(9.0);
        let x = graph.leaf(a);
        let y = forward_one(&mut Sum::all(), &mut graph, &[x]).unwrap();
        assert_eq!(graph.grad(y).unwrap(), &[0.0]);
    }

    #[test]
    fn test_keep_dims_gradients() {
        let x = vec![NdArray::new((0..12).map(|i| i as Real * 0.5).collect(), &[2, 3], 2).unwrap()];
        check_gradients(|| Box::new(Sum::new(vec![1], true)), &x, 1e-6);
        check_gradients(|| Box::new(Sum::new(vec![0], false)), &x, 1e-6);
    }

    #[test]
    fn test_invalid_axis_records_nothing() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::zeros(&[2], 1));
        assert!(matches!(
            forward_one(&mut Sum::new(vec![1], false), &mut graph, &[x]),
            Err(TensorError::InvalidAxis { axis: 1, rank: 1 })
        ));
        assert_eq!(graph.num_calls(), 0);
    }
}
