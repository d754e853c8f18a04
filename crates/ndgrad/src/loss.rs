//! Loss functions.
//!
//! A loss reads the prediction node, returns the scalar loss and seeds the
//! prediction's gradient with dLoss/dPrediction. The caller then runs
//! [`ComputationGraph::backward`] from the prediction:
//!
//! ```text
//! prediction ──evaluate(target)──► loss value
//!      │ grad seeded
//!      └──► graph.backward(prediction)
//! ```

use crate::autodiff::{ComputationGraph, NodeId};
use crate::error::TensorError;
use crate::functions::check_compatible;
use crate::scalar::{Real, Scalar};
use crate::tensor::NdArray;

/// A loss over one prediction node.
pub trait LossFunction {
    /// What the prediction is compared against.
    type Target: ?Sized;

    /// Compute the loss and seed the prediction's gradient.
    ///
    /// # Errors
    ///
    /// Lookup errors for `prediction`, or a target that does not fit it.
    fn evaluate(
        &self,
        graph: &mut ComputationGraph,
        prediction: NodeId,
        target: &Self::Target,
    ) -> Result<Real, TensorError>;
}

/// Mean of squared differences over every element of every batch slot.
///
/// `loss = Σ (x - t)² / N`, `dloss/dx = 2 (x - t) / N`.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::loss::{LossFunction, MeanSquaredError};
///
/// let mut graph = ComputationGraph::new();
/// let x = graph.leaf(NdArray::from_vec(vec![1.0, 3.0], &[2]).unwrap());
/// let t = NdArray::from_vec(vec![0.0, 1.0], &[2]).unwrap();
///
/// let loss = MeanSquaredError.evaluate(&mut graph, x, &t).unwrap();
/// assert_eq!(loss, 2.5);
/// assert_eq!(graph.grad(x).unwrap(), &[1.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl LossFunction for MeanSquaredError {
    type Target = NdArray;

    fn evaluate(
        &self,
        graph: &mut ComputationGraph,
        prediction: NodeId,
        target: &NdArray,
    ) -> Result<Real, TensorError> {
        let x = graph.array(prediction)?;
        check_compatible(x, target)?;
        if x.data().len() != target.data().len() {
            return Err(TensorError::LengthMismatch {
                expected: x.data().len(),
                actual: target.data().len(),
            });
        }

        let n = Real::from_usize(x.data().len());
        let two = Real::from_f64(2.0);
        let mut loss = Real::zero();
        let mut grad = Vec::with_capacity(x.data().len());
        for (&p, &q) in x.data().iter().zip(target.data()) {
            let diff = p - q;
            loss += diff * diff;
            grad.push(two * diff / n);
        }
        graph.set_grad(prediction, &grad)?;
        Ok(loss / n)
    }
}

/// Softmax over each batch slot followed by the negative log-likelihood of
/// the labelled class, averaged over the batch.
///
/// The prediction holds unnormalized scores, one slot per sample; `labels`
/// has one class index per batch slot. The seeded gradient is
/// `(softmax - onehot) / batch_count`.
///
/// # Examples
///
/// ```
/// use ndgrad::{ComputationGraph, NdArray};
/// use ndgrad::loss::{LossFunction, SoftmaxCrossEntropy};
///
/// let mut graph = ComputationGraph::new();
/// let x = graph.leaf(NdArray::new(vec![0.0, 0.0, 5.0, -5.0], &[2], 2).unwrap());
/// let loss = SoftmaxCrossEntropy.evaluate(&mut graph, x, &[1, 0]).unwrap();
/// assert!(loss > 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxCrossEntropy;

impl LossFunction for SoftmaxCrossEntropy {
    type Target = [usize];

    fn evaluate(
        &self,
        graph: &mut ComputationGraph,
        prediction: NodeId,
        labels: &[usize],
    ) -> Result<Real, TensorError> {
        let x = graph.array(prediction)?;
        let batches = x.batch_count();
        if labels.len() != batches {
            return Err(TensorError::BatchMismatch {
                expected: batches,
                actual: labels.len(),
            });
        }

        let classes = x.len();
        let scale = Real::one() / Real::from_usize(batches);
        let mut loss = Real::zero();
        let mut grad = Vec::with_capacity(x.data().len());
        for (b, &label) in labels.iter().enumerate() {
            if label >= classes {
                return Err(TensorError::IndexOutOfRange {
                    index: label,
                    dim_size: classes,
                });
            }
            let scores = x.batch_data(b);
            let max = scores.iter().copied().fold(scores[0], |m, s| if s > m { s } else { m });
            let exps: Vec<Real> = scores.iter().map(|&s| (s - max).exp()).collect();
            let total: Real = exps.iter().copied().sum();

            loss -= (exps[label] / total).ln();
            for (i, &e) in exps.iter().enumerate() {
                let onehot = if i == label { Real::one() } else { Real::zero() };
                grad.push((e / total - onehot) * scale);
            }
        }
        graph.set_grad(prediction, &grad)?;
        Ok(loss * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{Function, Linear};
    use approx::assert_relative_eq;

    #[test]
    fn test_mse_gradient_matches_difference_quotient() {
        let data = vec![0.3, -1.2, 2.0, 0.5];
        let target = NdArray::new(vec![0.0, 1.0, 1.5, -0.5], &[2], 2).unwrap();
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::new(data.clone(), &[2], 2).unwrap());
        MeanSquaredError.evaluate(&mut graph, x, &target).unwrap();
        let analytic = graph.grad(x).unwrap().to_vec();

        let eps = 1e-6;
        for i in 0..data.len() {
            let loss_at = |delta: Real| {
                let mut g = ComputationGraph::new();
                let mut d = data.clone();
                d[i] += delta;
                let id = g.leaf(NdArray::new(d, &[2], 2).unwrap());
                MeanSquaredError.evaluate(&mut g, id, &target).unwrap()
            };
            let numeric = (loss_at(eps) - loss_at(-eps)) / (2.0 * eps);
            assert_relative_eq!(analytic[i], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mse_shape_mismatch() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::zeros(&[2], 1));
        let t = NdArray::zeros(&[3], 1);
        assert!(matches!(
            MeanSquaredError.evaluate(&mut graph, x, &t),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_softmax_uniform_scores() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::zeros(&[4], 2));
        let loss = SoftmaxCrossEntropy.evaluate(&mut graph, x, &[0, 3]).unwrap();
        assert_relative_eq!(loss, (4.0 as Real).ln(), epsilon = 1e-12);

        let grad = graph.grad(x).unwrap();
        assert_relative_eq!(grad[0], (0.25 - 1.0) / 2.0, epsilon = 1e-12);
        assert_relative_eq!(grad[1], 0.25 / 2.0, epsilon = 1e-12);
        // Each slot's gradient sums to zero.
        assert_relative_eq!(grad[..4].iter().sum::<Real>(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(grad[4..].iter().sum::<Real>(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_large_scores_stay_finite() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::from_vec(vec![1000.0, 0.0], &[2]).unwrap());
        let loss = SoftmaxCrossEntropy.evaluate(&mut graph, x, &[0]).unwrap();
        assert!(loss.is_finite());
        assert_relative_eq!(loss, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_label_checks() {
        let mut graph = ComputationGraph::new();
        let x = graph.leaf(NdArray::zeros(&[3], 2));
        assert!(matches!(
            SoftmaxCrossEntropy.evaluate(&mut graph, x, &[0]),
            Err(TensorError::BatchMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            SoftmaxCrossEntropy.evaluate(&mut graph, x, &[0, 3]),
            Err(TensorError::IndexOutOfRange { index: 3, dim_size: 3 })
        ));
    }

    #[test]
    fn test_seeded_gradient_drives_backward() {
        let mut graph = ComputationGraph::new();
        let w = NdArray::from_vec(vec![2.0], &[1, 1]).unwrap();
        let mut linear = Linear::with_weights(&mut graph, w, None).unwrap();
        let x = graph.leaf(NdArray::scalar(3.0));
        let y = linear.forward(&mut graph, &[x]).unwrap()[0];

        // y = 6, target 4: dloss/dy = 2 * 2 = 4, dloss/dw = 4 * 3.
        let loss = MeanSquaredError
            .evaluate(&mut graph, y, &NdArray::from_vec(vec![4.0], &[1]).unwrap())
            .unwrap();
        assert_eq!(loss, 4.0);
        graph.backward(y).unwrap();
        assert_eq!(graph.grad(linear.weight()).unwrap(), &[12.0]);
    }
}
