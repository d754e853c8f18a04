//! Splitting and concatenation along one axis.

use crate::config::VALIDATION;
use crate::error::TensorError;
use crate::tensor::NdArray;

/// Sizes of the axes before and after `axis` (`outer`, `inner`).
fn outer_inner(shape: &[usize], axis: usize) -> (usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    (outer, inner)
}

/// Split `a` along `axis` at the given cut points.
///
/// Produces `cuts.len() + 1` arrays. Part `k` covers `[cuts[k-1], cuts[k])`
/// along the axis, with implicit bounds `0` and the axis size. Values and
/// gradients are copied.
///
/// # Errors
///
/// - `InvalidAxis` if `axis >= rank`.
/// - `InvalidCut` if a cut is not strictly inside the axis or the cuts are
///   not strictly increasing.
///
/// # Examples
///
/// ```
/// use ndgrad::NdArray;
/// use ndgrad::operations::split;
///
/// let a = NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let parts = split(&a, &[1], 1).unwrap();
/// assert_eq!(parts[0].shape(), &[2, 1]);
/// assert_eq!(parts[0].data(), &[1.0, 4.0]);
/// assert_eq!(parts[1].data(), &[2.0, 3.0, 5.0, 6.0]);
/// ```
pub fn split(a: &NdArray, cuts: &[usize], axis: usize) -> Result<Vec<NdArray>, TensorError> {
    let shape = a.shape();
    if axis >= shape.len() {
        return Err(TensorError::InvalidAxis {
            axis,
            rank: shape.len(),
        });
    }
    let dim = shape[axis];

    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0);
    for &cut in cuts {
        let prev = bounds[bounds.len() - 1];
        if cut == 0 || cut >= dim || cut <= prev {
            return Err(TensorError::InvalidCut { cut, size: dim });
        }
        bounds.push(cut);
    }
    bounds.push(dim);

    let (outer, inner) = outer_inner(shape, axis);
    let batch_count = a.batch_count();

    let parts = bounds
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0], w[1]);
            let width = end - start;
            let mut part_shape = shape.to_vec();
            part_shape[axis] = width;

            let part_len = outer * width * inner;
            let mut data = Vec::with_capacity(part_len * batch_count);
            let mut grad = Vec::with_capacity(part_len * batch_count);
            for b in 0..batch_count {
                let base = b * a.len();
                for o in 0..outer {
                    let from = base + (o * dim + start) * inner;
                    let to = from + width * inner;
                    data.extend_from_slice(&a.data()[from..to]);
                    grad.extend_from_slice(&a.grad()[from..to]);
                }
            }
            NdArray::from_parts(&part_shape, batch_count, data, grad)
        })
        .collect();
    Ok(parts)
}

/// Join two arrays along `axis`.
///
/// All other dimensions and the batch count must match. Values and gradients
/// are both joined.
///
/// # Errors
///
/// - `InvalidAxis` if `axis >= rank`.
/// - `ShapeMismatch` if ranks or non-axis dimensions differ.
/// - `BatchMismatch` if batch counts differ.
///
/// # Examples
///
/// ```
/// use ndgrad::NdArray;
/// use ndgrad::operations::concatenate;
///
/// let a = NdArray::from_vec(vec![1.0, 2.0], &[2, 1]).unwrap();
/// let b = NdArray::from_vec(vec![3.0, 4.0, 5.0, 6.0], &[2, 2]).unwrap();
/// let c = concatenate(&a, &b, 1).unwrap();
/// assert_eq!(c.shape(), &[2, 3]);
/// assert_eq!(c.data(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);
/// ```
pub fn concatenate(a: &NdArray, b: &NdArray, axis: usize) -> Result<NdArray, TensorError> {
    let (sa, sb) = (a.shape(), b.shape());
    if axis >= sa.len() {
        return Err(TensorError::InvalidAxis {
            axis,
            rank: sa.len(),
        });
    }
    if VALIDATION {
        let compatible = sa.len() == sb.len()
            && sa
                .iter()
                .zip(sb.iter())
                .enumerate()
                .all(|(i, (x, y))| i == axis || x == y);
        if !compatible {
            return Err(TensorError::ShapeMismatch {
                expected: sa.to_vec(),
                actual: sb.to_vec(),
            });
        }
        if a.batch_count() != b.batch_count() {
            return Err(TensorError::BatchMismatch {
                expected: a.batch_count(),
                actual: b.batch_count(),
            });
        }
    }

    let mut shape = sa.to_vec();
    shape[axis] = sa[axis] + sb[axis];
    let (outer, inner) = outer_inner(sa, axis);
    let chunk_a = sa[axis] * inner;
    let chunk_b = sb[axis] * inner;
    let batch_count = a.batch_count();

    let total = (a.len() + b.len()) * batch_count;
    let mut data = Vec::with_capacity(total);
    let mut grad = Vec::with_capacity(total);
    for batch in 0..batch_count {
        let (base_a, base_b) = (batch * a.len(), batch * b.len());
        for o in 0..outer {
            let ra = base_a + o * chunk_a..base_a + (o + 1) * chunk_a;
            let rb = base_b + o * chunk_b..base_b + (o + 1) * chunk_b;
            data.extend_from_slice(&a.data()[ra.clone()]);
            data.extend_from_slice(&b.data()[rb.clone()]);
            grad.extend_from_slice(&a.grad()[ra]);
            grad.extend_from_slice(&b.grad()[rb]);
        }
    }
    Ok(NdArray::from_parts(&shape, batch_count, data, grad))
}
