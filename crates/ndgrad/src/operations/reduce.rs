//! Axis reduction.

use crate::config::VALIDATION;
use crate::error::TensorError;
use crate::scalar::{Real, Scalar};
use crate::strides::{cartesian_to_linear, compute_strides, linear_to_cartesian};
use crate::tensor::NdArray;

/// Resolve the axes to reduce: all axes when empty, otherwise sorted.
fn resolve_axes(rank: usize, axes: &[usize]) -> Result<Vec<usize>, TensorError> {
    if axes.is_empty() {
        return Ok((0..rank).collect());
    }
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    for (i, &axis) in sorted.iter().enumerate() {
        if axis >= rank {
            return Err(TensorError::InvalidAxis { axis, rank });
        }
        if VALIDATION && i > 0 && sorted[i - 1] == axis {
            return Err(TensorError::InvalidAxis { axis, rank });
        }
    }
    Ok(sorted)
}

/// Output shape of a reduction, with size-1 axes kept at the reduced positions.
pub(crate) fn reduced_shape(
    shape: &[usize],
    axes: &[usize],
) -> Result<(Vec<usize>, Vec<usize>), TensorError> {
    let axes = resolve_axes(shape.len(), axes)?;
    let kept: Vec<usize> = shape
        .iter()
        .enumerate()
        .map(|(i, &d)| if axes.contains(&i) { 1 } else { d })
        .collect();
    Ok((kept, axes))
}

/// For every element of one batch slot, the offset it is summed into.
///
/// The offsets index the keep-dims output shape, which has the same flat
/// layout as the squeezed one.
pub(crate) fn reduction_index_map(
    shape: &[usize],
    axes: &[usize],
) -> Result<Vec<usize>, TensorError> {
    let (kept, axes) = reduced_shape(shape, axes)?;
    let out_strides = compute_strides(&kept);
    let length: usize = shape.iter().product();

    let map = (0..length)
        .map(|linear| {
            let mut idx = linear_to_cartesian(linear, shape);
            for &axis in &axes {
                idx[axis] = 0;
            }
            cartesian_to_linear(&idx, &out_strides)
        })
        .collect();
    Ok(map)
}

/// Sum over the given axes (all axes when `axes` is empty).
///
/// Values and gradients are both accumulated. With `keep_dims` the reduced
/// axes stay in the shape with size 1; otherwise they are removed.
///
/// # Errors
///
/// `InvalidAxis` if an axis is out of range or listed twice.
///
/// # Examples
///
/// ```
/// use ndgrad::NdArray;
/// use ndgrad::operations::sum;
///
/// let a = NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// let s = sum(&a, false, &[0]).unwrap();
/// assert_eq!(s.shape(), &[3]);
/// assert_eq!(s.data(), &[5.0, 7.0, 9.0]);
///
/// let k = sum(&a, true, &[1]).unwrap();
/// assert_eq!(k.shape(), &[2, 1]);
/// assert_eq!(k.data(), &[6.0, 15.0]);
/// ```
pub fn sum(a: &NdArray, keep_dims: bool, axes: &[usize]) -> Result<NdArray, TensorError> {
    let (kept, axes) = reduced_shape(a.shape(), axes)?;
    let map = reduction_index_map(a.shape(), &axes)?;
    let out_len: usize = kept.iter().product();
    let batch_count = a.batch_count();

    let mut data = vec![Real::zero(); out_len * batch_count];
    let mut grad = vec![Real::zero(); out_len * batch_count];
    for b in 0..batch_count {
        let src = b * a.len();
        let dst = b * out_len;
        for (i, &target) in map.iter().enumerate() {
            data[dst + target] += a.data()[src + i];
            grad[dst + target] += a.grad()[src + i];
        }
    }

    let shape: Vec<usize> = if keep_dims {
        kept
    } else {
        kept.iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .collect()
    };
    Ok(NdArray::from_parts(&shape, batch_count, data, grad))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(n: usize) -> Vec<Real> {
        (1..=n).map(Real::from_usize).collect()
    }

    #[test]
    fn test_sum_axis0() {
        let a = NdArray::from_vec(iota(6), &[2, 3]).unwrap();
        let s = sum(&a, false, &[0]).unwrap();
        assert_eq!(s.shape(), &[3]);
        assert_eq!(s.data(), &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_sum_all_axes() {
        let a = NdArray::from_vec(iota(6), &[2, 3]).unwrap();
        let s = sum(&a, false, &[]).unwrap();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.data(), &[21.0]);

        let k = sum(&a, true, &[]).unwrap();
        assert_eq!(k.shape(), &[1, 1]);
    }

    #[test]
    fn test_sum_keep_dims_positions() {
        let a = NdArray::from_vec(iota(24), &[2, 3, 4]).unwrap();
        let s = sum(&a, true, &[2, 0]).unwrap();
        assert_eq!(s.shape(), &[1, 3, 1]);
        // Row j collects a[i, j, k] for all i, k.
        let expected: Vec<Real> = (0..3)
            .map(|j| {
                let mut acc = 0.0;
                for i in 0..2 {
                    for k in 0..4 {
                        acc += a.get(0, &[i, j, k]).unwrap();
                    }
                }
                acc
            })
            .collect();
        assert_eq!(s.data(), expected.as_slice());
    }

    #[test]
    fn test_sum_per_batch() {
        let a = NdArray::new(iota(12), &[2, 3], 2).unwrap();
        let s = sum(&a, false, &[1]).unwrap();
        assert_eq!(s.batch_count(), 2);
        assert_eq!(s.data(), &[6.0, 15.0, 24.0, 33.0]);
    }

    #[test]
    fn test_sum_accumulates_grad() {
        let mut a = NdArray::from_vec(iota(4), &[2, 2]).unwrap();
        a.set_grad(&[1.0, 1.0, 2.0, 2.0]).unwrap();
        let s = sum(&a, false, &[1]).unwrap();
        assert_eq!(s.grad(), &[2.0, 4.0]);
    }

    #[test]
    fn test_sum_invalid_axes() {
        let a = NdArray::zeros(&[2, 3], 1);
        assert!(matches!(
            sum(&a, false, &[2]),
            Err(TensorError::InvalidAxis { axis: 2, rank: 2 })
        ));
        assert!(matches!(
            sum(&a, false, &[1, 1]),
            Err(TensorError::InvalidAxis { axis: 1, .. })
        ));
    }

    #[test]
    fn test_reduction_index_map() {
        let map = reduction_index_map(&[2, 3], &[0]).unwrap();
        assert_eq!(map, vec![0, 1, 2, 0, 1, 2]);
        let map = reduction_index_map(&[2, 3], &[1]).unwrap();
        assert_eq!(map, vec![0, 0, 0, 1, 1, 1]);
    }
}
