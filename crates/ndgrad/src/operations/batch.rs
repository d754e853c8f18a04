//! Conversion between batch slots and standalone arrays.

use crate::error::TensorError;
use crate::tensor::NdArray;

/// Split a batched array into one single-batch array per slot.
///
/// # Examples
///
/// ```
/// use ndgrad::NdArray;
/// use ndgrad::operations::divide_arrays;
///
/// let a = NdArray::new(vec![1.0, 2.0, 3.0, 4.0], &[2], 2).unwrap();
/// let slots = divide_arrays(&a);
/// assert_eq!(slots.len(), 2);
/// assert_eq!(slots[1].data(), &[3.0, 4.0]);
/// ```
pub fn divide_arrays(a: &NdArray) -> Vec<NdArray> {
    (0..a.batch_count())
        .map(|b| {
            NdArray::from_parts(
                a.shape(),
                1,
                a.batch_data(b).to_vec(),
                a.batch_grad(b).to_vec(),
            )
        })
        .collect()
}

/// Stack equally-shaped arrays into one batched array.
///
/// The batch count of the result is the sum of the inputs' batch counts.
///
/// # Errors
///
/// - `InvalidArgument` if `arrays` is empty.
/// - `ShapeMismatch` if the shapes differ.
pub fn from_arrays(arrays: &[NdArray]) -> Result<NdArray, TensorError> {
    let first = arrays
        .first()
        .ok_or_else(|| TensorError::InvalidArgument("no arrays to stack".to_string()))?;
    let shape = first.shape();

    let mut batch_count = 0;
    let mut data = Vec::new();
    let mut grad = Vec::new();
    for a in arrays {
        if a.shape() != shape {
            return Err(TensorError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: a.shape().to_vec(),
            });
        }
        batch_count += a.batch_count();
        data.extend_from_slice(a.data());
        grad.extend_from_slice(a.grad());
    }
    Ok(NdArray::from_parts(shape, batch_count, data, grad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divide_and_stack() {
        let mut a = NdArray::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3], 2).unwrap();
        a.fill_grad(1.0);
        let slots = divide_arrays(&a);
        assert_eq!(slots[0].data(), &[1.0, 2.0, 3.0]);
        assert_eq!(slots[0].batch_count(), 1);
        assert_eq!(slots[1].grad(), &[1.0, 1.0, 1.0]);

        let stacked = from_arrays(&slots).unwrap();
        assert_eq!(stacked, a);
    }

    #[test]
    fn test_from_arrays_errors() {
        assert!(matches!(
            from_arrays(&[]),
            Err(TensorError::InvalidArgument(_))
        ));
        let a = NdArray::zeros(&[2], 1);
        let b = NdArray::zeros(&[3], 1);
        assert!(matches!(
            from_arrays(&[a, b]),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }
}
