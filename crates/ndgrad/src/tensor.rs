//! Batched N-dimensional array with paired value and gradient buffers.
//!
//! ```text
//! NdArray
//! ├── shape        [d0, d1, ..., dn]   (batch excluded)
//! ├── batch_count  B
//! ├── data         length * B          (row-major, batch slot b at b * length)
//! └── grad         length * B          (zero-initialized)
//! ```
//!
//! Shape-aware element access ([`NdArray::get`], [`NdArray::set`]) costs
//! O(rank) per call. Kernels iterate the flat buffers directly.

use crate::error::TensorError;
use crate::scalar::{Real, Scalar};
use crate::serialize::TensorData;
use crate::strides::{cartesian_to_linear, compute_strides};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Inline storage for shapes and strides.
pub type Shape = SmallVec<[usize; 4]>;

/// Reshape sentinel: the axis size is inferred from the others.
pub const INFER: isize = -1;

/// A batched n-dimensional array of [`Real`] values with a gradient buffer.
///
/// # Examples
///
/// ```
/// use ndgrad::NdArray;
///
/// let mut a = NdArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// assert_eq!(a.get(0, &[1, 0]).unwrap(), 4.0); // row-major: [1,0] is the fourth element
/// a.set(0, &[0, 2], 9.0).unwrap();
/// assert_eq!(a.data()[2], 9.0);
/// assert!(a.grad().iter().all(|&g| g == 0.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TensorData", try_from = "TensorData")]
pub struct NdArray {
    shape: Shape,
    strides: Shape,
    length: usize,
    batch_count: usize,
    data: Vec<Real>,
    grad: Vec<Real>,
    train_count: usize,
}

/// Reject layouts with no batch slot or a zero-sized dimension.
fn check_layout(shape: &[usize], batch_count: usize) -> Result<(), TensorError> {
    if batch_count == 0 {
        return Err(TensorError::InvalidArgument(
            "batch count must be at least 1".to_string(),
        ));
    }
    if shape.contains(&0) {
        return Err(TensorError::InvalidArgument(format!(
            "zero-sized dimension in shape {shape:?}"
        )));
    }
    Ok(())
}

impl NdArray {
    /// Create an array from a flat buffer holding `batch_count` slots.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `batch_count` is zero or a dimension is zero.
    /// - `LengthMismatch` if `data.len() != product(shape) * batch_count`.
    pub fn new(data: Vec<Real>, shape: &[usize], batch_count: usize) -> Result<Self, TensorError> {
        check_layout(shape, batch_count)?;
        let length: usize = shape.iter().product();
        if data.len() != length * batch_count {
            return Err(TensorError::LengthMismatch {
                expected: length * batch_count,
                actual: data.len(),
            });
        }
        let grad = vec![Real::zero(); data.len()];
        Ok(Self {
            shape: Shape::from_slice(shape),
            strides: Shape::from_vec(compute_strides(shape)),
            length,
            batch_count,
            data,
            grad,
            train_count: 0,
        })
    }

    /// Create a single-batch array from data and shape.
    ///
    /// # Errors
    ///
    /// Same as [`NdArray::new`].
    pub fn from_vec(data: Vec<Real>, shape: &[usize]) -> Result<Self, TensorError> {
        Self::new(data, shape, 1)
    }

    /// Create a zero-filled array.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndgrad::NdArray;
    ///
    /// let a = NdArray::zeros(&[2, 3], 4);
    /// assert_eq!(a.len(), 6);
    /// assert_eq!(a.data().len(), 24);
    /// ```
    ///
    /// # Panics
    ///
    /// If `batch_count` or a dimension is zero. [`NdArray::new`] reports the
    /// same layouts as `InvalidArgument` instead.
    pub fn zeros(shape: &[usize], batch_count: usize) -> Self {
        if let Err(err) = check_layout(shape, batch_count) {
            panic!("{err}");
        }
        let length: usize = shape.iter().product();
        Self {
            shape: Shape::from_slice(shape),
            strides: Shape::from_vec(compute_strides(shape)),
            length,
            batch_count,
            data: vec![Real::zero(); length * batch_count],
            grad: vec![Real::zero(); length * batch_count],
            train_count: 0,
        }
    }

    /// Assemble an array from already-validated buffers.
    pub(crate) fn from_parts(
        shape: &[usize],
        batch_count: usize,
        data: Vec<Real>,
        grad: Vec<Real>,
    ) -> Self {
        let length: usize = shape.iter().product();
        debug_assert_eq!(data.len(), length * batch_count);
        debug_assert_eq!(grad.len(), data.len());
        Self {
            shape: Shape::from_slice(shape),
            strides: Shape::from_vec(compute_strides(shape)),
            length,
            batch_count,
            data,
            grad,
            train_count: 0,
        }
    }

    /// Zero-filled array with the shape and batch count of `other`.
    pub fn zeros_like(other: &Self) -> Self {
        Self::zeros(&other.shape, other.batch_count)
    }

    /// Scalar (rank 0) array.
    pub fn scalar(value: Real) -> Self {
        let mut a = Self::zeros(&[], 1);
        a.data[0] = value;
        a
    }

    /// Create an array whose flat element `i` is `f(i)`.
    ///
    /// # Panics
    ///
    /// Same layouts as [`NdArray::zeros`].
    pub fn from_fn<F>(shape: &[usize], batch_count: usize, mut f: F) -> Self
    where
        F: FnMut(usize) -> Real,
    {
        let mut a = Self::zeros(shape, batch_count);
        for (i, x) in a.data.iter_mut().enumerate() {
            *x = f(i);
        }
        a
    }

    /// Get the shape (batch excluded).
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the rank (number of dimensions).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements in one batch slot (`product(shape)`).
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Check if the array holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of batch slots.
    #[inline]
    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Row-major strides of one batch slot.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Flat value buffer.
    #[inline]
    pub fn data(&self) -> &[Real] {
        &self.data
    }

    /// Mutable flat value buffer.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [Real] {
        &mut self.data
    }

    /// Flat gradient buffer.
    #[inline]
    pub fn grad(&self) -> &[Real] {
        &self.grad
    }

    /// Mutable flat gradient buffer.
    #[inline]
    pub fn grad_mut(&mut self) -> &mut [Real] {
        &mut self.grad
    }

    /// Values and gradients at once, for in-place update rules.
    #[inline]
    pub fn data_and_grad_mut(&mut self) -> (&mut [Real], &[Real]) {
        (&mut self.data, &self.grad)
    }

    /// Values of one batch slot.
    ///
    /// # Panics
    ///
    /// If `batch >= batch_count()`.
    pub fn batch_data(&self, batch: usize) -> &[Real] {
        &self.data[batch * self.length..(batch + 1) * self.length]
    }

    /// Gradients of one batch slot.
    ///
    /// # Panics
    ///
    /// If `batch >= batch_count()`.
    pub fn batch_grad(&self, batch: usize) -> &[Real] {
        &self.grad[batch * self.length..(batch + 1) * self.length]
    }

    /// Number of backward accumulations since the last [`NdArray::clear_grad`].
    #[inline]
    pub fn train_count(&self) -> usize {
        self.train_count
    }

    fn offset(&self, batch: usize, indices: &[usize]) -> Result<usize, TensorError> {
        if indices.len() != self.ndim() {
            return Err(TensorError::WrongNumberOfIndices {
                expected: self.ndim(),
                actual: indices.len(),
            });
        }
        if batch >= self.batch_count {
            return Err(TensorError::IndexOutOfRange {
                index: batch,
                dim_size: self.batch_count,
            });
        }
        for (&idx, &dim) in indices.iter().zip(self.shape.iter()) {
            if idx >= dim {
                return Err(TensorError::IndexOutOfRange {
                    index: idx,
                    dim_size: dim,
                });
            }
        }
        Ok(batch * self.length + cartesian_to_linear(indices, &self.strides))
    }

    /// Get a value by batch index and cartesian indices.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` or `WrongNumberOfIndices`.
    pub fn get(&self, batch: usize, indices: &[usize]) -> Result<Real, TensorError> {
        Ok(self.data[self.offset(batch, indices)?])
    }

    /// Set a value by batch index and cartesian indices.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` or `WrongNumberOfIndices`.
    pub fn set(&mut self, batch: usize, indices: &[usize], value: Real) -> Result<(), TensorError> {
        let offset = self.offset(batch, indices)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Get a gradient element by batch index and cartesian indices.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` or `WrongNumberOfIndices`.
    pub fn get_grad(&self, batch: usize, indices: &[usize]) -> Result<Real, TensorError> {
        Ok(self.grad[self.offset(batch, indices)?])
    }

    /// Reshape in place. One axis may be [`INFER`].
    ///
    /// The buffers are not touched; only shape and strides change.
    ///
    /// # Errors
    ///
    /// - `AmbiguousReshape` if more than one axis is [`INFER`].
    /// - `NonDividingReshape` if the inferred axis does not divide the length.
    /// - `ShapeMismatch` if the element count changes.
    /// - `InvalidArgument` for sizes that are zero or negative (other than [`INFER`]).
    ///
    /// # Examples
    ///
    /// ```
    /// use ndgrad::{NdArray, INFER};
    ///
    /// let mut a = NdArray::from_vec((0..12).map(|i| i as ndgrad::Real).collect(), &[12]).unwrap();
    /// a.reshape(&[3, INFER]).unwrap();
    /// assert_eq!(a.shape(), &[3, 4]);
    /// assert!(a.reshape(&[INFER, INFER]).is_err());
    /// assert!(a.reshape(&[5, INFER]).is_err());
    /// ```
    pub fn reshape(&mut self, shape: &[isize]) -> Result<(), TensorError> {
        let mut inferred = None;
        let mut known = 1usize;
        for (i, &dim) in shape.iter().enumerate() {
            if dim == INFER {
                if inferred.is_some() {
                    return Err(TensorError::AmbiguousReshape {
                        shape: shape.to_vec(),
                    });
                }
                inferred = Some(i);
            } else if dim <= 0 {
                return Err(TensorError::InvalidArgument(format!(
                    "invalid dimension {dim} in reshape {shape:?}"
                )));
            } else {
                known = known.checked_mul(dim as usize).ok_or_else(|| {
                    TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        actual: shape.iter().map(|&d| d.max(0) as usize).collect(),
                    }
                })?;
            }
        }

        let mut new_shape: Shape = shape.iter().map(|&d| d.max(0) as usize).collect();
        match inferred {
            Some(axis) => {
                if self.length % known != 0 {
                    return Err(TensorError::NonDividingReshape {
                        shape: shape.to_vec(),
                        length: self.length,
                    });
                }
                new_shape[axis] = self.length / known;
            }
            None => {
                if known != self.length {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        actual: new_shape.to_vec(),
                    });
                }
            }
        }

        self.strides = Shape::from_vec(compute_strides(&new_shape));
        self.shape = new_shape;
        Ok(())
    }

    /// Fill all values.
    pub fn fill(&mut self, value: Real) {
        self.data.fill(value);
    }

    /// Fill all gradients.
    pub fn fill_grad(&mut self, value: Real) {
        self.grad.fill(value);
    }

    /// Replace the gradient buffer contents.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if `grad` has the wrong length.
    pub fn set_grad(&mut self, grad: &[Real]) -> Result<(), TensorError> {
        if grad.len() != self.grad.len() {
            return Err(TensorError::LengthMismatch {
                expected: self.grad.len(),
                actual: grad.len(),
            });
        }
        self.grad.copy_from_slice(grad);
        Ok(())
    }

    /// Add a contribution into the gradient buffer.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if `contribution` has the wrong length.
    pub fn accumulate_grad(&mut self, contribution: &[Real]) -> Result<(), TensorError> {
        if contribution.len() != self.grad.len() {
            return Err(TensorError::LengthMismatch {
                expected: self.grad.len(),
                actual: contribution.len(),
            });
        }
        for (g, &c) in self.grad.iter_mut().zip(contribution) {
            *g += c;
        }
        Ok(())
    }

    /// Zero the gradient buffer and the accumulation counter.
    pub fn clear_grad(&mut self) {
        self.grad.fill(Real::zero());
        self.train_count = 0;
    }

    /// Record one more backward accumulation.
    pub fn count_up(&mut self) {
        self.train_count += 1;
    }

    /// Average the accumulated gradient over the recorded accumulations.
    ///
    /// Returns `false` (and leaves the gradient alone) when nothing was
    /// accumulated.
    pub fn reduce(&mut self) -> bool {
        if self.train_count == 0 {
            return false;
        }
        let count = Real::from_usize(self.train_count);
        for g in &mut self.grad {
            *g /= count;
        }
        true
    }

    /// Apply `f` to every value, producing a fresh array with zero gradient.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(Real) -> Real,
    {
        let mut out = Self::zeros_like(self);
        for (o, &x) in out.data.iter_mut().zip(&self.data) {
            *o = f(x);
        }
        out
    }

    /// Shape and batch summary such as `[2,3]x4batch`.
    pub fn size_string(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(ToString::to_string).collect();
        let mut s = format!("[{}]", dims.join(","));
        if self.batch_count > 1 {
            s.push_str(&format!("x{}batch", self.batch_count));
        }
        s
    }
}

fn fmt_block(f: &mut fmt::Formatter<'_>, data: &[Real], shape: &[usize], depth: usize) -> fmt::Result {
    match shape {
        [] => write!(f, "{}", data[0]),
        [_] => {
            write!(f, "[")?;
            for (i, x) in data.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{x}")?;
            }
            write!(f, "]")
        }
        [outer, rest @ ..] => {
            let chunk: usize = rest.iter().product();
            write!(f, "[")?;
            for i in 0..*outer {
                if i > 0 {
                    write!(f, "\n{}", " ".repeat(depth + 1))?;
                }
                fmt_block(f, &data[i * chunk..(i + 1) * chunk], rest, depth + 1)?;
            }
            write!(f, "]")
        }
    }
}

impl fmt::Display for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.batch_count == 1 {
            return fmt_block(f, &self.data, &self.shape, 0);
        }
        for b in 0..self.batch_count {
            if b > 0 {
                writeln!(f, ",")?;
            }
            write!(f, "{{")?;
            fmt_block(f, self.batch_data(b), &self.shape, 1)?;
            write!(f, "}}")?;
        }
        Ok(())
    }
}
