//! Scalar trait for tensor element types.
//!
//! The engine is written against [`Real`], which resolves to `f64` by default
//! and to `f32` when the `f32` feature is enabled. Code that needs numeric
//! constants or conversions goes through [`Scalar`] so it stays
//! precision-agnostic.

use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Floating point type used for every value and gradient buffer.
#[cfg(not(feature = "f32"))]
pub type Real = f64;

/// Floating point type used for every value and gradient buffer.
#[cfg(feature = "f32")]
pub type Real = f32;

/// Trait for scalar types supported by ndgrad.
pub trait Scalar:
    Copy
    + Debug
    + Display
    + Default
    + PartialOrd
    + Sum
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + 'static
{
    /// Returns the additive identity (zero).
    fn zero() -> Self {
        Self::default()
    }

    /// Returns the multiplicative identity (one).
    fn one() -> Self;

    /// Lossy conversion from `f64`.
    fn from_f64(value: f64) -> Self;

    /// Conversion from a count, used for averaging.
    fn from_usize(value: usize) -> Self;
}

impl Scalar for f64 {
    fn one() -> Self {
        1.0
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn from_usize(value: usize) -> Self {
        value as f64
    }
}

impl Scalar for f32 {
    fn one() -> Self {
        1.0
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn from_usize(value: usize) -> Self {
        value as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_one() {
        assert_eq!(f64::zero(), 0.0);
        assert_eq!(f64::one(), 1.0);
        assert_eq!(f32::zero(), 0.0);
        assert_eq!(f32::one(), 1.0);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(f32::from_f64(0.5), 0.5f32);
        assert_eq!(f64::from_usize(7), 7.0);
    }
}
