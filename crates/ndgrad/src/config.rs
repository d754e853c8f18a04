//! Build-time configuration resolved from cargo features.
//!
//! | Feature     | Effect                                                    |
//! |-------------|-----------------------------------------------------------|
//! | `f32`       | [`Real`](crate::Real) becomes `f32`                       |
//! | `unchecked` | shape/axis validation is compiled out of release builds   |
//!
//! Debug builds (and therefore tests) always validate.

/// Whether shape, axis and batch validation runs in tensor kernels.
pub const VALIDATION: bool = cfg!(any(debug_assertions, not(feature = "unchecked")));

/// Name of the floating point type behind [`Real`](crate::Real).
pub const PRECISION: &str = if cfg!(feature = "f32") { "f32" } else { "f64" };
