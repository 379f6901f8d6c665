//! Float helpers shared by the controllers, the simulator and the loop.

use crate::TcError;

/// Absolute and relative tolerance for float comparisons.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub abs: f64,
    pub rel: f64,
}

impl Tolerances {
    pub const fn new(abs: f64, rel: f64) -> Self {
        Self { abs, rel }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new(1e-12, 1e-9)
    }
}

/// `|a - b| <= abs`, or within `rel` of the larger magnitude.
pub fn nearly_equal(a: f64, b: f64, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// Pass `v` through if it is finite.
pub fn ensure_finite(v: f64, what: &'static str) -> Result<f64, TcError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(TcError::NonFinite { what, value: v })
    }
}

/// Pass `v` through if it is finite and strictly positive (periods, steps).
pub fn ensure_positive(v: f64, what: &'static str) -> Result<f64, TcError> {
    match ensure_finite(v, what)? {
        v if v > 0.0 => Ok(v),
        _ => Err(TcError::InvalidArg { what }),
    }
}
