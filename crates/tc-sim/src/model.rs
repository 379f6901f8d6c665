//! Continuous-time process description consumed by the integrators.

use crate::error::SimResult;

/// An ODE `x_dot = f(t, x)` together with the vector-space operations an
/// explicit integrator needs on its state.
///
/// Inputs that are constant over a step (for a heater channel: the delayed
/// command) are fields of the implementing type, so the integrator stays
/// unaware of them.
pub trait TransientModel {
    type State: Clone;

    /// State derivative at `(t, x)`.
    fn rhs(&self, t: f64, x: &Self::State) -> SimResult<Self::State>;

    /// `a + b`
    fn add(&self, a: &Self::State, b: &Self::State) -> Self::State;

    /// `scale * a`
    fn scale(&self, a: &Self::State, scale: f64) -> Self::State;
}
