//! Controller abstraction and the parameters every strategy shares.
//!
//! A controller is a single-input single-output law turning
//! `(reference, measurement, feedforward)` into a saturated actuator command.
//! Strategies live in their own modules ([`crate::proportional`],
//! [`crate::manual`]) and all implement [`Controller`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::params::{ControllerParameters, ParamValue, SAMPLING_PERIOD, U_MAX, U_MIN};
use crate::saturation::saturate;

/// Capability set of a control strategy.
///
/// `compute` is called once per control tick and must never look at the
/// wall clock: every piece of timing information comes from
/// [`Controller::sampling_period`]. The last step of `compute` is always
/// [`saturate`] with the controller's current bounds.
pub trait Controller: Send + fmt::Debug {
    /// Short strategy name, e.g. `"proportional"`.
    fn kind(&self) -> &'static str;

    /// Compute the next actuator command. May update strategy state.
    fn compute(&mut self, reference: f64, measurement: f64, feedforward: f64) -> f64;

    /// Align internal state before the first `compute`.
    ///
    /// Called exactly once by the loop initializer; `initial_command` is the
    /// command the actuator held before automatic control took over.
    fn start(&mut self, reference: f64, measurement: f64, initial_command: f64, feedforward: f64);

    /// Current sample period in seconds.
    fn sampling_period(&self) -> f64;

    /// Read-only snapshot of every parameter.
    fn parameters(&self) -> ControllerParameters;

    /// Apply a partial update atomically: either every entry is applied or
    /// none is.
    fn set_parameters(&mut self, overrides: &ControllerParameters) -> ControlResult<()>;
}

/// Parameters shared by all strategies: sample period and output bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommonParams {
    /// Sample period (seconds), must be positive.
    #[serde(default = "default_sampling_period")]
    pub sampling_period: f64,
    /// Lower output bound; `None` leaves the output unbounded below.
    #[serde(default = "default_u_min")]
    pub u_min: Option<f64>,
    /// Upper output bound; `None` leaves the output unbounded above.
    #[serde(default = "default_u_max")]
    pub u_max: Option<f64>,
}

fn default_sampling_period() -> f64 {
    1.0
}

fn default_u_min() -> Option<f64> {
    Some(0.0)
}

fn default_u_max() -> Option<f64> {
    Some(100.0)
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            sampling_period: default_sampling_period(),
            u_min: default_u_min(),
            u_max: default_u_max(),
        }
    }
}

impl CommonParams {
    /// Create validated common parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Configuration`] if `sampling_period` is not
    /// positive or `u_min >= u_max`.
    pub fn new(sampling_period: f64, u_min: Option<f64>, u_max: Option<f64>) -> ControlResult<Self> {
        let params = Self {
            sampling_period,
            u_min,
            u_max,
        };
        params.validated()
    }

    /// Re-check an already built value (e.g. one produced by serde) as a
    /// construction argument.
    pub fn validated(self) -> ControlResult<Self> {
        self.check().map_err(|e| match e {
            ControlError::Validation { key, constraint } => ControlError::Configuration {
                what: format!("{key} {constraint}"),
            },
            other => other,
        })?;
        Ok(self)
    }

    /// Apply the shared saturation policy.
    pub fn saturate(&self, u: f64) -> f64 {
        saturate(u, self.u_min, self.u_max)
    }

    /// Joint check over the merged state.
    pub fn check(&self) -> ControlResult<()> {
        if !(self.sampling_period.is_finite() && self.sampling_period > 0.0) {
            return Err(ControlError::validation(SAMPLING_PERIOD, "must be > 0"));
        }
        for (key, bound) in [(U_MIN, self.u_min), (U_MAX, self.u_max)] {
            if bound.is_some_and(|b| !b.is_finite()) {
                return Err(ControlError::validation(key, "must be a finite number"));
            }
        }
        if let (Some(lo), Some(hi)) = (self.u_min, self.u_max) {
            if lo >= hi {
                return Err(ControlError::validation(U_MIN, "must be < u_max"));
            }
        }
        Ok(())
    }

    /// Write the reserved keys in their fixed order.
    pub fn write_into(&self, params: &mut ControllerParameters) {
        params.insert(SAMPLING_PERIOD, self.sampling_period);
        params.insert(U_MIN, self.u_min);
        params.insert(U_MAX, self.u_max);
    }

    /// Assign one of the reserved keys. Returns `Ok(false)` if `key` is not
    /// reserved, so the strategy can handle it.
    pub fn assign(&mut self, key: &str, value: &ParamValue) -> ControlResult<bool> {
        match key {
            SAMPLING_PERIOD => self.sampling_period = value.as_number(key)?,
            U_MIN => self.u_min = value.as_bound(key)?,
            U_MAX => self.u_max = value.as_bound(key)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}
