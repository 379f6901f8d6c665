//! Proportional controller.

use serde::{Deserialize, Serialize};

use crate::controller::{CommonParams, Controller};
use crate::error::ControlResult;
use crate::params::{ControllerParameters, ParamValue, Tunable, apply_overrides};

/// Key of the proportional gain.
pub const KP: &str = "Kp";

/// Proportional controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionalParams {
    /// Proportional gain.
    #[serde(rename = "Kp", alias = "kp")]
    pub kp: f64,
    #[serde(flatten)]
    pub common: CommonParams,
}

impl Tunable for ProportionalParams {
    fn parameters(&self) -> ControllerParameters {
        let mut params = ControllerParameters::new();
        self.common.write_into(&mut params);
        params.insert(KP, self.kp);
        params
    }

    fn assign(&mut self, key: &str, value: &ParamValue) -> ControlResult<()> {
        if !self.common.assign(key, value)? {
            // Only Kp is left once the reserved keys are handled.
            self.kp = value.as_number(key)?;
        }
        Ok(())
    }

    fn check(&self) -> ControlResult<()> {
        self.common.check()
    }
}

/// `u = saturate(Kp * (reference - measurement) + feedforward)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProportionalController {
    params: ProportionalParams,
}

impl ProportionalController {
    /// Create a proportional controller.
    ///
    /// # Arguments
    ///
    /// * `kp` - Proportional gain
    /// * `common` - Sample period and output bounds
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `kp` is not finite or `common` is invalid.
    pub fn new(kp: f64, common: CommonParams) -> ControlResult<Self> {
        Self::from_params(ProportionalParams { kp, common })
    }

    pub fn from_params(params: ProportionalParams) -> ControlResult<Self> {
        let common = params.common.validated()?;
        if !params.kp.is_finite() {
            return Err(crate::error::ControlError::Configuration {
                what: "Kp must be a finite number".to_string(),
            });
        }
        Ok(Self {
            params: ProportionalParams { common, ..params },
        })
    }

    pub fn kp(&self) -> f64 {
        self.params.kp
    }

    pub fn params(&self) -> &ProportionalParams {
        &self.params
    }
}

impl Controller for ProportionalController {
    fn kind(&self) -> &'static str {
        "proportional"
    }

    fn compute(&mut self, reference: f64, measurement: f64, feedforward: f64) -> f64 {
        let error = reference - measurement;
        let u = self.params.kp * error + feedforward;
        self.params.common.saturate(u)
    }

    fn start(&mut self, _reference: f64, _measurement: f64, _initial_command: f64, _feedforward: f64) {
        // No internal state to align.
    }

    fn sampling_period(&self) -> f64 {
        self.params.common.sampling_period
    }

    fn parameters(&self) -> ControllerParameters {
        self.params.parameters()
    }

    fn set_parameters(&mut self, overrides: &ControllerParameters) -> ControlResult<()> {
        self.params = apply_overrides(&self.params, overrides)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;

    fn p(kp: f64) -> ProportionalController {
        ProportionalController::new(kp, CommonParams::default()).unwrap()
    }

    #[test]
    fn proportional_action_with_feedforward() {
        let mut c = p(2.0);
        // error = 5, 2*5 + 3 = 13
        assert_eq!(c.compute(30.0, 25.0, 3.0), 13.0);
    }

    #[test]
    fn output_is_saturated() {
        let mut c = p(10.0);
        assert_eq!(c.compute(100.0, 20.0, 0.0), 100.0);
        assert_eq!(c.compute(20.0, 100.0, 0.0), 0.0);
    }

    #[test]
    fn parameter_keys_are_fixed() {
        let c = p(2.0);
        assert_eq!(
            c.parameters().keys().collect::<Vec<_>>(),
            vec!["sampling_period", "u_min", "u_max", "Kp"]
        );
    }

    #[test]
    fn tuning_kp() {
        let mut c = p(2.0);
        c.set_parameters(&ControllerParameters::new().with("Kp", 3.0)).unwrap();
        assert_eq!(c.kp(), 3.0);
        assert_eq!(c.compute(21.0, 20.0, 0.0), 3.0);
    }

    #[test]
    fn inverted_bounds_are_rejected_atomically() {
        let mut c = p(2.0);
        let before = c.parameters();
        let err = c
            .set_parameters(
                &ControllerParameters::new()
                    .with("Kp", 9.0)
                    .with("u_min", 50.0)
                    .with("u_max", 10.0),
            )
            .unwrap_err();
        assert!(matches!(err, ControlError::Validation { .. }));
        assert_eq!(c.parameters(), before);
    }

    #[test]
    fn unknown_key_has_no_partial_effect() {
        let mut c = p(2.0);
        let before = c.parameters();
        let err = c
            .set_parameters(&ControllerParameters::new().with("Kp", 4.0).with("Ti", 10.0))
            .unwrap_err();
        assert!(matches!(err, ControlError::UnknownParameter { .. }));
        assert_eq!(c.parameters(), before);
    }

    #[test]
    fn non_positive_sampling_period_rejected() {
        let mut c = p(2.0);
        assert!(c
            .set_parameters(&ControllerParameters::new().with("sampling_period", 0.0))
            .is_err());
        assert_eq!(c.sampling_period(), 1.0);
        assert!(ProportionalController::new(1.0, CommonParams {
            sampling_period: -1.0,
            ..CommonParams::default()
        })
        .is_err());
    }
}
