//! Manual (open-loop) controller.

use serde::{Deserialize, Serialize};

use crate::controller::{CommonParams, Controller};
use crate::error::{ControlError, ControlResult};
use crate::params::{ControllerParameters, ParamValue, Tunable, apply_overrides};

/// Key of the held command.
pub const MANUAL_CONTROL_ACTION: &str = "manual_control_action";

/// Manual controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualParams {
    /// Command held on the actuator.
    #[serde(default)]
    pub manual_control_action: f64,
    #[serde(flatten)]
    pub common: CommonParams,
}

impl Tunable for ManualParams {
    fn parameters(&self) -> ControllerParameters {
        let mut params = ControllerParameters::new();
        self.common.write_into(&mut params);
        params.insert(MANUAL_CONTROL_ACTION, self.manual_control_action);
        params
    }

    fn assign(&mut self, key: &str, value: &ParamValue) -> ControlResult<()> {
        if !self.common.assign(key, value)? {
            self.manual_control_action = value.as_number(key)?;
        }
        Ok(())
    }

    fn check(&self) -> ControlResult<()> {
        self.common.check()
    }
}

/// Holds `saturate(manual_control_action)` regardless of its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualController {
    params: ManualParams,
}

impl ManualController {
    pub fn new(manual_control_action: f64, common: CommonParams) -> ControlResult<Self> {
        Self::from_params(ManualParams {
            manual_control_action,
            common,
        })
    }

    pub fn from_params(params: ManualParams) -> ControlResult<Self> {
        let common = params.common.validated()?;
        if !params.manual_control_action.is_finite() {
            return Err(ControlError::Configuration {
                what: "manual_control_action must be a finite number".to_string(),
            });
        }
        Ok(Self {
            params: ManualParams { common, ..params },
        })
    }

    pub fn manual_control_action(&self) -> f64 {
        self.params.manual_control_action
    }
}

impl Controller for ManualController {
    fn kind(&self) -> &'static str {
        "manual"
    }

    fn compute(&mut self, _reference: f64, _measurement: f64, _feedforward: f64) -> f64 {
        self.params.common.saturate(self.params.manual_control_action)
    }

    fn start(&mut self, _reference: f64, _measurement: f64, _initial_command: f64, _feedforward: f64) {
        // Manual mode holds the last commanded value; nothing to reset.
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

    #[test]
    fn holds_saturated_action() {
        let mut c = ManualController::new(130.0, CommonParams::default()).unwrap();
        assert_eq!(c.compute(0.0, 0.0, 0.0), 100.0);

        c.set_parameters(&ControllerParameters::new().with("manual_control_action", 35.0))
            .unwrap();
        assert_eq!(c.compute(0.0, 0.0, 0.0), 35.0);
    }

    #[test]
    fn start_keeps_action() {
        let mut c = ManualController::new(40.0, CommonParams::default()).unwrap();
        c.start(50.0, 21.0, 0.0, 0.0);
        assert_eq!(c.manual_control_action(), 40.0);
        assert_eq!(c.compute(50.0, 21.0, 0.0), 40.0);
    }

    #[test]
    fn text_value_is_rejected() {
        let mut c = ManualController::new(40.0, CommonParams::default()).unwrap();
        assert!(c
            .set_parameters(&ControllerParameters::new().with("manual_control_action", "high"))
            .is_err());
        assert_eq!(c.manual_control_action(), 40.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn output_ignores_inputs(
            action in -50.0_f64..150.0_f64,
            r in -100.0_f64..100.0_f64,
            m in -100.0_f64..100.0_f64,
            f in -100.0_f64..100.0_f64,
        ) {
            let mut c = ManualController::new(action, CommonParams::default()).unwrap();
            let expected = c.compute(0.0, 0.0, 0.0);
            prop_assert_eq!(c.compute(r, m, f), expected);
            prop_assert_eq!(expected, action.clamp(0.0, 100.0));
        }
    }
}
