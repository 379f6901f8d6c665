//! Serializable description of a controller, used by experiment files.

use serde::{Deserialize, Serialize};

use crate::controller::Controller;
use crate::error::ControlResult;
use crate::manual::{ManualController, ManualParams};
use crate::proportional::{ProportionalController, ProportionalParams};

/// Closed set of shipped strategies. Adding a strategy means adding a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerSpec {
    Proportional(ProportionalParams),
    Manual(ManualParams),
}

impl ControllerSpec {
    /// Build the controller, validating every argument.
    pub fn build(&self) -> ControlResult<Box<dyn Controller>> {
        Ok(match self {
            ControllerSpec::Proportional(p) => Box::new(ProportionalController::from_params(*p)?),
            ControllerSpec::Manual(m) => Box::new(ManualController::from_params(*m)?),
        })
    }
}
