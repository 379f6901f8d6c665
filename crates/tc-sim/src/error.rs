//! Error types for simulation operations.

use thiserror::Error;

/// Errors encountered while building or stepping a simulated plant.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-physical condition: {what}")]
    NonPhysical { what: &'static str },
}

pub type SimResult<T> = Result<T, SimError>;

impl From<tc_core::TcError> for SimError {
    fn from(e: tc_core::TcError) -> Self {
        match e {
            tc_core::TcError::NonFinite { what, .. } | tc_core::TcError::InvalidArg { what } => {
                SimError::InvalidArg { what }
            }
            _ => SimError::NonPhysical {
                what: "unexpected plant error",
            },
        }
    }
}
