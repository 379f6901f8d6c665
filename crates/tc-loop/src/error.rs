//! Error types for the loop runtime.

use std::path::PathBuf;

use tc_controls::ControlError;
use tc_core::TcError;
use tc_sim::SimError;

/// Unified error for experiment setup and the running loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// Invalid constructor argument or experiment description.
    #[error("Configuration error: {what}")]
    Configuration { what: String },

    #[error("Controller error: {0}")]
    Control(#[from] ControlError),

    /// Plant I/O failed; the run was stopped.
    #[error("Plant error: {0}")]
    Plant(#[from] TcError),

    #[error("Simulation setup failed: {0}")]
    Sim(#[from] SimError),

    #[error("Failed to read {path}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse experiment file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown controller: {0}")]
    UnknownController(String),

    #[error("Runner cannot {action} while {state}")]
    State {
        action: &'static str,
        state: &'static str,
    },

    /// The runner went away before answering a tuning request.
    #[error("Loop is no longer running")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoopError {
    pub(crate) fn config(what: impl Into<String>) -> Self {
        Self::Configuration { what: what.into() }
    }
}

/// Result type for tc-loop operations.
pub type LoopResult<T> = Result<T, LoopError>;
