//! Controller strategies for the two-channel temperature loop.
//!
//! # Architecture
//!
//! - [`Controller`] is the capability set the loop runner and the tuning
//!   surface rely on: `compute`, `start`, and named parameter access.
//! - Each strategy keeps its parameters in a typed struct implementing
//!   [`Tunable`]; [`apply_overrides`] turns an untyped partial map into a
//!   validated, atomically committed update.
//! - Output saturation ([`saturate`]) is shared and always the last step of
//!   `compute`.
//!
//! Shipped strategies: [`ProportionalController`] and [`ManualController`].

pub mod controller;
pub mod error;
pub mod factory;
pub mod manual;
pub mod params;
pub mod proportional;
pub mod saturation;

pub use controller::{CommonParams, Controller};
pub use error::{ControlError, ControlResult};
pub use factory::ControllerSpec;
pub use manual::{ManualController, ManualParams};
pub use params::{ControllerParameters, ParamValue, Tunable, apply_overrides};
pub use proportional::{ProportionalController, ProportionalParams};
pub use saturation::saturate;
