//! Simulated heater process for offline tuning.
//!
//! Provides:
//! - a minimal `TransientModel` / `Integrator` pair (forward Euler)
//! - a fixed-length dead-time queue
//! - `FopdtPlant`, a two-channel first-order-plus-dead-time process that
//!   implements the `tc_core::Plant` contract

pub mod dead_time;
pub mod error;
pub mod fopdt;
pub mod integrator;
pub mod model;

pub use dead_time::DeadTimeQueue;
pub use error::{SimError, SimResult};
pub use fopdt::{FirstOrderLag, FopdtParams, FopdtPlant};
pub use integrator::{ForwardEuler, Integrator};
pub use model::TransientModel;
