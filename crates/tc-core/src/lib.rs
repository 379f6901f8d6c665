//! tc-core: shared foundation for the temperature control loop.
//!
//! Contains:
//! - numeric (tolerances and finiteness checks)
//! - error (shared error types for plant I/O)
//! - plant (the measurement/command contract every process implements)

pub mod error;
pub mod numeric;
pub mod plant;

pub use error::{TcError, TcResult};
pub use numeric::{Tolerances, ensure_finite, ensure_positive, nearly_equal};
pub use plant::{CHANNELS, Channel, Commands, HEATER_MAX, HEATER_MIN, Measurements, Plant};
