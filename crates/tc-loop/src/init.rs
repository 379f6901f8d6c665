//! Bring controllers to a startable state before the loop takes over.

use tc_core::{Measurements, Plant};
use tracing::info;

use crate::error::LoopResult;
use crate::runner::RunnerBinding;

/// Read the plant once and call `start` on every binding.
///
/// Each controller gets the same `reference` and `initial_command`, the
/// measurement of its own channel and zero feedforward. Returns the reading
/// so callers can log or seed a display with it.
///
/// # Errors
///
/// Any plant read error. No controller is started in that case.
pub fn start_controllers<P: Plant + ?Sized>(
    plant: &mut P,
    bindings: &mut [RunnerBinding],
    reference: f64,
    initial_command: f64,
) -> LoopResult<Measurements> {
    let m = plant.read()?;
    for b in bindings.iter_mut() {
        let measurement = m.get(b.channel());
        b.start(reference, measurement, initial_command, 0.0);
        info!(
            controller = b.name(),
            channel = %b.channel(),
            reference,
            measurement,
            initial_command,
            "controller started"
        );
    }
    Ok(m)
}
