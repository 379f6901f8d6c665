//! Process-time clocks.
//!
//! The loop never looks at the wall clock directly. It asks a [`LoopClock`]
//! for the current process time and to wait for a span of process time.
//! [`ScaledClock`] maps wall time through a constant realtime factor;
//! [`VirtualClock`] just counts, which makes offline runs deterministic and
//! as fast as the machine allows.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{LoopError, LoopResult};

/// Source of process time for the control loop.
pub trait LoopClock {
    /// Process seconds since the clock started.
    fn process_time(&self) -> f64;

    /// Suspend for `process_seconds` of process time.
    fn sleep(&mut self, process_seconds: f64);

    /// Process seconds per wall second.
    fn realtime_factor(&self) -> f64;
}

impl<C: LoopClock + ?Sized> LoopClock for Box<C> {
    fn process_time(&self) -> f64 {
        (**self).process_time()
    }

    fn sleep(&mut self, process_seconds: f64) {
        (**self).sleep(process_seconds)
    }

    fn realtime_factor(&self) -> f64 {
        (**self).realtime_factor()
    }
}

/// Wall clock scaled by a constant factor:
/// `process_time = elapsed_wall_time * realtime_factor`.
#[derive(Debug, Clone)]
pub struct ScaledClock {
    start: Instant,
    factor: f64,
}

impl ScaledClock {
    /// Start a clock now.
    ///
    /// # Errors
    ///
    /// `Configuration` if `realtime_factor` is not positive and finite.
    pub fn new(realtime_factor: f64) -> LoopResult<Self> {
        check_factor(realtime_factor)?;
        Ok(Self {
            start: Instant::now(),
            factor: realtime_factor,
        })
    }

    /// Real time: one process second per wall second.
    pub fn realtime() -> Self {
        Self {
            start: Instant::now(),
            factor: 1.0,
        }
    }

    /// Wall time needed to cover `process_seconds`.
    pub fn wall_duration(&self, process_seconds: f64) -> Duration {
        scaled_duration(process_seconds, self.factor)
    }
}

impl LoopClock for ScaledClock {
    fn process_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * self.factor
    }

    fn sleep(&mut self, process_seconds: f64) {
        let wall = self.wall_duration(process_seconds);
        if !wall.is_zero() {
            thread::sleep(wall);
        }
    }

    fn realtime_factor(&self) -> f64 {
        self.factor
    }
}

/// Clock that advances only when slept on.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: f64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock starting at `start` process seconds.
    pub fn starting_at(start: f64) -> Self {
        Self { now: start }
    }
}

impl LoopClock for VirtualClock {
    fn process_time(&self) -> f64 {
        self.now
    }

    fn sleep(&mut self, process_seconds: f64) {
        if process_seconds > 0.0 {
            self.now += process_seconds;
        }
    }

    /// Unbounded in practice; reported as infinity.
    fn realtime_factor(&self) -> f64 {
        f64::INFINITY
    }
}

pub(crate) fn check_factor(realtime_factor: f64) -> LoopResult<()> {
    if realtime_factor.is_finite() && realtime_factor > 0.0 {
        Ok(())
    } else {
        Err(LoopError::config(format!(
            "realtime_factor must be positive and finite (got {realtime_factor})"
        )))
    }
}

/// `process_seconds / factor` as a wall duration; non-positive spans map to zero.
pub(crate) fn scaled_duration(process_seconds: f64, factor: f64) -> Duration {
    let wall = process_seconds / factor;
    if wall.is_finite() && wall > 0.0 {
        Duration::from_secs_f64(wall)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_sleep_divides_by_factor() {
        let clock = ScaledClock::new(10.0).unwrap();
        assert_eq!(clock.wall_duration(1.0), Duration::from_millis(100));
        assert_eq!(clock.wall_duration(-1.0), Duration::ZERO);
    }

    #[test]
    fn scaled_clock_rejects_bad_factor() {
        assert!(ScaledClock::new(0.0).is_err());
        assert!(ScaledClock::new(-2.0).is_err());
        assert!(ScaledClock::new(f64::NAN).is_err());
    }

    #[test]
    fn scaled_process_time_runs_faster() {
        let mut clock = ScaledClock::new(1000.0).unwrap();
        clock.sleep(20.0); // 20 ms wall
        assert!(clock.process_time() >= 20.0);
    }

    #[test]
    fn virtual_clock_counts_sleeps() {
        let mut clock = VirtualClock::new();
        assert_eq!(clock.process_time(), 0.0);
        clock.sleep(1.0);
        clock.sleep(0.5);
        clock.sleep(-3.0);
        assert_eq!(clock.process_time(), 1.5);
    }
}
