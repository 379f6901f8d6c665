//! Open-loop staircase step test for process identification.
//!
//! Heater 1 walks up from `u_initial` towards `u_final` in steps of `delta`,
//! then back down, and repeats until stopped. Heater 2 stays off. The responses
//! are what an FOPDT fit (gain, time constant, dead time) is made from.

use serde::{Deserialize, Serialize};
use tc_core::{Commands, Plant};
use tracing::{debug, info, warn};

use crate::clock::LoopClock;
use crate::error::{LoopError, LoopResult};
use crate::observer::{TickObserver, TickRecord};
use crate::runner::{RunSummary, RunnerOptions, StopReason, release_plant};
use crate::stop::StopSignal;

/// Up-and-down staircase of heater-1 commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaircaseProfile {
    pub u_initial: f64,
    pub u_final: f64,
    pub delta: f64,
    /// Process seconds spent on each level.
    pub step_duration: f64,
}

impl Default for StaircaseProfile {
    fn default() -> Self {
        Self {
            u_initial: 40.0,
            u_final: 60.0,
            delta: 5.0,
            step_duration: 900.0,
        }
    }
}

impl StaircaseProfile {
    pub fn validate(&self) -> LoopResult<()> {
        let finite = [self.u_initial, self.u_final, self.delta, self.step_duration]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(LoopError::config("staircase values must be finite"));
        }
        if self.delta <= 0.0 || self.step_duration <= 0.0 {
            return Err(LoopError::config("staircase delta and step_duration must be > 0"));
        }
        if self.u_final < self.u_initial {
            return Err(LoopError::config("staircase u_final must be >= u_initial"));
        }
        Ok(())
    }

    /// Steps between the bottom and the top level.
    fn rise(&self) -> u64 {
        // Tolerate ranges that are an exact multiple of delta up to rounding.
        ((self.u_final - self.u_initial) / self.delta + 1e-9).floor() as u64
    }

    /// Heater-1 command at process time `t`.
    ///
    /// Walking up, the first level past `u_final` is replaced by
    /// `u_final - delta` and the walk turns down. Walking down, the first
    /// level below `u_initial` becomes `u_initial + delta` and the walk turns
    /// up. With `u_initial = 0`, `u_final = 12`, `delta = 5` that gives
    /// 0, 5, 10, 7, 2, 5, 10, 7, ... A range narrower than `delta` holds
    /// `u_initial`.
    pub fn command_at(&self, t: f64) -> f64 {
        let rise = self.rise();
        if rise == 0 {
            return self.u_initial;
        }
        let step = (t.max(0.0) / self.step_duration).floor() as u64;
        if step <= rise {
            return self.u_initial + step as f64 * self.delta;
        }
        // After the first climb: `rise` levels down, then `rise` levels up.
        let pos = (step - rise - 1) % (2 * rise);
        if pos < rise {
            self.u_final - (pos + 1) as f64 * self.delta
        } else {
            self.u_initial + (pos - rise + 1) as f64 * self.delta
        }
    }
}

/// Drive heater 1 through `profile` until the duration or a stop request.
///
/// The plant is read every tick only to feed the observers. The shutdown is
/// the one the closed loop uses.
pub fn run_step_test<P: Plant, C: LoopClock>(
    mut plant: P,
    mut clock: C,
    profile: &StaircaseProfile,
    options: RunnerOptions,
    stop: &StopSignal,
    observers: &mut [Box<dyn TickObserver>],
) -> LoopResult<RunSummary> {
    let setup = profile.validate().and_then(|()| options.validate());
    if let Err(e) = setup {
        release_plant(plant)?;
        return Err(e);
    }
    info!(?profile, "step test running");

    let mut ticks = 0;
    let outcome = loop {
        if stop.is_stopped() {
            break Ok(StopReason::Cancelled);
        }
        let t = clock.process_time();
        if options.max_duration.is_some_and(|max| t >= max) {
            break Ok(StopReason::DurationReached);
        }

        let commands = Commands::new(profile.command_at(t), 0.0);
        let step = plant.read().and_then(|m| plant.write(commands).map(|()| m));
        let measurements = match step {
            Ok(m) => m,
            Err(e) => break Err(LoopError::from(e)),
        };
        debug!(t, U1 = commands.u1, T1 = measurements.t1, "step test tick");

        clock.sleep(options.sampling_period);
        ticks += 1;
        let record = TickRecord {
            t_proc: t,
            measurements,
            commands,
            setpoints: None,
        };
        for observer in observers.iter_mut() {
            if let Err(e) = observer.on_tick(&record) {
                warn!(error = %e, "observer failed");
            }
        }
    };

    let shutdown = release_plant(plant);
    for observer in observers.iter_mut() {
        if let Err(e) = observer.finish() {
            warn!(error = %e, "observer failed to finish");
        }
    }
    let reason = outcome?;
    shutdown?;
    info!(ticks, reason = %reason, "step test stopped");
    Ok(RunSummary {
        ticks,
        process_time: clock.process_time(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::observer::ChannelObserver;
    use std::sync::mpsc;
    use tc_sim::{FopdtParams, FopdtPlant};

    #[test]
    fn climbs_then_descends_between_the_bounds() {
        let p = StaircaseProfile {
            step_duration: 10.0,
            ..Default::default()
        };
        let levels: Vec<f64> = (0..11).map(|k| p.command_at(k as f64 * 10.0 + 1.0)).collect();
        assert_eq!(
            levels,
            vec![40.0, 45.0, 50.0, 55.0, 60.0, 55.0, 50.0, 45.0, 40.0, 45.0, 50.0]
        );
    }

    #[test]
    fn top_level_never_exceeds_final() {
        let p = StaircaseProfile {
            u_initial: 0.0,
            u_final: 12.0,
            delta: 5.0,
            step_duration: 1.0,
        };
        let max = (0..100).map(|k| p.command_at(k as f64)).fold(f64::MIN, f64::max);
        assert_eq!(max, 10.0);
    }

    #[test]
    fn turns_at_final_minus_delta_when_range_is_uneven() {
        let p = StaircaseProfile {
            u_initial: 0.0,
            u_final: 12.0,
            delta: 5.0,
            step_duration: 1.0,
        };
        let levels: Vec<f64> = (0..12).map(|k| p.command_at(k as f64 + 0.5)).collect();
        assert_eq!(
            levels,
            vec![0.0, 5.0, 10.0, 7.0, 2.0, 5.0, 10.0, 7.0, 2.0, 5.0, 10.0, 7.0]
        );
    }

    #[test]
    fn flat_profile_when_range_is_empty() {
        let p = StaircaseProfile {
            u_initial: 30.0,
            u_final: 30.0,
            delta: 5.0,
            step_duration: 1.0,
        };
        assert_eq!(p.command_at(1234.0), 30.0);
    }

    #[test]
    fn invalid_profiles() {
        let base = StaircaseProfile::default();
        assert!(StaircaseProfile { delta: 0.0, ..base }.validate().is_err());
        assert!(StaircaseProfile { step_duration: -1.0, ..base }.validate().is_err());
        assert!(StaircaseProfile { u_final: 10.0, ..base }.validate().is_err());
    }

    #[test]
    fn drives_heater_one_only() {
        let plant = FopdtPlant::new([FopdtParams::default(); 2], 1.0).unwrap();
        let (tx, rx) = mpsc::channel();
        let mut observers: Vec<Box<dyn TickObserver>> = vec![Box::new(ChannelObserver::new(tx))];
        let profile = StaircaseProfile {
            step_duration: 5.0,
            ..Default::default()
        };
        let options = RunnerOptions {
            sampling_period: 1.0,
            max_duration: Some(12.0),
        };
        let summary = run_step_test(
            plant,
            VirtualClock::new(),
            &profile,
            options,
            &StopSignal::new(),
            &mut observers,
        )
        .unwrap();
        assert_eq!(summary.ticks, 12);
        assert_eq!(summary.reason, StopReason::DurationReached);

        let records: Vec<TickRecord> = rx.try_iter().collect();
        assert_eq!(records.len(), 12);
        assert_eq!(records[0].commands, Commands::new(40.0, 0.0));
        assert_eq!(records[6].commands.u1, 45.0);
        assert_eq!(records[11].commands.u1, 50.0);
        assert!(records.iter().all(|r| r.commands.u2 == 0.0));
    }
}
