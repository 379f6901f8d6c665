//! Simulated two-channel heater process: first order plus dead time.
//!
//! Each channel follows
//!
//! ```text
//! dT/dt = (-(T - T_amb) + K * u(t - L)) / tau
//! ```
//!
//! integrated with [`ForwardEuler`] at a fixed step `dt`. The transport delay
//! `L` is a [`DeadTimeQueue`] of `round(L / dt)` commands (at least one).
//!
//! Simulation time only advances inside [`Plant::read`]: every read pushes
//! the last written command into each queue, steps the model by one `dt` and
//! returns the new temperatures. Writing only records the command.

use serde::{Deserialize, Serialize};
use tc_core::{Channel, Commands, Measurements, Plant, TcError, TcResult};
use tracing::debug;

use crate::dead_time::DeadTimeQueue;
use crate::error::{SimError, SimResult};
use crate::integrator::{ForwardEuler, Integrator};
use crate::model::TransientModel;

/// Physical parameters of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FopdtParams {
    /// Static gain K (°C per % heater).
    #[serde(default = "default_gain")]
    pub gain: f64,
    /// Time constant tau (s). `tau <= 0` freezes the channel.
    #[serde(default = "default_tau")]
    pub tau: f64,
    /// Transport delay L (s).
    #[serde(default = "default_dead_time")]
    pub dead_time: f64,
    /// Ambient temperature (°C).
    #[serde(default = "default_ambient")]
    pub ambient: f64,
    /// Starting temperature (°C); ambient when absent.
    #[serde(default)]
    pub initial: Option<f64>,
}

// Defaults are in the range of a small heater/transistor lab board.
fn default_gain() -> f64 {
    0.6
}

fn default_tau() -> f64 {
    150.0
}

fn default_dead_time() -> f64 {
    10.0
}

fn default_ambient() -> f64 {
    21.0
}

impl Default for FopdtParams {
    fn default() -> Self {
        Self {
            gain: default_gain(),
            tau: default_tau(),
            dead_time: default_dead_time(),
            ambient: default_ambient(),
            initial: None,
        }
    }
}

impl FopdtParams {
    pub fn new(gain: f64, tau: f64, dead_time: f64, ambient: f64) -> Self {
        Self {
            gain,
            tau,
            dead_time,
            ambient,
            initial: None,
        }
    }

    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = Some(initial);
        self
    }

    fn validate(&self) -> SimResult<()> {
        tc_core::ensure_finite(self.gain, "gain must be finite")?;
        tc_core::ensure_finite(self.tau, "tau must be finite")?;
        tc_core::ensure_finite(self.ambient, "ambient must be finite")?;
        if let Some(t0) = self.initial {
            tc_core::ensure_finite(t0, "initial temperature must be finite")?;
        }
        // dead_time is checked by the queue.
        Ok(())
    }
}

/// Right-hand side of one channel with the delayed command frozen over the step.
#[derive(Debug, Clone, Copy)]
pub struct FirstOrderLag {
    pub gain: f64,
    pub tau: f64,
    pub ambient: f64,
    /// Delayed actuator command driving this step.
    pub drive: f64,
}

impl TransientModel for FirstOrderLag {
    type State = f64;

    fn rhs(&self, _t: f64, x: &f64) -> SimResult<f64> {
        if self.tau <= 0.0 {
            return Err(SimError::NonPhysical {
                what: "tau must be positive to integrate",
            });
        }
        Ok((-(x - self.ambient) + self.gain * self.drive) / self.tau)
    }

    fn add(&self, a: &f64, b: &f64) -> f64 {
        a + b
    }

    fn scale(&self, a: &f64, scale: f64) -> f64 {
        a * scale
    }
}

#[derive(Debug, Clone)]
struct ChannelState {
    params: FopdtParams,
    temperature: f64,
    queue: DeadTimeQueue,
    /// Command that drove the most recent step.
    last_drive: f64,
}

/// Simulated plant with two independent FOPDT channels.
#[derive(Debug, Clone)]
pub struct FopdtPlant {
    dt: f64,
    time: f64,
    channels: [ChannelState; 2],
    commands: Commands,
    stopped: bool,
}

impl FopdtPlant {
    /// Create the plant.
    ///
    /// # Arguments
    ///
    /// * `params` - Per-channel parameters, channel 1 first
    /// * `dt` - Integration step (s); also the spacing of the dead-time queue
    ///
    /// # Errors
    ///
    /// Returns `InvalidArg` if `dt` is not positive, any parameter is not
    /// finite, or a dead time is negative.
    pub fn new(params: [FopdtParams; 2], dt: f64) -> SimResult<Self> {
        tc_core::ensure_positive(dt, "dt must be positive")?;
        let build = |p: FopdtParams| -> SimResult<ChannelState> {
            p.validate()?;
            Ok(ChannelState {
                params: p,
                temperature: p.initial.unwrap_or(p.ambient),
                queue: DeadTimeQueue::new(p.dead_time, dt)?,
                last_drive: 0.0,
            })
        };
        let [p1, p2] = params;
        Ok(Self {
            dt,
            time: 0.0,
            channels: [build(p1)?, build(p2)?],
            commands: Commands::zero(),
            stopped: false,
        })
    }

    /// Integration step (s).
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Model time (s): number of steps taken times `dt`.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Temperatures without stepping the model.
    pub fn temperatures(&self) -> Measurements {
        Measurements::new(self.channels[0].temperature, self.channels[1].temperature)
    }

    /// Last written (clamped) commands.
    pub fn commands(&self) -> Commands {
        self.commands
    }

    /// Delayed command that drove the most recent step on `channel`.
    pub fn effective_command(&self, channel: Channel) -> f64 {
        self.channels[channel.index()].last_drive
    }

    /// Length of the dead-time queue on `channel`.
    pub fn queue_len(&self, channel: Channel) -> usize {
        self.channels[channel.index()].queue.len()
    }

    pub fn params(&self, channel: Channel) -> &FopdtParams {
        &self.channels[channel.index()].params
    }

    /// Advance the model by one `dt` using the last written commands.
    pub fn step(&mut self) -> SimResult<Measurements> {
        for ch in Channel::ALL {
            let command = self.commands.get(ch);
            let state = &mut self.channels[ch.index()];
            let drive = state.queue.push_pop(command);
            state.last_drive = drive;
            if state.params.tau <= 0.0 {
                continue;
            }
            let lag = FirstOrderLag {
                gain: state.params.gain,
                tau: state.params.tau,
                ambient: state.params.ambient,
                drive,
            };
            state.temperature = ForwardEuler.step(&lag, self.time, &state.temperature, self.dt)?;
        }
        self.time += self.dt;
        Ok(self.temperatures())
    }
}

impl Plant for FopdtPlant {
    fn read(&mut self) -> TcResult<Measurements> {
        if self.stopped {
            return Err(TcError::Stopped);
        }
        self.step().map_err(|e| TcError::Acquisition {
            message: e.to_string(),
        })
    }

    fn write(&mut self, commands: Commands) -> TcResult<()> {
        if self.stopped {
            return Err(TcError::Stopped);
        }
        self.commands = commands.clamped();
        Ok(())
    }

    fn stop(&mut self) -> TcResult<()> {
        if !self.stopped {
            self.commands = Commands::zero();
            self.stopped = true;
            debug!(t = self.time, "simulated plant stopped");
        }
        Ok(())
    }
}
