//! Experiment files.
//!
//! An experiment is one YAML document: loop timing, the plant, the
//! controllers and which channel each one drives, an optional setpoint
//! schedule, and the bumpless start values.
//!
//! ```yaml
//! sampling_period: 1.0
//! realtime_factor: 10.0
//! max_duration: 3600
//! schedule: { path: setpoints.csv, mode: hold }
//! plant:
//!   kind: simulated
//!   channels:
//!     - { gain: 0.6, tau: 150, dead_time: 10, ambient: 21 }
//!     - { gain: 0.6, tau: 150, dead_time: 10, ambient: 21 }
//! controllers:
//!   - { name: c1, channel: 1, kind: proportional, Kp: 5.0 }
//!   - { name: c2, channel: 2, kind: manual, manual_control_action: 20 }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tc_controls::ControllerSpec;
use tc_core::{Channel, Plant};
use tc_sim::{FopdtParams, FopdtPlant};
use tracing::{info, warn};

use crate::background::BackgroundPlant;
use crate::clock::{LoopClock, ScaledClock, VirtualClock, check_factor, scaled_duration};
use crate::error::{LoopError, LoopResult};
use crate::hardware::{DEFAULT_REPLY_TIMEOUT, open_device};
use crate::init::start_controllers;
use crate::runner::{ClosedLoopRunner, RunnerBinding, RunnerOptions};
use crate::schedule::{Interpolation, SetpointSchedule};

/// Runner assembled from an experiment file.
pub type ExperimentRunner = ClosedLoopRunner<Box<dyn Plant>, Box<dyn LoopClock>>;

/// Where the references come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// CSV file with a `t,T1,T2` header; relative to the experiment file.
    pub path: PathBuf,
    #[serde(default)]
    pub mode: Interpolation,
}

/// Process to control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlantConfig {
    Simulated {
        #[serde(default)]
        channels: [FopdtParams; 2],
    },
    Hardware {
        device: PathBuf,
        /// Seconds a request waits for the board's reply.
        #[serde(default = "default_reply_timeout")]
        reply_timeout: f64,
    },
}

/// A controller and the channel it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerBinding {
    pub name: String,
    pub channel: Channel,
    #[serde(flatten)]
    pub spec: ControllerSpec,
}

/// Values handed to every controller's `start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartConfig {
    #[serde(default = "default_reference")]
    pub reference: f64,
    #[serde(default)]
    pub initial_command: f64,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            initial_command: 0.0,
        }
    }
}

fn default_reference() -> f64 {
    20.0
}

fn default_one() -> f64 {
    1.0
}

fn default_reply_timeout() -> f64 {
    DEFAULT_REPLY_TIMEOUT.as_secs_f64()
}

/// Clock used to run an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Wall clock scaled by the configured realtime factor.
    Scaled,
    /// No waiting at all; simulated plants only.
    Virtual,
}

/// One experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Control period in process seconds.
    #[serde(default = "default_one")]
    pub sampling_period: f64,
    #[serde(default = "default_one")]
    pub realtime_factor: f64,
    #[serde(default)]
    pub max_duration: Option<f64>,
    /// Background acquisition period in process seconds.
    #[serde(default = "default_one")]
    pub log_interval: f64,
    #[serde(default)]
    pub feedforward: Option<[f64; 2]>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    pub plant: PlantConfig,
    #[serde(default)]
    pub controllers: Vec<ControllerBinding>,
    #[serde(default)]
    pub start: StartConfig,
}

impl ExperimentConfig {
    /// Read, parse and validate an experiment file. A relative schedule path
    /// is resolved against the file's directory.
    pub fn load(path: &Path) -> LoopResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| LoopError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        if let (Some(schedule), Some(dir)) = (config.schedule.as_mut(), path.parent()) {
            if schedule.path.is_relative() {
                schedule.path = dir.join(&schedule.path);
            }
        }
        Ok(config)
    }

    /// Parse and validate YAML text; paths are left as written.
    pub fn from_yaml_str(content: &str) -> LoopResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching files or devices.
    pub fn validate(&self) -> LoopResult<()> {
        self.runner_options().validate()?;
        check_factor(self.realtime_factor)?;
        if !(self.log_interval.is_finite() && self.log_interval > 0.0) {
            return Err(LoopError::config("log_interval must be > 0"));
        }
        if let Some(ff) = self.feedforward {
            if ff.iter().any(|v| !v.is_finite()) {
                return Err(LoopError::config("feedforward must be finite"));
            }
        }
        if !(self.start.reference.is_finite() && self.start.initial_command.is_finite()) {
            return Err(LoopError::config("start values must be finite"));
        }

        let mut names = HashSet::new();
        let mut channels = HashSet::new();
        for c in &self.controllers {
            if !names.insert(c.name.as_str()) {
                return Err(LoopError::config(format!("controller name '{}' is used twice", c.name)));
            }
            if !channels.insert(c.channel) {
                return Err(LoopError::config(format!(
                    "channel {} has more than one controller",
                    c.channel
                )));
            }
            c.spec.build().map_err(|e| {
                LoopError::config(format!("controller '{}': {e}", c.name))
            })?;
        }

        match &self.plant {
            PlantConfig::Simulated { channels } => {
                FopdtPlant::new(*channels, self.sampling_period)?;
            }
            PlantConfig::Hardware { reply_timeout, .. } => {
                if !(reply_timeout.is_finite() && *reply_timeout > 0.0) {
                    return Err(LoopError::config("reply_timeout must be > 0"));
                }
            }
        }
        Ok(())
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            sampling_period: self.sampling_period,
            max_duration: self.max_duration,
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self.plant, PlantConfig::Hardware { .. })
    }

    /// Hardware always runs in real time.
    pub fn effective_realtime_factor(&self) -> f64 {
        if self.is_hardware() && self.realtime_factor != 1.0 {
            warn!(
                configured = self.realtime_factor,
                "hardware plants run in real time; ignoring realtime_factor"
            );
            return 1.0;
        }
        self.realtime_factor
    }

    pub fn build_bindings(&self) -> LoopResult<Vec<RunnerBinding>> {
        self.controllers
            .iter()
            .map(|c| Ok(RunnerBinding::new(c.name.clone(), c.channel, c.spec.build()?)))
            .collect()
    }

    pub fn load_schedule(&self) -> LoopResult<Option<SetpointSchedule>> {
        self.schedule
            .as_ref()
            .map(|s| SetpointSchedule::from_csv_path(&s.path, s.mode))
            .transpose()
    }

    /// Open the plant.
    ///
    /// With [`ClockMode::Virtual`] a simulated plant is stepped directly by
    /// the loop at `sampling_period`. Otherwise a background thread samples
    /// it every `log_interval` process seconds.
    pub fn build_plant(&self, mode: ClockMode) -> LoopResult<Box<dyn Plant>> {
        match (&self.plant, mode) {
            (PlantConfig::Simulated { channels }, ClockMode::Virtual) => {
                Ok(Box::new(FopdtPlant::new(*channels, self.sampling_period)?))
            }
            (PlantConfig::Simulated { channels }, ClockMode::Scaled) => {
                let sim = FopdtPlant::new(*channels, self.log_interval)?;
                let interval = scaled_duration(self.log_interval, self.realtime_factor);
                Ok(Box::new(BackgroundPlant::spawn(sim, interval)?))
            }
            (PlantConfig::Hardware { .. }, ClockMode::Virtual) => {
                Err(LoopError::config("a hardware plant cannot run on a virtual clock"))
            }
            (
                PlantConfig::Hardware {
                    device,
                    reply_timeout,
                },
                ClockMode::Scaled,
            ) => {
                let board = open_device(device, Duration::from_secs_f64(*reply_timeout))?;
                let interval = scaled_duration(self.log_interval, 1.0);
                Ok(Box::new(BackgroundPlant::spawn(board, interval)?))
            }
        }
    }

    pub fn build_clock(&self, mode: ClockMode) -> LoopResult<Box<dyn LoopClock>> {
        Ok(match mode {
            ClockMode::Virtual => Box::new(VirtualClock::new()),
            ClockMode::Scaled => Box::new(ScaledClock::new(self.effective_realtime_factor())?),
        })
    }

    /// Build everything, start the controllers, and return a runner ready
    /// to `run`.
    pub fn build_runner(&self, mode: ClockMode) -> LoopResult<ExperimentRunner> {
        let schedule = self.load_schedule()?;
        let mut bindings = self.build_bindings()?;
        let mut plant = self.build_plant(mode)?;

        if let Err(e) = start_controllers(plant.as_mut(), &mut bindings, self.start.reference, self.start.initial_command) {
            // Nothing will run; still leave the heaters off.
            if let Err(stop) = plant.stop() {
                warn!(error = %stop, "plant stop failed after a failed start");
            }
            return Err(e);
        }

        let clock = self.build_clock(mode)?;
        let mut runner = ClosedLoopRunner::new(plant, bindings, clock, self.runner_options())?;
        if let Some(schedule) = schedule {
            runner = runner.with_schedule(schedule);
        }
        if let Some([f1, f2]) = self.feedforward {
            runner.set_feedforward(Channel::One, f1)?;
            runner.set_feedforward(Channel::Two, f2)?;
        }
        info!(
            controllers = self.controllers.len(),
            hardware = self.is_hardware(),
            "experiment ready"
        );
        Ok(runner)
    }
}
