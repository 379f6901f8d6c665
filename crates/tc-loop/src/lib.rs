//! Closed-loop runtime for the two-channel temperature process.
//!
//! This crate ties the plant contract (`tc-core`), the controller strategies
//! (`tc-controls`) and the simulated process (`tc-sim`) into a running
//! experiment:
//!
//! - [`ClosedLoopRunner`]: the fixed-period sample/compute/actuate cycle and
//!   its ordered shutdown.
//! - [`LoopClock`]: process time, either scaled wall time or virtual.
//! - [`SetpointSchedule`]: periodic references with hold or linear lookup.
//! - [`BackgroundPlant`] and [`SerialPlant`]: acquisition thread and the
//!   board's line protocol.
//! - [`TuningHandle`], [`TickObserver`]: live tuning and per-tick output.
//! - [`ExperimentConfig`]: YAML experiment files.

pub mod background;
pub mod clock;
pub mod config;
pub mod error;
pub mod hardware;
pub mod init;
pub mod observer;
pub mod runner;
pub mod schedule;
pub mod staircase;
pub mod stop;
pub mod tuning;

pub use background::BackgroundPlant;
pub use clock::{LoopClock, ScaledClock, VirtualClock};
pub use config::{ClockMode, ControllerBinding, ExperimentConfig, ExperimentRunner, PlantConfig, ScheduleConfig, StartConfig};
pub use error::{LoopError, LoopResult};
pub use hardware::{DEFAULT_REPLY_TIMEOUT, SerialPlant, open_device};
pub use init::start_controllers;
pub use observer::{ChannelObserver, CsvRecorder, JsonLinesRecorder, TickObserver, TickRecord, TracingObserver};
pub use runner::{ClosedLoopRunner, RunSummary, RunnerBinding, RunnerOptions, RunnerState, StopReason};
pub use schedule::{Interpolation, SetpointSample, SetpointSchedule};
pub use staircase::{StaircaseProfile, run_step_test};
pub use stop::StopSignal;
pub use tuning::{TuningHandle, TuningRequest};
