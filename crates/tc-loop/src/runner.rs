//! Fixed-period closed-loop runner.
//!
//! The runner owns the plant and every controller binding for the duration of
//! a run. One tick samples the process time, looks up the references, reads
//! the plant, computes one command per bound channel, writes them in a single
//! batch, sleeps one sample period on the [`LoopClock`] and finally hands the
//! tick to the observers.
//!
//! # State machine
//!
//! `Uninitialized -> Running -> Stopped`. The runner refuses to run until every
//! controller has been started (see [`crate::init::start_controllers`]); it
//! never calls `start` itself. Whatever ends a run (duration reached,
//! cancellation, or a failed tick) goes through the same shutdown: zero both
//! heaters, stop the plant, drop it.

use core::fmt;
use std::sync::mpsc::Receiver;

use tc_controls::{Controller, ControllerParameters};
use tc_core::{CHANNELS, Channel, Commands, Plant, TcResult, Tolerances};
use tracing::{debug, info, warn};

use crate::clock::LoopClock;
use crate::error::{LoopError, LoopResult};
use crate::observer::{TickObserver, TickRecord};
use crate::schedule::SetpointSchedule;
use crate::stop::StopSignal;
use crate::tuning::{TuningHandle, TuningRequest};

/// A named controller bound to one plant channel.
#[derive(Debug)]
pub struct RunnerBinding {
    name: String,
    channel: Channel,
    controller: Box<dyn Controller>,
    started: bool,
}

impl RunnerBinding {
    pub fn new(name: impl Into<String>, channel: Channel, controller: Box<dyn Controller>) -> Self {
        Self {
            name: name.into(),
            channel,
            controller,
            started: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Forward to [`Controller::start`] and mark the binding ready to run.
    pub fn start(&mut self, reference: f64, measurement: f64, initial_command: f64, feedforward: f64) {
        self.controller
            .start(reference, measurement, initial_command, feedforward);
        self.started = true;
    }
}

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Uninitialized,
    Running,
    Stopped,
}

impl RunnerState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerState::Uninitialized => "uninitialized",
            RunnerState::Running => "running",
            RunnerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing options for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerOptions {
    /// Process seconds between ticks.
    pub sampling_period: f64,
    /// Stop once process time reaches this value; run until cancelled if `None`.
    pub max_duration: Option<f64>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            sampling_period: 1.0,
            max_duration: None,
        }
    }
}

impl RunnerOptions {
    pub fn validate(&self) -> LoopResult<()> {
        if !(self.sampling_period.is_finite() && self.sampling_period > 0.0) {
            return Err(LoopError::config(format!(
                "sampling_period must be > 0 (got {})",
                self.sampling_period
            )));
        }
        if let Some(max) = self.max_duration {
            if max.is_nan() || max < 0.0 {
                return Err(LoopError::config(format!("max_duration must be >= 0 (got {max})")));
            }
        }
        Ok(())
    }
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationReached,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DurationReached => f.write_str("duration reached"),
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Process time when the loop stopped (s).
    pub process_time: f64,
    pub reason: StopReason,
}

/// Drives one plant with up to one controller per channel.
pub struct ClosedLoopRunner<P: Plant, C: LoopClock> {
    plant: Option<P>,
    bindings: Vec<RunnerBinding>,
    clock: C,
    options: RunnerOptions,
    schedule: Option<SetpointSchedule>,
    feedforward: [f64; CHANNELS],
    observers: Vec<Box<dyn TickObserver>>,
    stop: StopSignal,
    tuning: TuningHandle,
    requests: Option<Receiver<TuningRequest>>,
    state: RunnerState,
    ticks: u64,
}

impl<P: Plant, C: LoopClock> ClosedLoopRunner<P, C> {
    /// Create a runner in the `Uninitialized` state.
    ///
    /// # Errors
    ///
    /// `Configuration` if the options are invalid, two bindings share a
    /// channel, or two bindings share a name.
    pub fn new(plant: P, bindings: Vec<RunnerBinding>, clock: C, options: RunnerOptions) -> LoopResult<Self> {
        options.validate()?;
        for (i, b) in bindings.iter().enumerate() {
            for other in &bindings[i + 1..] {
                if other.channel == b.channel {
                    return Err(LoopError::config(format!(
                        "controllers '{}' and '{}' are both bound to channel {}",
                        b.name, other.name, b.channel
                    )));
                }
                if other.name == b.name {
                    return Err(LoopError::config(format!(
                        "controller name '{}' is used twice",
                        b.name
                    )));
                }
            }
            check_period(b, options.sampling_period);
        }
        let (tuning, requests) = TuningHandle::channel();
        Ok(Self {
            plant: Some(plant),
            bindings,
            clock,
            options,
            schedule: None,
            feedforward: [0.0; CHANNELS],
            observers: Vec::new(),
            stop: StopSignal::new(),
            tuning,
            requests: Some(requests),
            state: RunnerState::Uninitialized,
            ticks: 0,
        })
    }

    /// Follow `schedule` for the references. Without one, each controller's
    /// reference is its own measurement.
    pub fn with_schedule(mut self, schedule: SetpointSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn TickObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Share an existing stop flag, e.g. one set by a signal handler.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn TickObserver>) {
        self.observers.push(observer);
    }

    /// Constant feedforward passed to the controller on `channel`.
    pub fn set_feedforward(&mut self, channel: Channel, value: f64) -> LoopResult<()> {
        tc_core::ensure_finite(value, "feedforward must be finite")?;
        self.feedforward[channel.index()] = value;
        Ok(())
    }

    pub fn feedforward(&self, channel: Channel) -> f64 {
        self.feedforward[channel.index()]
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn tuning_handle(&self) -> TuningHandle {
        self.tuning.clone()
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn bindings(&self) -> &[RunnerBinding] {
        &self.bindings
    }

    /// The plant, until the runner has released it.
    pub fn plant(&self) -> Option<&P> {
        self.plant.as_ref()
    }

    pub fn controller_names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name.clone()).collect()
    }

    /// Parameter snapshot of the controller called `name`.
    pub fn parameters(&self, name: &str) -> LoopResult<ControllerParameters> {
        let binding = self
            .bindings
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| LoopError::UnknownController(name.to_string()))?;
        Ok(binding.controller.parameters())
    }

    /// Update the controller called `name`; all of `overrides` applies or none.
    pub fn set_parameters(&mut self, name: &str, overrides: &ControllerParameters) -> LoopResult<ControllerParameters> {
        let sampling_period = self.options.sampling_period;
        let binding = self
            .bindings
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| LoopError::UnknownController(name.to_string()))?;
        binding.controller.set_parameters(overrides)?;
        info!(controller = name, update = %overrides, "controller parameters updated");
        check_period(binding, sampling_period);
        Ok(binding.controller.parameters())
    }

    /// Run until the duration is reached or a stop is requested.
    ///
    /// The plant is shut down before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// `State` if the runner is not `Uninitialized` or a controller has not
    /// been started; any plant error that aborted a tick.
    pub fn run(&mut self) -> LoopResult<RunSummary> {
        if self.state != RunnerState::Uninitialized {
            return Err(LoopError::State {
                action: "run",
                state: self.state.as_str(),
            });
        }
        if let Some(b) = self.bindings.iter().find(|b| !b.started) {
            warn!(controller = %b.name, "controller was never started");
            return Err(LoopError::State {
                action: "run",
                state: "a controller has not been started",
            });
        }

        self.state = RunnerState::Running;
        info!(
            controllers = self.bindings.len(),
            sampling_period = self.options.sampling_period,
            realtime_factor = self.clock.realtime_factor(),
            "control loop running"
        );

        let outcome = self.run_loop();
        let shutdown = self.shutdown();
        for observer in &mut self.observers {
            if let Err(e) = observer.finish() {
                warn!(error = %e, "observer failed to finish");
            }
        }

        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                warn!(error = %e, ticks = self.ticks, "control loop aborted");
                if let Err(stop_err) = shutdown {
                    warn!(error = %stop_err, "plant shutdown after abort failed");
                }
                return Err(e);
            }
        };
        shutdown?;
        let summary = RunSummary {
            ticks: self.ticks,
            process_time: self.clock.process_time(),
            reason,
        };
        info!(ticks = summary.ticks, t = summary.process_time, reason = %reason, "control loop stopped");
        Ok(summary)
    }

    /// Zero the heaters, stop and release the plant.
    ///
    /// Idempotent. Both steps are attempted even if the first fails; the
    /// first error is returned.
    pub fn shutdown(&mut self) -> LoopResult<()> {
        self.state = RunnerState::Stopped;
        // Pending and future tuning requests now see a closed channel.
        self.requests = None;
        match self.plant.take() {
            Some(plant) => Ok(release_plant(plant)?),
            None => Ok(()),
        }
    }

    fn run_loop(&mut self) -> LoopResult<StopReason> {
        loop {
            self.service_tuning();
            if self.stop.is_stopped() {
                return Ok(StopReason::Cancelled);
            }
            let t = self.clock.process_time();
            if self.options.max_duration.is_some_and(|max| t >= max) {
                return Ok(StopReason::DurationReached);
            }

            let record = self.tick(t)?;
            self.clock.sleep(self.options.sampling_period);
            self.ticks += 1;
            self.emit(&record);
        }
    }

    fn tick(&mut self, t: f64) -> LoopResult<TickRecord> {
        let setpoints = self.schedule.as_ref().map(|s| s.get_setpoints(t));
        let plant = self.plant.as_mut().ok_or(LoopError::State {
            action: "tick",
            state: "the plant is released",
        })?;

        let measurements = plant.read()?;
        let mut commands = Commands::zero();
        for b in &mut self.bindings {
            let ch = b.channel;
            let measurement = measurements.get(ch);
            let reference = match setpoints {
                Some((sp1, sp2)) => match ch {
                    Channel::One => sp1,
                    Channel::Two => sp2,
                },
                None => measurement,
            };
            let u = b
                .controller
                .compute(reference, measurement, self.feedforward[ch.index()]);
            commands.set(ch, u);
        }
        plant.write(commands)?;

        debug!(
            t,
            T1 = measurements.t1,
            T2 = measurements.t2,
            U1 = commands.u1,
            U2 = commands.u2,
            "tick"
        );
        Ok(TickRecord {
            t_proc: t,
            measurements,
            commands,
            setpoints,
        })
    }

    fn emit(&mut self, record: &TickRecord) {
        for observer in &mut self.observers {
            if let Err(e) = observer.on_tick(record) {
                warn!(error = %e, "observer failed");
            }
        }
    }

    fn service_tuning(&mut self) {
        let Some(requests) = self.requests.take() else {
            return;
        };
        while let Ok(request) = requests.try_recv() {
            // A requester that gave up is not our problem.
            match request {
                TuningRequest::List { reply } => {
                    let _ = reply.send(self.controller_names());
                }
                TuningRequest::Get { name, reply } => {
                    let _ = reply.send(self.parameters(&name));
                }
                TuningRequest::Set {
                    name,
                    overrides,
                    reply,
                } => {
                    let result = self.set_parameters(&name, &overrides);
                    if let Err(e) = &result {
                        warn!(controller = %name, error = %e, "parameter update rejected");
                    }
                    let _ = reply.send(result);
                }
            }
        }
        self.requests = Some(requests);
    }
}

impl<P: Plant, C: LoopClock> Drop for ClosedLoopRunner<P, C> {
    fn drop(&mut self) {
        if let Some(plant) = self.plant.take() {
            if let Err(e) = release_plant(plant) {
                warn!(error = %e, "plant shutdown failed while dropping the runner");
            }
        }
    }
}

impl<P: Plant, C: LoopClock> fmt::Debug for ClosedLoopRunner<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedLoopRunner")
            .field("state", &self.state)
            .field("bindings", &self.bindings)
            .field("options", &self.options)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

/// Shutdown sequence shared by every loop: zero, stop, drop.
pub(crate) fn release_plant<P: Plant>(mut plant: P) -> TcResult<()> {
    let zeroed = plant.write(Commands::zero());
    if let Err(e) = &zeroed {
        warn!(error = %e, "failed to zero heaters");
    }
    let stopped = plant.stop();
    drop(plant);
    debug!("plant released");
    zeroed.and(stopped)
}

fn check_period(binding: &RunnerBinding, runner_period: f64) {
    let own = binding.controller.sampling_period();
    if !tc_core::nearly_equal(own, runner_period, Tolerances::default()) {
        warn!(
            controller = %binding.name,
            controller_period = own,
            runner_period,
            "controller sampling_period differs from the loop period"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use tc_controls::{CommonParams, ManualController, ProportionalController};
    use tc_core::{Measurements, TcError};

    /// Plant that always reads the same value and remembers every write.
    #[derive(Debug, Default)]
    struct FixedPlant {
        reading: Measurements,
        writes: Vec<Commands>,
        stopped: bool,
    }

    impl Plant for &mut FixedPlant {
        fn read(&mut self) -> TcResult<Measurements> {
            if self.stopped {
                return Err(TcError::Stopped);
            }
            Ok(self.reading)
        }

        fn write(&mut self, commands: Commands) -> TcResult<()> {
            self.writes.push(commands);
            Ok(())
        }

        fn stop(&mut self) -> TcResult<()> {
            self.stopped = true;
            Ok(())
        }
    }

    fn manual(name: &str, channel: Channel, u: f64) -> RunnerBinding {
        RunnerBinding::new(name, channel, Box::new(ManualController::new(u, CommonParams::default()).unwrap()))
    }

    fn options(max: f64) -> RunnerOptions {
        RunnerOptions {
            sampling_period: 1.0,
            max_duration: Some(max),
        }
    }

    #[test]
    fn duplicate_channel_is_a_configuration_error() {
        let mut plant = FixedPlant::default();
        let bindings = vec![manual("a", Channel::One, 1.0), manual("b", Channel::One, 2.0)];
        let err = ClosedLoopRunner::new(&mut plant, bindings, VirtualClock::new(), options(1.0)).unwrap_err();
        assert!(matches!(err, LoopError::Configuration { .. }));
    }

    #[test]
    fn duplicate_name_is_a_configuration_error() {
        let mut plant = FixedPlant::default();
        let bindings = vec![manual("a", Channel::One, 1.0), manual("a", Channel::Two, 2.0)];
        assert!(ClosedLoopRunner::new(&mut plant, bindings, VirtualClock::new(), options(1.0)).is_err());
    }

    #[test]
    fn refuses_to_run_unstarted_controllers() {
        let mut plant = FixedPlant::default();
        let bindings = vec![manual("a", Channel::One, 1.0)];
        let mut runner = ClosedLoopRunner::new(&mut plant, bindings, VirtualClock::new(), options(3.0)).unwrap();
        assert!(matches!(runner.run(), Err(LoopError::State { .. })));
        assert_eq!(runner.state(), RunnerState::Uninitialized);
    }

    #[test]
    fn runs_for_duration_then_zeroes_and_stops() {
        let mut plant = FixedPlant::default();
        let mut binding = manual("heater", Channel::Two, 35.0);
        binding.start(0.0, 0.0, 0.0, 0.0);
        {
            let mut runner =
                ClosedLoopRunner::new(&mut plant, vec![binding], VirtualClock::new(), options(3.0)).unwrap();
            let summary = runner.run().unwrap();
            assert_eq!(summary.ticks, 3);
            assert_eq!(summary.reason, StopReason::DurationReached);
            assert_eq!(summary.process_time, 3.0);
            assert_eq!(runner.state(), RunnerState::Stopped);
            assert!(runner.plant().is_none());
            assert!(matches!(runner.run(), Err(LoopError::State { .. })));
        }
        assert_eq!(plant.writes.len(), 4);
        assert_eq!(plant.writes[0], Commands::new(0.0, 35.0));
        assert_eq!(*plant.writes.last().unwrap(), Commands::zero());
        assert!(plant.stopped);
    }

    /// Loses the sensor on its second read and cannot be stopped.
    #[derive(Debug, Default)]
    struct Unstoppable {
        reads: u32,
        stops: u32,
    }

    impl Plant for &mut Unstoppable {
        fn read(&mut self) -> TcResult<Measurements> {
            self.reads += 1;
            if self.reads >= 2 {
                return Err(TcError::Acquisition {
                    message: "sensor lost".into(),
                });
            }
            Ok(Measurements::new(20.0, 20.0))
        }

        fn write(&mut self, _: Commands) -> TcResult<()> {
            Ok(())
        }

        fn stop(&mut self) -> TcResult<()> {
            self.stops += 1;
            Err(TcError::Io {
                op: "switch heaters off",
                source: std::io::ErrorKind::BrokenPipe.into(),
            })
        }
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_stop_after_abort_is_logged() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut plant = Unstoppable::default();
        let mut binding = manual("heater", Channel::One, 10.0);
        binding.start(0.0, 0.0, 0.0, 0.0);
        let err = tracing::subscriber::with_default(subscriber, || {
            let mut runner =
                ClosedLoopRunner::new(&mut plant, vec![binding], VirtualClock::new(), options(5.0)).unwrap();
            runner.run().unwrap_err()
        });

        // The tick error wins; the failed stop is only logged.
        assert!(matches!(err, LoopError::Plant(TcError::Acquisition { .. })));
        assert_eq!(plant.stops, 1);
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("plant shutdown after abort failed"), "{text}");
    }

    #[test]
    fn zero_duration_runs_no_tick() {
        let mut plant = FixedPlant::default();
        {
            let mut runner = ClosedLoopRunner::new(&mut plant, vec![], VirtualClock::new(), options(0.0)).unwrap();
            assert_eq!(runner.run().unwrap().ticks, 0);
        }
        assert_eq!(plant.writes, vec![Commands::zero()]);
    }

    #[test]
    fn pre_set_stop_flag_cancels_before_first_tick() {
        let mut plant = FixedPlant::default();
        {
            let stop = StopSignal::new();
            stop.request_stop();
            let mut runner = ClosedLoopRunner::new(
                &mut plant,
                vec![],
                VirtualClock::new(),
                RunnerOptions::default(),
            )
            .unwrap()
            .with_stop_signal(stop);
            let summary = runner.run().unwrap();
            assert_eq!(summary.reason, StopReason::Cancelled);
            assert_eq!(summary.ticks, 0);
        }
        assert!(plant.stopped);
    }

    #[test]
    fn reference_defaults_to_measurement_without_schedule() {
        let mut plant = FixedPlant {
            reading: Measurements::new(30.0, 30.0),
            ..Default::default()
        };
        let mut binding = RunnerBinding::new(
            "p",
            Channel::One,
            Box::new(ProportionalController::new(2.0, CommonParams::default()).unwrap()),
        );
        binding.start(30.0, 30.0, 0.0, 0.0);
        {
            let mut runner =
                ClosedLoopRunner::new(&mut plant, vec![binding], VirtualClock::new(), options(1.0)).unwrap();
            runner.set_feedforward(Channel::One, 12.5).unwrap();
            runner.run().unwrap();
        }
        // Zero error, so only the feedforward remains.
        assert_eq!(plant.writes[0].u1, 12.5);
    }

    #[test]
    fn direct_parameter_access_by_name() {
        let mut plant = FixedPlant::default();
        let bindings = vec![manual("m", Channel::One, 10.0)];
        let mut runner =
            ClosedLoopRunner::new(&mut plant, bindings, VirtualClock::new(), options(1.0)).unwrap();
        let update = ControllerParameters::new().with("manual_control_action", 55.0);
        let params = runner.set_parameters("m", &update).unwrap();
        assert_eq!(params.number("manual_control_action"), Some(55.0));

        let bad = ControllerParameters::new().with("u_min", 50.0).with("u_max", 10.0);
        assert!(matches!(runner.set_parameters("m", &bad), Err(LoopError::Control(_))));
        assert_eq!(runner.parameters("m").unwrap().number("u_max"), Some(100.0));
        assert!(matches!(runner.parameters("x"), Err(LoopError::UnknownController(_))));
    }

    #[test]
    fn rejects_bad_options() {
        let bad = RunnerOptions {
            sampling_period: 0.0,
            max_duration: None,
        };
        assert!(bad.validate().is_err());
        let bad = RunnerOptions {
            sampling_period: 1.0,
            max_duration: Some(-1.0),
        };
        assert!(bad.validate().is_err());
    }
}
