//! Experiment files shipped in the repository.

use std::path::PathBuf;

use tc_core::Channel;
use tc_loop::{ClockMode, ExperimentConfig, Interpolation, StopReason};

fn experiment(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // repo root
    path.push("experiments");
    path.push(name);
    path
}

#[test]
fn test_shipped_experiments_validate() {
    for name in ["proportional_sim.yaml", "hardware.yaml"] {
        let cfg = ExperimentConfig::load(&experiment(name))
            .unwrap_or_else(|e| panic!("{name} should load: {e}"));
        assert_eq!(cfg.controllers.len(), 2, "{name}");
        let schedule = cfg.load_schedule().unwrap().expect("schedule configured");
        assert_eq!(schedule.period(), 2400.0);
    }
}

#[test]
fn test_hardware_experiment_shape() {
    let cfg = ExperimentConfig::load(&experiment("hardware.yaml")).unwrap();
    assert!(cfg.is_hardware());
    assert_eq!(cfg.schedule.as_ref().unwrap().mode, Interpolation::Linear);
    assert_eq!(cfg.controllers[1].channel, Channel::Two);
}

#[test]
fn test_simulated_experiment_runs_offline() {
    let mut cfg = ExperimentConfig::load(&experiment("proportional_sim.yaml")).unwrap();
    cfg.max_duration = Some(900.0);
    let mut runner = cfg.build_runner(ClockMode::Virtual).unwrap();
    let summary = runner.run().unwrap();
    assert_eq!(summary.reason, StopReason::DurationReached);
    assert_eq!(summary.ticks, 900);
    assert_eq!(summary.process_time, 900.0);
}

#[test]
fn test_simulated_experiment_runs_on_scaled_clock_with_sampler() {
    let mut cfg = ExperimentConfig::load(&experiment("proportional_sim.yaml")).unwrap();
    // 1 ms of wall time per process second.
    cfg.realtime_factor = 1000.0;
    cfg.max_duration = Some(40.0);
    let mut runner = cfg.build_runner(ClockMode::Scaled).unwrap();
    let summary = runner.run().unwrap();
    assert_eq!(summary.reason, StopReason::DurationReached);
    assert!(summary.ticks >= 1 && summary.ticks <= 40, "ticks = {}", summary.ticks);
    assert!(summary.process_time >= 40.0);
}
