mod console;

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tc_core::Plant;
use tc_loop::{
    BackgroundPlant, ClockMode, CsvRecorder, ExperimentConfig, Interpolation, JsonLinesRecorder,
    LoopClock, LoopError, LoopResult, RunSummary, RunnerOptions, ScaledClock, SetpointSchedule,
    StaircaseProfile, StopSignal, TickObserver, TracingObserver, VirtualClock, open_device,
    run_step_test,
};
use tc_sim::{FopdtParams, FopdtPlant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tc-cli")]
#[command(about = "Two-channel temperature control loop runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an experiment file and its setpoint schedule
    Validate {
        /// Path to the experiment YAML file
        config: PathBuf,
    },
    /// Run a closed-loop experiment
    Run {
        /// Path to the experiment YAML file
        config: PathBuf,
        /// Step a simulated plant on a virtual clock, as fast as possible
        #[arg(long)]
        offline: bool,
        /// Override max_duration (process seconds)
        #[arg(long)]
        max_duration: Option<f64>,
        #[command(flatten)]
        output: OutputArgs,
        /// Do not read tuning commands from stdin
        #[arg(long)]
        no_console: bool,
    },
    /// Open-loop staircase on heater 1 for process identification
    StepTest {
        /// Use the simulated board instead of hardware
        #[arg(long)]
        fake: bool,
        /// Serial device of the board
        #[arg(long, default_value = "/dev/ttyACM0")]
        device: PathBuf,
        /// Seconds to wait for each reply from the board
        #[arg(long, default_value_t = 2.0)]
        reply_timeout: f64,
        /// Run the simulated board on a virtual clock
        #[arg(long, requires = "fake")]
        offline: bool,
        /// Process seconds per wall second (simulated board only)
        #[arg(long, default_value_t = 10.0)]
        realtime_factor: f64,
        #[arg(long, default_value_t = 40.0)]
        u_initial: f64,
        #[arg(long, default_value_t = 60.0)]
        u_final: f64,
        #[arg(long, default_value_t = 5.0)]
        delta: f64,
        /// Process seconds per level
        #[arg(long, default_value_t = 900.0)]
        step_duration: f64,
        /// Stop after this many process seconds
        #[arg(long)]
        max_duration: Option<f64>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print references from a setpoint CSV
    Schedule {
        /// Path to the setpoint CSV (t,T1,T2)
        csv: PathBuf,
        /// Interpolate linearly instead of holding
        #[arg(long)]
        linear: bool,
        /// Process times to evaluate
        #[arg(long, num_args = 1..)]
        at: Vec<f64>,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// CSV log path (default: timestamped file in the current directory)
    #[arg(long, conflicts_with = "json")]
    csv: Option<PathBuf>,
    /// Write JSON lines instead of CSV
    #[arg(long)]
    json: Option<PathBuf>,
    /// Do not write a log file
    #[arg(long, conflicts_with_all = ["csv", "json"])]
    no_log: bool,
    /// Print every Nth tick
    #[arg(long, default_value_t = 10)]
    print_every: u64,
}

fn main() -> LoopResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Run {
            config,
            offline,
            max_duration,
            output,
            no_console,
        } => cmd_run(&config, offline, max_duration, &output, no_console),
        Commands::StepTest {
            fake,
            device,
            reply_timeout,
            offline,
            realtime_factor,
            u_initial,
            u_final,
            delta,
            step_duration,
            max_duration,
            output,
        } => {
            let profile = StaircaseProfile {
                u_initial,
                u_final,
                delta,
                step_duration,
            };
            let board = if fake {
                None
            } else {
                Some((device.as_path(), reply_timeout))
            };
            cmd_step_test(board, offline, realtime_factor, &profile, max_duration, &output)
        }
        Commands::Schedule { csv, linear, at } => cmd_schedule(&csv, linear, &at),
    }
}

fn cmd_validate(config: &Path) -> LoopResult<()> {
    println!("Validating experiment: {}", config.display());
    let cfg = ExperimentConfig::load(config)?;
    if let Some(schedule) = cfg.load_schedule()? {
        println!(
            "  Schedule: {} breakpoints, period {:.1} s",
            schedule.samples().len(),
            schedule.period()
        );
    }
    for c in &cfg.controllers {
        let controller = c.spec.build()?;
        println!(
            "  {} -> channel {}: {} {}",
            c.name,
            c.channel,
            controller.kind(),
            controller.parameters()
        );
    }
    println!("✓ Experiment is valid");
    Ok(())
}

fn cmd_run(
    config: &Path,
    offline: bool,
    max_duration: Option<f64>,
    output: &OutputArgs,
    no_console: bool,
) -> LoopResult<()> {
    let mut cfg = ExperimentConfig::load(config)?;
    if max_duration.is_some() {
        cfg.max_duration = max_duration;
        cfg.validate()?;
    }
    let mode = if offline {
        ClockMode::Virtual
    } else {
        ClockMode::Scaled
    };
    println!("Running experiment: {}", config.display());

    let mut runner = cfg.build_runner(mode)?;
    for observer in observers(output)? {
        runner.add_observer(observer);
    }

    let stop = runner.stop_signal();
    install_interrupt(&stop)?;
    if !no_console {
        let tuning = runner.tuning_handle();
        let stop = stop.clone();
        println!("{}", console::HELP);
        // Detached: blocks on stdin and dies with the process.
        thread::Builder::new()
            .name("tuning-console".into())
            .spawn(move || console::serve(io::stdin().lock(), &tuning, &stop))?;
    }

    let summary = runner.run()?;
    print_summary(&summary);
    Ok(())
}

fn cmd_step_test(
    board: Option<(&Path, f64)>,
    offline: bool,
    realtime_factor: f64,
    profile: &StaircaseProfile,
    max_duration: Option<f64>,
    output: &OutputArgs,
) -> LoopResult<()> {
    let options = RunnerOptions {
        sampling_period: 1.0,
        max_duration,
    };
    let (plant, clock): (Box<dyn Plant>, Box<dyn LoopClock>) = match board {
        Some((path, reply_timeout)) => {
            if !(reply_timeout.is_finite() && reply_timeout > 0.0) {
                return Err(LoopError::Configuration {
                    what: "--reply-timeout must be > 0".into(),
                });
            }
            let board = open_device(path, Duration::from_secs_f64(reply_timeout))?;
            (
                Box::new(BackgroundPlant::spawn(board, Duration::from_secs(1))?),
                Box::new(ScaledClock::realtime()),
            )
        }
        None => {
            let sim = FopdtPlant::new([FopdtParams::default(); 2], options.sampling_period)?;
            let clock: Box<dyn LoopClock> = if offline {
                Box::new(VirtualClock::new())
            } else {
                Box::new(ScaledClock::new(realtime_factor)?)
            };
            (Box::new(sim), clock)
        }
    };
    println!(
        "Step test: {:.1} -> {:.1} % in steps of {:.1} every {:.0} s",
        profile.u_initial, profile.u_final, profile.delta, profile.step_duration
    );

    let stop = StopSignal::new();
    install_interrupt(&stop)?;
    let mut observers = observers(output)?;
    let summary = run_step_test(plant, clock, profile, options, &stop, &mut observers)?;
    print_summary(&summary);
    Ok(())
}

fn cmd_schedule(csv: &Path, linear: bool, at: &[f64]) -> LoopResult<()> {
    let mode = if linear {
        Interpolation::Linear
    } else {
        Interpolation::Hold
    };
    let schedule = SetpointSchedule::from_csv_path(csv, mode)?;
    println!("Period: {:.3} s ({:?})", schedule.period(), schedule.mode());
    if at.is_empty() {
        for s in schedule.samples() {
            println!("  t={:>10.3}  T1={:>7.2}  T2={:>7.2}", s.t, s.t1, s.t2);
        }
    } else {
        for &t in at {
            let (t1, t2) = schedule.get_setpoints(t);
            println!("  t={:>10.3}  T1={:>7.2}  T2={:>7.2}", t, t1, t2);
        }
    }
    Ok(())
}

fn observers(output: &OutputArgs) -> LoopResult<Vec<Box<dyn TickObserver>>> {
    let mut list: Vec<Box<dyn TickObserver>> = vec![Box::new(TracingObserver::new(output.print_every))];
    if output.no_log {
        return Ok(list);
    }
    if let Some(path) = &output.json {
        list.push(Box::new(JsonLinesRecorder::new(create(path)?)));
        println!("  Logging to {}", path.display());
        return Ok(list);
    }
    let path = output.csv.clone().unwrap_or_else(default_log_path);
    list.push(Box::new(CsvRecorder::new(create(&path)?)));
    println!("  Logging to {}", path.display());
    Ok(list)
}

fn default_log_path() -> PathBuf {
    PathBuf::from(format!(
        "tclab_log_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn create(path: &Path) -> LoopResult<BufWriter<File>> {
    let file = File::create(path).map_err(|source| LoopError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

fn install_interrupt(stop: &StopSignal) -> LoopResult<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || stop.request_stop()).map_err(|e| LoopError::Configuration {
        what: format!("cannot install Ctrl-C handler: {e}"),
    })
}

fn print_summary(summary: &RunSummary) {
    println!("✓ Stopped ({})", summary.reason);
    println!("  Ticks:        {}", summary.ticks);
    println!("  Process time: {:.1} s", summary.process_time);
}
