use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam::channel::unbounded;
use tokio::time::{sleep_until, Duration, Instant};

use road_hazard::{
    replay, DetectorConfig, HazardMap, HazardPipeline, HazardService, RoadEvent, RoadSimulator,
    SessionLog, SimulationConfig, TraceSample, VehicleProfile,
};

#[derive(Parser, Debug)]
#[command(name = "road_hazard")]
#[command(about = "Road hazard detection - speed breakers, potholes and broken patches", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a synthetic drive and run it through the detector
    Simulate {
        /// Duration in seconds
        #[arg(long, default_value = "40")]
        duration: u64,

        /// Write the generated trace as a session log (.json or .json.gz)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Pace samples in real time through the async service
        #[arg(long)]
        realtime: bool,

        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Replay a recorded session log
    Replay {
        /// Session log (.json or .json.gz)
        #[arg(long)]
        log: PathBuf,

        /// Known hazards file for proximity warnings
        #[arg(long)]
        hazards: Option<PathBuf>,

        #[command(flatten)]
        detector: DetectorArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct DetectorArgs {
    /// Vehicle profile (two-wheeler, three-wheeler, four-wheeler, bus)
    #[arg(long)]
    profile: Option<VehicleProfile>,

    /// Detector config JSON; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum speed (km/h) for an event to be reported
    #[arg(long)]
    min_speed: Option<f64>,

    /// Subtract gravity from the vertical axis before detection
    #[arg(long)]
    gravity_compensation: bool,
}

impl DetectorArgs {
    fn build(&self) -> Result<DetectorConfig> {
        let mut config = match self.config {
            Some(ref path) => DetectorConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => DetectorConfig::default(),
        };
        if let Some(profile) = self.profile {
            config.vehicle_profile = profile;
        }
        if let Some(min_speed) = self.min_speed {
            config.min_event_speed_kmh = min_speed;
        }
        if self.gravity_compensation {
            config.gravity_compensation = true;
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_event(event: &RoadEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Simulate {
            duration,
            out,
            realtime,
            detector,
        } => {
            let mut config = detector.build()?;
            // Simulated traces carry gravity along the mount
            config.gravity_compensation = true;
            simulate(config, duration, out, realtime).await
        }
        Command::Replay {
            log,
            hazards,
            detector,
        } => run_replay(detector.build()?, log, hazards),
    }
}

async fn simulate(config: DetectorConfig, duration_s: u64, out: Option<PathBuf>, realtime: bool) -> Result<()> {
    let sim = RoadSimulator::new(SimulationConfig::with_duration(duration_s as i64 * 1000))?;
    let trace = sim.generate();
    log::info!(
        "Simulating {} s drive: {} inputs, {} scheduled hazards",
        duration_s,
        trace.len(),
        sim.config().hazards.len()
    );

    if let Some(ref path) = out {
        SessionLog::from_trace(&trace)
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Trace written to {}", path.display());
    }

    if !realtime {
        let mut pipeline = HazardPipeline::new(config)?;
        for event in pipeline.run_trace(&trace) {
            print_event(&event)?;
        }
        println!("{}", serde_json::to_string_pretty(&pipeline.stats())?);
        return Ok(());
    }

    let (tx, rx) = unbounded::<RoadEvent>();
    let printer = std::thread::spawn(move || {
        for event in rx.iter() {
            if let Err(e) = print_event(&event) {
                log::error!("Failed to print event: {}", e);
            }
        }
    });

    let handle = HazardService::spawn(config, tx)?;
    let start = Instant::now();
    let t0 = trace.first().map(|s| s.timestamp_ms()).unwrap_or(0);
    for sample in &trace {
        let offset = (sample.timestamp_ms() - t0).max(0) as u64;
        sleep_until(start + Duration::from_millis(offset)).await;
        match sample {
            TraceSample::Accel(a) => handle.feed_accel_sample(a.x, a.y, a.z, a.timestamp_ms),
            TraceSample::Location(f) => {
                handle.feed_speed(f.speed_kmh, f.latitude, f.longitude, f.timestamp_ms)
            }
        }
    }

    let stats = handle.shutdown().await;
    if printer.join().is_err() {
        log::error!("Event printer thread panicked");
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn run_replay(config: DetectorConfig, log_path: PathBuf, hazards: Option<PathBuf>) -> Result<()> {
    let session = SessionLog::load(&log_path).with_context(|| format!("loading {}", log_path.display()))?;
    let map = match hazards {
        Some(ref path) => Some(
            HazardMap::from_json_file(path).with_context(|| format!("loading hazards {}", path.display()))?,
        ),
        None => None,
    };

    let report = replay(&session, config, map.as_ref())?;
    for event in &report.events {
        print_event(event)?;
    }
    for warning in &report.warnings {
        println!("{}", serde_json::to_string(warning)?);
    }
    println!("{}", serde_json::to_string_pretty(&report.stats)?);
    Ok(())
}
