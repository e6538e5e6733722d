//! CLI Entry Point for bpm-daq
//!
//! Provides command-line access to the acquisition core:
//! - Running the pipeline against a simulated beam
//! - Decoding recorded result frame files
//! - Printing the effective configuration
//! - Listing the chamber calibration catalogue
//!
//! # Usage
//!
//! Simulate 20 cycles and record frames:
//! ```bash
//! bpm-daq simulate --cycles 20 --output data/positions.dat
//! ```
//!
//! Print a recording made with `prepend_timestamp = true`:
//! ```bash
//! bpm-daq decode data/positions.dat --timestamped
//! ```

use anyhow::{bail, Context, Result};
use bpm_daq::calibration::CalibrationTable;
use bpm_daq::config::{BpmConfig, OutputKind, DEFAULT_CONFIG_PATH};
use bpm_daq::output::{self, FrameReader};
use bpm_daq::pipeline::BpmPipeline;
use bpm_daq::simulation::{BeamParameters, SimulatedBeam};
use bpm_daq::tracing_setup;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bpm-daq")]
#[command(about = "Beam-position monitor acquisition core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against a simulated beam
    Simulate {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Number of bursts to generate
        #[arg(long, default_value_t = 10)]
        cycles: u32,

        /// Write result frames to this file (overrides the configured output)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Normalized horizontal beam offset
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        horizontal: f64,

        /// Normalized vertical beam offset
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        vertical: f64,

        /// Seed for reproducible noise
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the frames in a recorded result file
    Decode {
        /// Recorded frame file
        path: PathBuf,

        /// Frames carry an 8-byte timestamp header
        #[arg(long)]
        timestamped: bool,

        /// Print at most this many frames
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// List the chamber calibration catalogue
    Chambers {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            cycles,
            output,
            horizontal,
            vertical,
            seed,
        } => simulate(config, cycles, output, horizontal, vertical, seed).await,
        Commands::Decode {
            path,
            timestamped,
            limit,
        } => decode(path, timestamped, limit).await,
        Commands::Config { config } => show_config(config),
        Commands::Chambers { json } => list_chambers(json),
    }
}

async fn simulate(
    config_path: PathBuf,
    cycles: u32,
    output_path: Option<PathBuf>,
    horizontal: f64,
    vertical: f64,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = BpmConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(path) = output_path {
        config.output.kind = OutputKind::File;
        config.output.path = path;
    }
    config.validate()?;
    tracing_setup::init_from_config(&config)?;

    let sink = output::open(&config.output).await?;
    let pipeline = Arc::new(BpmPipeline::new(
        &config.pipeline,
        Arc::new(CalibrationTable::standard()),
        sink,
    )?);

    let params = BeamParameters {
        bunch_width: config.pipeline.bunch_width,
        horizontal,
        vertical,
        ..BeamParameters::default()
    };
    let mut beam = SimulatedBeam::new(config.pipeline.capacity(), params);
    if let Some(seed) = seed {
        beam = beam.with_seed(seed);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut updates = pipeline.subscribe();
    let runner = tokio::spawn(pipeline.clone().run(shutdown_rx));
    let wait = config.pipeline.poll_interval() * 2 + Duration::from_secs(1);

    info!(cycles, horizontal, vertical, "Starting simulated acquisition");
    for cycle in 0..cycles {
        beam.feed(pipeline.aggregator())?;

        let target = u64::from(cycle) + 1;
        let done = matches!(
            tokio::time::timeout(wait, updates.wait_for(|s| s.dispatches >= target)).await,
            Ok(Ok(_))
        );
        if !done {
            warn!(cycle, "No cycle completed within {:?}", wait);
        }
    }

    shutdown_tx.send_replace(true);
    runner.await??;

    println!("{}", serde_json::to_string_pretty(&pipeline.status())?);
    Ok(())
}

async fn decode(path: PathBuf, timestamped: bool, limit: Option<usize>) -> Result<()> {
    let data = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let mut printed = 0usize;
    for item in FrameReader::new(&data).timestamped(timestamped) {
        if limit.is_some_and(|max| printed >= max) {
            break;
        }
        let recorded = item?;
        let frame = &recorded.frame;

        if let Some(ts) = recorded.timestamp {
            print!("{:.6} ", ts);
        }
        println!(
            "#{} x[{}] {:?} y[{}] {:?}",
            frame.event_counter,
            frame.x.len(),
            frame.x,
            frame.y.len(),
            frame.y
        );
        printed += 1;
    }

    if printed == 0 && !data.is_empty() {
        bail!("no frames decoded from {}", path.display());
    }
    Ok(())
}

fn show_config(config_path: PathBuf) -> Result<()> {
    let config = BpmConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Err(e) = config.validate() {
        eprintln!("warning: {}", e);
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn list_chambers(json: bool) -> Result<()> {
    let table = CalibrationTable::standard();

    if json {
        let entries: Vec<_> = table.iter().map(|(_, entry)| entry).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:>5}  {:<20} {:>12} {:>12}", "index", "name", "x_gain", "y_gain");
    for (index, entry) in table.iter() {
        println!(
            "{:>5}  {:<20} {:>12.4e} {:>12.4e}",
            index, entry.name, entry.x[1], entry.y[2]
        );
    }
    Ok(())
}
