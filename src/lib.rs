//! # BPM DAQ Core Library
//!
//! Acquisition core for a four-electrode beam-position monitor. Raw electrode bursts are
//! ingested into per-channel buffers, synchronized, reduced to one amplitude per bunch,
//! converted into calibrated horizontal/vertical positions and emitted as compact binary
//! result frames.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: `ChannelBuffer` per electrode, the `ReadinessAggregator` that gates
//!   one combined computation when all four buffers hold fresh data, and de-interleaving of
//!   fault-mode frames.
//! - **`processing`**: bunch peak extraction, alignment, the position polynomial and axis
//!   statistics.
//! - **`calibration`**: the immutable table of 18 chamber geometries.
//! - **`output`**: the result frame wire format and the `FrameSink` trait with file, channel
//!   and timestamping implementations.
//! - **`pipeline`**: `BpmPipeline`, which drives single-flight cycles from notifications or a
//!   poll tick and publishes telemetry.
//! - **`simulation`**: a seeded bunch-train generator standing in for converter hardware.
//! - **`config`**, **`error`**, **`tracing_setup`**: configuration loading, the crate error
//!   type and logging initialisation.
//!
//! ## Example
//!
//! ```no_run
//! use bpm_daq::calibration::CalibrationTable;
//! use bpm_daq::config::BpmConfig;
//! use bpm_daq::output::DiscardSink;
//! use bpm_daq::pipeline::BpmPipeline;
//! use bpm_daq::simulation::{BeamParameters, SimulatedBeam};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BpmConfig::default();
//! let pipeline = BpmPipeline::new(
//!     &config.pipeline,
//!     Arc::new(CalibrationTable::standard()),
//!     Box::new(DiscardSink::new()),
//! )?;
//!
//! let mut beam = SimulatedBeam::new(config.pipeline.capacity(), BeamParameters::default());
//! beam.feed(pipeline.aggregator())?;
//! let report = pipeline.run_cycle().await?;
//! println!("{:?}", report);
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod simulation;
pub mod tracing_setup;

pub use error::{AppResult, BpmError};
