//! Configuration loading using Figment
//!
//! Configuration is layered from:
//! 1. a TOML file (`config/bpm.toml` by default)
//! 2. environment variables prefixed with `BPM_DAQ_` (sections separated by `__`)
//!
//! Every field has a default, so an empty or missing file yields a working live-mode
//! setup for chamber type 0.
//!
//! # Example
//! ```no_run
//! use bpm_daq::config::BpmConfig;
//!
//! let config = BpmConfig::load().unwrap();
//! config.validate().unwrap();
//! println!("Chamber type: {}", config.pipeline.chamber_type);
//! ```
//!
//! Override a single value from the shell:
//! `BPM_DAQ_PIPELINE__NOISE_THRESHOLD=800 bpm-daq simulate`

use crate::acquisition::channel::AcquisitionMode;
use crate::calibration::MAX_CHAMBER_INDEX;
use crate::error::{AppResult, BpmError};
use crate::processing::peak::Alignment;
use crate::processing::position::{validate_gains, ZeroGuard};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/bpm.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BpmConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Acquisition and processing settings
    pub pipeline: PipelineConfig,
    /// Result frame destination
    pub output: OutputConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "BPM DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Acquisition and processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Live display or fault/record capture
    pub mode: AcquisitionMode,
    /// Index into the calibration table (0..=17)
    pub chamber_type: usize,
    /// Window maxima below this ADC count are reported as 0
    pub noise_threshold: i32,
    /// Samples per bunch window
    pub bunch_width: usize,
    /// Samples per electrode in live mode
    pub live_capacity: usize,
    /// Samples per electrode in fault mode
    pub fault_capacity: usize,
    /// Readiness poll period in milliseconds
    pub poll_interval_ms: u64,
    /// How the first bunch window is located
    pub alignment: Alignment,
    /// When the normalized difference signals are forced to zero
    pub zero_guard: ZeroGuard,
    /// Multiplicative gain applied to the A/B/C/D peak vectors
    pub gain_correction: [f64; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::Live,
            chamber_type: 0,
            noise_threshold: default_noise_threshold(),
            bunch_width: default_bunch_width(),
            live_capacity: default_live_capacity(),
            fault_capacity: default_fault_capacity(),
            poll_interval_ms: default_poll_interval(),
            alignment: Alignment::FirstWindowMinimum,
            zero_guard: ZeroGuard::Denominator,
            gain_correction: [1.0; 4],
        }
    }
}

impl PipelineConfig {
    /// Per-electrode buffer capacity for the configured mode.
    pub fn capacity(&self) -> usize {
        match self.mode {
            AcquisitionMode::Live => self.live_capacity,
            AcquisitionMode::Fault => self.fault_capacity,
        }
    }

    /// Readiness poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where result frames go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Append frames to a file
    File,
    /// Drop frames after encoding (status-only runs)
    Discard,
}

/// Result frame sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Sink selection
    pub kind: OutputKind,
    /// Output file for `kind = "file"`
    pub path: PathBuf,
    /// Prefix each frame with an 8-byte little-endian Unix timestamp
    pub prepend_timestamp: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::File,
            path: PathBuf::from("data/positions.dat"),
            prepend_timestamp: false,
        }
    }
}

// Default value functions
fn default_noise_threshold() -> i32 {
    500
}

fn default_bunch_width() -> usize {
    12
}

fn default_live_capacity() -> usize {
    512
}

fn default_fault_capacity() -> usize {
    4096
}

fn default_poll_interval() -> u64 {
    1000
}

impl BpmConfig {
    /// Load configuration from `config/bpm.toml` and environment variables
    ///
    /// Environment variables override file values with prefix `BPM_DAQ_`.
    /// Example: `BPM_DAQ_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BPM_DAQ_").split("__"))
            .extract()?)
    }

    /// Parse configuration from an in-memory TOML document (no environment overlay)
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Ok(Figment::new().merge(Toml::string(toml)).extract()?)
    }

    /// Render the effective configuration (file plus environment) as TOML
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| BpmError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(BpmError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(BpmError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let pipeline = &self.pipeline;
        if pipeline.chamber_type > MAX_CHAMBER_INDEX {
            return Err(BpmError::ChamberOutOfRange {
                index: pipeline.chamber_type,
                max: MAX_CHAMBER_INDEX,
            });
        }

        if pipeline.bunch_width == 0 {
            return Err(BpmError::Configuration(
                "bunch_width must be positive".into(),
            ));
        }

        if pipeline.live_capacity == 0 || pipeline.fault_capacity == 0 {
            return Err(BpmError::Configuration(
                "buffer capacities must be non-zero".into(),
            ));
        }

        if pipeline.fault_capacity < pipeline.live_capacity {
            return Err(BpmError::Configuration(format!(
                "fault_capacity ({}) must not be smaller than live_capacity ({})",
                pipeline.fault_capacity, pipeline.live_capacity
            )));
        }

        if pipeline.poll_interval_ms == 0 {
            return Err(BpmError::Configuration(
                "poll_interval_ms must be positive".into(),
            ));
        }

        if let Alignment::Fixed(offset) = pipeline.alignment {
            if offset >= pipeline.capacity() {
                return Err(BpmError::Configuration(format!(
                    "fixed alignment offset {} exceeds buffer capacity {}",
                    offset,
                    pipeline.capacity()
                )));
            }
        }

        validate_gains(&pipeline.gain_correction)?;

        Ok(())
    }
}
