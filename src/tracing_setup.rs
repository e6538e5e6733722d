//! Logging setup.
//!
//! Installs one `tracing-subscriber` fmt layer behind an `EnvFilter`. The level and format
//! come from `[application]` in the configuration; `RUST_LOG` wins over the configured level
//! when set.
//!
//! Pipeline events carry structured fields (`channel`, `event_counter`, `bunches`,
//! `chamber`), so the `json` format is the one to feed into a log collector.
//!
//! ```no_run
//! use bpm_daq::{config::BpmConfig, tracing_setup};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BpmConfig::load()?;
//! tracing_setup::init_from_config(&config)?;
//! tracing::info!(chamber = config.pipeline.chamber_type, "Pipeline configured");
//! # Ok(())
//! # }
//! ```

use crate::config::BpmConfig;
use crate::error::{AppResult, BpmError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, coloured; for a terminal.
    Pretty,
    /// One line per event, no colour.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for OutputFormat {
    type Err = BpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(BpmError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: pretty, compact, json",
                s
            ))),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: Level,
    /// Line layout.
    pub format: OutputFormat,
    /// Emit span open/close events (useful with `run_cycle` at trace level).
    pub span_events: bool,
    /// Include source file and line.
    pub source_location: bool,
    /// Colour output; only honoured by `Pretty`.
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            span_events: false,
            source_location: true,
            ansi: true,
        }
    }
}

impl TracingConfig {
    /// Level and format from `[application]`.
    ///
    /// # Errors
    ///
    /// `Configuration` for an unknown level or format name.
    pub fn from_config(config: &BpmConfig) -> AppResult<Self> {
        Ok(Self {
            level: parse_level(&config.application.log_level)?,
            format: config.application.log_format.parse()?,
            ..Self::default()
        })
    }

    /// Default settings at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Set the line layout.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle span open/close events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Toggle colour.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_span_events(spans)
            .with_file(self.source_location)
            .with_line_number(self.source_location);

        match self.format {
            OutputFormat::Pretty => layer.pretty().with_ansi(self.ansi).boxed(),
            OutputFormat::Compact => layer.compact().with_ansi(false).boxed(),
            OutputFormat::Json => layer.json().boxed(),
        }
    }
}

/// Install the subscriber described by `[application]`.
pub fn init_from_config(config: &BpmConfig) -> AppResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Calling this again once a subscriber is installed returns `Ok(())`.
pub fn init(config: TracingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    tracing_subscriber::registry()
        .with(config.fmt_layer().with_filter(filter))
        .try_init()
        .or_else(already_installed)
}

fn already_installed(e: TryInitError) -> AppResult<()> {
    if e.to_string().contains("already been set") {
        Ok(())
    } else {
        Err(BpmError::Configuration(format!(
            "Failed to install tracing subscriber: {}",
            e
        )))
    }
}

fn parse_level(level: &str) -> AppResult<Level> {
    Level::from_str(level).map_err(|_| {
        BpmError::Configuration(format!(
            "Invalid log_level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))
    })
}
