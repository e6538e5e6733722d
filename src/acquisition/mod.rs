//! Raw electrode frame ingestion.
//!
//! - [`channel`]: one locked sample buffer plus readiness flag per electrode
//! - [`readiness`]: the four-way "all ready" gate and single-flight dispatch
//! - [`interleave`]: splitting fault-mode frames that carry every electrode

pub mod channel;
pub mod interleave;
pub mod readiness;

pub use channel::{AcquisitionMode, ChannelBuffer, ChannelStats, IngestOutcome};
pub use readiness::{Electrode, ElectrodeSnapshot, ReadinessAggregator, ELECTRODE_COUNT};
