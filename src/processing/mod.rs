//! Per-cycle numeric processing.
//!
//! Peak extraction runs once per electrode on a consumed snapshot; the position calculator
//! then combines the four peak vectors into X/Y positions and axis statistics.

pub mod peak;
pub mod position;
pub mod stats;

pub use peak::{alignment_offset, Alignment, PeakExtractor};
pub use position::{PositionCalculator, PositionResult, ZeroGuard};
pub use stats::AxisStats;
